use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{Chat, InlineKeyboardButton, InlineKeyboardMarkup, MessageOrigin, ParseMode};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

use crate::notification::{Control, Notification};
use crate::origin::{Entity, OriginRef};
use crate::platform::{
    chat_display_name, EntityDirectory, IncomingPost, LookupError, MessageSender, SendError,
};
use crate::relay::{RelayCommand, Relay};

/// Bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Subscribe to signal alerts")]
    Start,
    #[command(description = "Subscribe to signal alerts")]
    Subscribe,
    #[command(description = "Stop receiving signal alerts")]
    Unsubscribe,
    #[command(description = "Show subscription status")]
    Status,
    #[command(description = "Fetch the current price")]
    Price,
    #[command(description = "Show help")]
    Help,
}

impl Command {
    fn relay_command(&self) -> Option<RelayCommand> {
        match self {
            Command::Start | Command::Subscribe => Some(RelayCommand::Subscribe),
            Command::Unsubscribe => Some(RelayCommand::Unsubscribe),
            Command::Status => Some(RelayCommand::Status),
            Command::Price => Some(RelayCommand::Price),
            Command::Help => None,
        }
    }
}

/// Bot API implementation of the outbound collaborators.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn keyboard(controls: &[Control]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(controls.iter().map(|control| {
        vec![InlineKeyboardButton::callback(
            control.label.clone(),
            control.action.token(),
        )]
    }))
}

fn send_error(err: RequestError) -> SendError {
    match err {
        RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound) => {
            SendError::NotResolvable
        }
        RequestError::Api(ApiError::Unknown(ref text)) if text.contains("PEER_ID_INVALID") => {
            SendError::InvalidRecipient
        }
        other => SendError::Transport(other.to_string()),
    }
}

fn lookup_error(err: RequestError) -> LookupError {
    match err {
        RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound) => {
            LookupError::NotFound
        }
        RequestError::Api(ApiError::BotBlocked | ApiError::BotKicked) => LookupError::Forbidden,
        RequestError::Api(ApiError::Unknown(ref text)) if text.contains("CHANNEL_PRIVATE") => {
            LookupError::Forbidden
        }
        other => LookupError::Transport(other.to_string()),
    }
}

#[async_trait]
impl MessageSender for TelegramTransport {
    async fn send(&self, recipient: i64, notification: &Notification) -> Result<(), SendError> {
        if recipient == 0 {
            return Err(SendError::InvalidRecipient);
        }

        let mut request = self
            .bot
            .send_message(ChatId(recipient), notification.body.clone())
            .parse_mode(ParseMode::Html);
        if !notification.controls.is_empty() {
            request = request.reply_markup(keyboard(&notification.controls));
        }

        request.await.map(|_| ()).map_err(send_error)
    }
}

#[async_trait]
impl EntityDirectory for TelegramTransport {
    async fn lookup(&self, id: i64) -> Result<Entity, LookupError> {
        let chat = self.bot.get_chat(ChatId(id)).await.map_err(lookup_error)?;

        if let Some(title) = chat.title() {
            return Ok(Entity::Channel {
                title: title.to_string(),
            });
        }
        Ok(match chat.first_name() {
            Some(first_name) => Entity::User {
                first_name: first_name.to_string(),
                last_name: chat.last_name().map(str::to_string),
            },
            None => Entity::Unresolved,
        })
    }
}

fn chat_origin(chat: &Chat) -> OriginRef {
    match chat.title() {
        Some(title) if !title.trim().is_empty() => OriginRef::Named(title.to_string()),
        _ => OriginRef::Id(chat.id.0),
    }
}

fn origin_ref(origin: &MessageOrigin) -> OriginRef {
    match origin {
        MessageOrigin::User { sender_user, .. } => OriginRef::Named(sender_user.full_name()),
        MessageOrigin::HiddenUser {
            sender_user_name, ..
        } => OriginRef::Named(sender_user_name.clone()),
        MessageOrigin::Chat { sender_chat, .. } => chat_origin(sender_chat),
        MessageOrigin::Channel { chat, .. } => chat_origin(chat),
    }
}

fn incoming_post(msg: &Message) -> IncomingPost {
    IncomingPost {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        chat_name: chat_display_name(msg.chat.title(), msg.chat.username(), msg.chat.id.0),
        text: msg
            .text()
            .or_else(|| msg.caption())
            .unwrap_or_default()
            .to_string(),
        forward_origin: msg.forward_origin().map(origin_ref),
    }
}

fn is_source_chat(msg: Message, relay: Arc<Relay>) -> bool {
    relay.is_source(msg.chat.id.0, msg.chat.username())
}

fn is_command_text(text: Option<&str>) -> bool {
    text.is_some_and(|text| text.trim_start().starts_with('/'))
}

/// Group posts from a source chat that are not bot commands.
fn is_source_post(msg: Message, relay: Arc<Relay>) -> bool {
    !is_command_text(msg.text()) && is_source_chat(msg, relay)
}

/// Run the Telegram dispatcher. Each update kind has its own branch:
/// posts and edits from source chats feed the relay, commands manage
/// subscriptions, callback queries answer inline controls.
pub async fn run(relay: Arc<Relay>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_channel_post()
                .filter(is_source_chat)
                .endpoint(handle_new_post),
        )
        .branch(
            Update::filter_edited_channel_post()
                .filter(is_source_chat)
                .endpoint(handle_edited_post),
        )
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::filter(is_source_post).endpoint(handle_new_post)),
        )
        .branch(
            Update::filter_edited_message()
                .filter(is_source_chat)
                .endpoint(handle_edited_post),
        )
        .branch(Update::filter_callback_query().endpoint(handle_control));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_new_post(msg: Message, relay: Arc<Relay>) -> Result<()> {
    relay.on_new_post(&incoming_post(&msg)).await?;
    Ok(())
}

async fn handle_edited_post(msg: Message, relay: Arc<Relay>) -> Result<()> {
    relay.on_edited_post(&incoming_post(&msg)).await?;
    Ok(())
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, relay: Arc<Relay>) -> Result<()> {
    let Some(command) = cmd.relay_command() else {
        bot.send_message(msg.chat.id, Command::descriptions().to_string())
            .await?;
        return Ok(());
    };

    let user_id = msg.from.as_ref().map(|user| user.id.0);
    info!("Command {:?} in chat {} from {:?}", cmd, msg.chat.id.0, user_id);

    let reply = relay.on_command(command, msg.chat.id.0, user_id).await?;
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Chat the pressed notification lives in; the presser's own chat when the
/// message is not attached.
fn control_chat_id(query: &CallbackQuery) -> i64 {
    query
        .message
        .as_ref()
        .map(|message| message.chat().id.0)
        .unwrap_or(query.from.id.0 as i64)
}

async fn handle_control(bot: Bot, query: CallbackQuery, relay: Arc<Relay>) -> Result<()> {
    let token = query.data.as_deref().unwrap_or_default();
    let chat_id = control_chat_id(&query);
    let reply = relay.on_control(token, chat_id).await;

    bot.answer_callback_query(query.id.clone())
        .text(reply.text)
        .show_alert(reply.alert)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::ControlAction;

    #[test]
    fn test_commands_parse() {
        assert_eq!(Command::parse("/start", "relay_bot").unwrap(), Command::Start);
        assert_eq!(
            Command::parse("/unsubscribe", "relay_bot").unwrap(),
            Command::Unsubscribe
        );
        assert!(Command::parse("/unknown", "relay_bot").is_err());
    }

    #[test]
    fn test_start_and_subscribe_both_subscribe() {
        assert_eq!(Command::Start.relay_command(), Some(RelayCommand::Subscribe));
        assert_eq!(Command::Subscribe.relay_command(), Some(RelayCommand::Subscribe));
        assert_eq!(Command::Help.relay_command(), None);
    }

    #[test]
    fn test_keyboard_has_one_row_per_control() {
        let controls = vec![
            Control {
                label: "Get XAUUSD Price".to_string(),
                action: ControlAction::FetchPrice,
            },
            Control {
                label: "Unsubscribe".to_string(),
                action: ControlAction::Unsubscribe,
            },
        ];
        let markup = keyboard(&controls);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0][0].text, "Get XAUUSD Price");
    }

    #[test]
    fn test_commands_are_not_source_posts() {
        assert!(is_command_text(Some("/subscribe")));
        assert!(is_command_text(Some("  /status@relay_bot")));
        assert!(!is_command_text(Some("XAUUSD buy 1950 / tp 1960")));
        assert!(!is_command_text(None));
    }

    fn callback_query(message: Option<serde_json::Value>) -> CallbackQuery {
        let mut query = serde_json::json!({
            "id": "4382",
            "from": {"id": 77, "is_bot": false, "first_name": "Ann"},
            "chat_instance": "-1",
            "data": "relay:unsubscribe"
        });
        if let Some(message) = message {
            query["message"] = message;
        }
        serde_json::from_value(query).unwrap()
    }

    #[test]
    fn test_control_acts_on_the_notification_chat() {
        let in_group = callback_query(Some(serde_json::json!({
            "message_id": 12,
            "date": 1700000000,
            "chat": {"id": -555, "type": "group", "title": "Desk"},
            "text": "New Signal"
        })));
        assert_eq!(control_chat_id(&in_group), -555);

        let detached = callback_query(None);
        assert_eq!(control_chat_id(&detached), 77);
    }

    #[test]
    fn test_chat_not_found_is_not_resolvable() {
        assert_eq!(
            send_error(RequestError::Api(ApiError::ChatNotFound)),
            SendError::NotResolvable
        );
        assert_eq!(
            send_error(RequestError::Api(ApiError::Unknown(
                "Bad Request: PEER_ID_INVALID".to_string()
            ))),
            SendError::InvalidRecipient
        );
        assert!(matches!(
            send_error(RequestError::Api(ApiError::BotBlocked)),
            SendError::Transport(_)
        ));
        assert_eq!(
            lookup_error(RequestError::Api(ApiError::ChatNotFound)),
            LookupError::NotFound
        );
    }
}
