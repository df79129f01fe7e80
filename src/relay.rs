use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::classifier::Classifier;
use crate::config::{Config, SourceChats};
use crate::dispatch::{DispatchReport, FanOut};
use crate::notification::{self, ControlAction};
use crate::origin::OriginResolver;
use crate::platform::{EntityDirectory, IncomingPost, MessageSender};
use crate::price::PriceSource;
use crate::reconciler::{EditOutcome, EditReconciler};
use crate::store::SubscriberStore;

/// Answer to an inline control press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub text: String,
    /// Show as a modal alert instead of a toast.
    pub alert: bool,
}

/// Subscription commands understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    Subscribe,
    Unsubscribe,
    Status,
    Price,
}

/// The signal pipeline. Platform-agnostic: adapters feed it posts, commands
/// and control presses, and it talks back through [`MessageSender`].
pub struct Relay {
    classifier: Classifier,
    reconciler: Arc<EditReconciler>,
    resolver: OriginResolver,
    fanout: FanOut,
    store: SubscriberStore,
    prices: Arc<dyn PriceSource>,
    sources: SourceChats,
    instrument: String,
    allowed_user_ids: Vec<u64>,
}

impl Relay {
    pub fn new(
        config: &Config,
        store: SubscriberStore,
        sender: Arc<dyn MessageSender>,
        directory: Arc<dyn EntityDirectory>,
        prices: Arc<dyn PriceSource>,
    ) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::from_config(&config.classifier)?,
            reconciler: Arc::new(EditReconciler::new()),
            resolver: OriginResolver::new(directory),
            fanout: FanOut::new(sender),
            store,
            prices,
            sources: config.source_chats(),
            instrument: config.classifier.instrument.trim().to_uppercase(),
            allowed_user_ids: config.telegram.allowed_user_ids.clone(),
        })
    }

    pub fn reconciler(&self) -> Arc<EditReconciler> {
        Arc::clone(&self.reconciler)
    }

    #[cfg(test)]
    pub fn store(&self) -> &SubscriberStore {
        &self.store
    }

    pub fn is_source(&self, chat_id: i64, username: Option<&str>) -> bool {
        self.sources.matches(chat_id, username)
    }

    /// Handle a new post. Returns the fan-out report when it was a signal.
    pub async fn on_new_post(&self, post: &IncomingPost) -> Result<Option<DispatchReport>> {
        if !self.classifier.classify(&post.text) {
            info!("Skipped non-signal message {} from {}", post.key(), post.chat_name);
            return Ok(None);
        }

        self.reconciler.observe_new(post.key(), &post.text);
        info!("Signal {} from {}: {}", post.key(), post.chat_name, post.text);
        self.relay(post, false).await.map(Some)
    }

    /// Handle an edit. Only messages that were signals when first seen are
    /// relayed, and only when their text really changed.
    pub async fn on_edited_post(&self, post: &IncomingPost) -> Result<Option<DispatchReport>> {
        match self.reconciler.observe_edit(post.key(), &post.text) {
            EditOutcome::NotTracked => {
                debug!("Ignored edit of untracked message {}", post.key());
                Ok(None)
            }
            EditOutcome::Unchanged => {
                debug!("Ignored edit of {} with unchanged text", post.key());
                Ok(None)
            }
            EditOutcome::Changed(previous) => {
                info!(
                    "Signal {} edited in {}: {:?} -> {:?}",
                    post.key(),
                    post.chat_name,
                    previous,
                    post.text
                );
                self.relay(post, true).await.map(Some)
            }
        }
    }

    async fn relay(&self, post: &IncomingPost, is_edit: bool) -> Result<DispatchReport> {
        let origin = match &post.forward_origin {
            Some(origin) => Some(self.resolver.resolve(origin).await),
            None => None,
        };

        let notification =
            notification::build(&post.chat_name, &post.text, origin.as_deref(), is_edit)
                .with_live_controls(&self.instrument);

        let recipients = self.store.list().await?;
        Ok(self.fanout.dispatch(&notification, &recipients).await)
    }

    fn is_allowed(&self, user_id: Option<u64>) -> bool {
        self.allowed_user_ids.is_empty()
            || user_id.is_some_and(|id| self.allowed_user_ids.contains(&id))
    }

    /// Run a chat command and return the reply text.
    pub async fn on_command(
        &self,
        command: RelayCommand,
        chat_id: i64,
        user_id: Option<u64>,
    ) -> Result<String> {
        let reply = match command {
            RelayCommand::Subscribe => {
                if !self.is_allowed(user_id) {
                    info!("Rejected subscription from {:?} in chat {}", user_id, chat_id);
                    return Ok("You are not allowed to subscribe to signals.".to_string());
                }
                if self.store.add(chat_id).await? {
                    info!("Chat {} subscribed", chat_id);
                    format!(
                        "✅ Subscribed. You will receive {} signals here.",
                        self.instrument
                    )
                } else {
                    "You are already subscribed.".to_string()
                }
            }
            RelayCommand::Unsubscribe => {
                if self.store.remove(chat_id).await? {
                    info!("Chat {} unsubscribed", chat_id);
                    "You have been unsubscribed.".to_string()
                } else {
                    "You are not subscribed.".to_string()
                }
            }
            RelayCommand::Status => {
                let subscribed = self.store.contains(chat_id).await?;
                let total = self.store.count().await?;
                format!(
                    "Subscription: {}\nSubscribers: {}\nTracked signals: {}",
                    if subscribed { "active" } else { "inactive" },
                    total,
                    self.reconciler.len()
                )
            }
            RelayCommand::Price => self.price_reply().await.text,
        };
        Ok(reply)
    }

    /// Handle an inline control press. `chat_id` is the chat holding the
    /// pressed notification, which is the subscriber the control acts on.
    pub async fn on_control(&self, token: &str, chat_id: i64) -> ControlReply {
        match ControlAction::from_token(token) {
            Some(ControlAction::FetchPrice) => self.price_reply().await,
            Some(ControlAction::Unsubscribe) => match self.store.remove(chat_id).await {
                Ok(removed) => {
                    if removed {
                        info!("Chat {} unsubscribed via control", chat_id);
                    }
                    ControlReply {
                        text: "You have been unsubscribed.".to_string(),
                        alert: false,
                    }
                }
                Err(e) => {
                    error!("Failed to unsubscribe {}: {:#}", chat_id, e);
                    ControlReply {
                        text: "❌ Could not unsubscribe. Please try again later.".to_string(),
                        alert: true,
                    }
                }
            },
            None => {
                debug!("Unknown control token {:?} in chat {}", token, chat_id);
                ControlReply {
                    text: "Unknown action.".to_string(),
                    alert: false,
                }
            }
        }
    }

    async fn price_reply(&self) -> ControlReply {
        match self.prices.fetch_price(&self.instrument).await {
            Ok(price) => ControlReply {
                text: format!("💰 Current {} Price: {} USD", self.instrument, price),
                alert: true,
            },
            Err(e) => {
                error!("Error fetching {} price: {}", self.instrument, e);
                ControlReply {
                    text: format!(
                        "❌ Error fetching {} price. Please try again later.",
                        self.instrument
                    ),
                    alert: true,
                }
            }
        }
    }
}
