use teloxide::utils::html;

/// Inline actions attached to relayed signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    FetchPrice,
    Unsubscribe,
}

impl ControlAction {
    pub fn token(self) -> &'static str {
        match self {
            ControlAction::FetchPrice => "relay:price",
            ControlAction::Unsubscribe => "relay:unsubscribe",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "relay:price" => Some(ControlAction::FetchPrice),
            "relay:unsubscribe" => Some(ControlAction::Unsubscribe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub action: ControlAction,
}

/// HTML-formatted message plus its inline controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub body: String,
    pub controls: Vec<Control>,
}

impl Notification {
    /// Attach the price lookup and unsubscribe buttons.
    pub fn with_live_controls(mut self, instrument: &str) -> Self {
        self.controls = vec![
            Control {
                label: format!("Get {} Price", instrument),
                action: ControlAction::FetchPrice,
            },
            Control {
                label: "Unsubscribe".to_string(),
                action: ControlAction::Unsubscribe,
            },
        ];
        self
    }
}

/// Compose the relayed text. All caller-supplied strings are escaped.
pub fn build(channel: &str, body: &str, origin: Option<&str>, is_edit: bool) -> Notification {
    let header = if is_edit {
        "✏️ <b>Edited Signal in"
    } else {
        "🔔 <b>New Signal in"
    };

    let mut text = format!("{} {}:</b>\n\n{}", header, html::escape(channel), html::escape(body));
    if let Some(origin) = origin {
        text.push_str(&format!("\n\n<i>Forwarded from {}</i>", html::escape(origin)));
    }

    Notification {
        body: text,
        controls: Vec::new(),
    }
}
