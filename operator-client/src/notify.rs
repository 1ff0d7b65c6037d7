//! Operator notifications and the dismissible message board

use chrono::Utc;
use operator_core::{MessageLevel, NotificationPermission, OperatorMessage};
use tracing::{error, info, warn};

/// Delivers short notifications to the operator
pub trait Notifier: Send + Sync + 'static {
    fn permission(&self) -> NotificationPermission;

    fn notify(&self, title: &str, body: &str);
}

/// Notifier that writes through tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier {
    permission: NotificationPermission,
}

impl LogNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self { permission }
    }
}

impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    fn notify(&self, title: &str, body: &str) {
        info!("[Notify] {}: {}", title, body);
    }
}

/// Messages shown to the operator until dismissed
#[derive(Debug, Default)]
pub struct MessageBoard {
    messages: Vec<OperatorMessage>,
    next_id: u64,
}

impl MessageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a message and return its ID
    pub fn push(&mut self, level: MessageLevel, text: impl Into<String>) -> u64 {
        self.next_id += 1;
        let message = OperatorMessage {
            id: self.next_id,
            level,
            text: text.into(),
            created_at: Utc::now(),
        };

        match level {
            MessageLevel::Info => info!("[Alerts] {}", message.text),
            MessageLevel::Warning => warn!("[Alerts] {}", message.text),
            MessageLevel::Error => error!("[Alerts] {}", message.text),
        }

        self.messages.push(message);
        self.next_id
    }

    /// Remove a message; `false` if the ID is unknown
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Undismissed messages, oldest first
    pub fn active(&self) -> &[OperatorMessage] {
        &self.messages
    }
}
