//! Local notifications.

use anyhow::Result;
use tracing::info;

/// Whether the user allows notifications to be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// A named notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const SABBATH_CHANNEL: NotificationChannel = NotificationChannel {
    id: "sabbath",
    name: "Sabbath",
    description: "Alert when the Sabbath begins",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn sabbath_start(location: Option<&str>) -> Self {
        let body = match location {
            Some(location) => format!("The Sabbath has begun in {}.", location),
            None => "The Sabbath has begun.".to_string(),
        };
        Self {
            channel: SABBATH_CHANNEL,
            title: "Happy Sabbath".to_string(),
            body,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;
    fn post(&self, notification: &Notification) -> Result<()>;
}

/// Posts notifications to the log.
#[derive(Debug, Clone, Copy)]
pub struct LogNotifier {
    permission: Permission,
}

impl LogNotifier {
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

impl Notifier for LogNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn post(&self, notification: &Notification) -> Result<()> {
        info!(
            channel = notification.channel.id,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
        Ok(())
    }
}
