//! Push notification template.
//!
//! Push payloads carry a plain text body; everything else in the displayed
//! notification is fixed here.

/// Static icon path.
pub const NOTIFICATION_ICON: &str = "/assets/icons/icon-192.png";

/// Static badge path.
pub const NOTIFICATION_BADGE: &str = "/assets/icons/badge-72.png";

/// A notification the host should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub actions: Vec<NotificationAction>,
}

/// One action button on a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    /// Action identifier reported back by the host.
    pub action: String,
    /// Button label.
    pub title: String,
    /// URL to open when chosen, if any.
    pub open_url: Option<String>,
}

/// Build the fixed-template notification for a push body.
pub fn build_notification(title: &str, body: &str) -> Notification {
    Notification {
        title: title.to_string(),
        body: body.to_string(),
        icon: NOTIFICATION_ICON.to_string(),
        badge: NOTIFICATION_BADGE.to_string(),
        actions: vec![
            NotificationAction {
                action: "open".to_string(),
                title: "View details".to_string(),
                open_url: Some("/".to_string()),
            },
            NotificationAction {
                action: "close".to_string(),
                title: "Close".to_string(),
                open_url: None,
            },
        ],
    }
}
