//! Desktop notifications
//!
//! Every message is logged; when notifications are enabled it is also shown
//! through the platform's notification service. A notification that fails to
//! show is logged and otherwise ignored.

#[cfg(not(windows))]
mod desktop;
#[cfg(windows)]
mod windows;

use tracing::{error, info, warn};

pub const APP_NAME: &str = "vipconnect";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Where user-facing outcome messages go
pub trait Notifier {
    fn notify(&self, severity: Severity, title: &str, body: &str);

    fn info(&self, title: &str, body: &str) {
        self.notify(Severity::Info, title, body);
    }

    fn error(&self, title: &str, body: &str) {
        self.notify(Severity::Error, title, body);
    }
}

pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, severity: Severity, title: &str, body: &str) {
        match severity {
            Severity::Info => info!("{}: {}", title, body),
            Severity::Error => error!("{}: {}", title, body),
        }

        if !self.enabled {
            return;
        }

        #[cfg(not(windows))]
        let shown = desktop::show(severity, title, body);
        #[cfg(windows)]
        let shown = windows::show(severity, title, body);

        if let Err(e) = shown {
            warn!("Failed to show notification: {}", e);
        }
    }
}
