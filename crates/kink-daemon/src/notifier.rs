use notify_rust::{Notification, Timeout};
#[cfg(all(unix, not(target_os = "macos")))]
use notify_rust::Urgency;
use tracing::{debug, warn};

use crate::sinks::{Notice, NotifySink};

/// Freedesktop notifications. Each notice is shown from a blocking task so
/// a slow notification daemon never stalls the poll loop.
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

fn timeout_for(secs: i64) -> Timeout {
    if secs > 0 {
        Timeout::Milliseconds(u32::try_from(secs).unwrap_or(u32::MAX).saturating_mul(1000))
    } else {
        Timeout::Default
    }
}

impl NotifySink for DesktopNotifier {
    fn notify(&mut self, notice: Notice) {
        let mut n = Notification::new();
        n.appname(&self.app_name)
            .summary(&notice.summary)
            .timeout(timeout_for(notice.timeout_secs));
        #[cfg(all(unix, not(target_os = "macos")))]
        n.urgency(Urgency::Low);
        if let Some(body) = &notice.body {
            n.body(body);
        }
        if let Some(icon) = &notice.icon {
            n.icon(icon);
        }

        debug!("[notify] {}", notice.summary);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = n.show() {
                warn!("[notify] failed to show notification: {}", e);
            }
        });
    }
}
