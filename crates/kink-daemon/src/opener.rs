use kink_proto::platform;
use tracing::{debug, error, warn};

use crate::sinks::OpenSink;

/// Opens targets with `xdg-open` (`open` on macOS). The child is awaited on
/// a background task so it is reaped once the opener exits.
pub struct DesktopOpener;

impl OpenSink for DesktopOpener {
    fn open(&mut self, target: &str) {
        let mut child = match tokio::process::Command::from(platform::open_command(target)).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("[open] failed to open {}: {}", target, e);
                return;
            }
        };

        let target = target.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("[open] opened {}", target),
                Ok(status) => warn!("[open] opener for {} exited with {}", target, status),
                Err(e) => warn!("[open] failed to wait for opener of {}: {}", target, e),
            }
        });
    }
}

