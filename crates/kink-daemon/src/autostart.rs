use std::path::Path;
use tracing::info;

const DESKTOP_ENTRY: &str = "[Desktop Entry]
Type=Application
Name=KINK Playing
Comment=Show what KINK is playing
Exec=kink-playing
Icon=kink-playing
Terminal=false
X-GNOME-Autostart-enabled=true
";

/// Install or remove the XDG autostart entry to match the setting.
pub fn apply(enabled: bool, entry_path: &Path) -> anyhow::Result<()> {
    if enabled {
        if !entry_path.exists() {
            kink_proto::platform::ensure_parent(entry_path)?;
            std::fs::write(entry_path, DESKTOP_ENTRY)?;
            info!("Autostart enabled: {:?}", entry_path);
        }
    } else if entry_path.exists() {
        std::fs::remove_file(entry_path)?;
        info!("Autostart disabled: removed {:?}", entry_path);
    }
    Ok(())
}
