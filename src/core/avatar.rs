//! Picks the picture shown next to the transcript.

use std::path::{Path, PathBuf};

use crate::core::annotations::SideChannel;
use crate::core::config::settings::AvatarSettings;

/// Image for the current expression and action.
///
/// Generated images live at `<dir>/<expression>_<action>.jpg`; when the
/// combination has no image the default assistant avatar is used.
pub fn expression_image(settings: &AvatarSettings, side_channel: &SideChannel) -> PathBuf {
    let candidate = expression_image_path(
        &settings.expression_images_dir,
        &side_channel.expression,
        &side_channel.action,
    );
    if candidate.is_file() {
        candidate
    } else {
        settings.ema_avatar.clone()
    }
}

pub fn expression_image_path(dir: &Path, expression: &str, action: &str) -> PathBuf {
    dir.join(format!("{expression}_{action}.jpg"))
}
