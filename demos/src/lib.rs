//! Common utilities for tray_menu demos.

use std::path::Path;

use anyhow::Context;
use tray_menu::MenuIcon;

/// Decode an image file into a menu icon.
pub fn load_icon(path: &Path) -> anyhow::Result<MenuIcon> {
    let image = image::open(path)
        .with_context(|| format!("failed to open icon {}", path.display()))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    let rgba = image.into_raw();
    Ok(MenuIcon::from_rgba(rgba, width, height)?)
}

/// A small solid-colour icon for runs without an icon file.
pub fn solid_icon(rgba: [u8; 4], size: u32) -> MenuIcon {
    let pixels = rgba.repeat((size * size) as usize);
    MenuIcon::from_rgba(pixels, size, size).expect("buffer matches dimensions")
}
