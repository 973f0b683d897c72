pub use tray_menu_core::*;

mod tray_menu;
pub use tray_menu::{TrayMenu, TrayMenuAttributes, TrayMenuEvent};
