//! Declarative menu descriptions, applied with [`MenuNode::populate`](crate::MenuNode::populate).

use std::sync::Arc;

use crate::entry::{MenuAction, MenuEntry};
use crate::icon::MenuIcon;

/// A clickable menu item.
#[derive(Clone)]
pub struct ItemTemplate {
    /// Text label displayed for this item. Also its name within the menu.
    pub label: String,
    /// Whether this item is enabled (clickable).
    pub enabled: bool,
    /// Optional icon displayed next to the label.
    pub icon: Option<MenuIcon>,
    pub action: Option<MenuAction>,
}

impl std::fmt::Debug for ItemTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemTemplate")
            .field("label", &self.label)
            .field("enabled", &self.enabled)
            .field("icon", &self.icon)
            .field("action", &self.action.as_ref().map(|_| "<...>"))
            .finish()
    }
}

impl ItemTemplate {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            icon: None,
            action: None,
        }
    }

    /// Set whether this item is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set an icon for this menu item.
    pub fn icon(mut self, icon: MenuIcon) -> Self {
        self.icon = Some(icon);
        self
    }

    /// Run `action` when the item is activated.
    pub fn action(mut self, action: impl Fn(&MenuEntry) + Send + Sync + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }
}

/// A submenu containing nested menu entries.
#[derive(Debug, Clone)]
pub struct SubmenuTemplate {
    /// Text label displayed for this submenu.
    pub label: String,
    /// Whether this submenu is enabled.
    pub enabled: bool,
    pub icon: Option<MenuIcon>,
    /// Nested menu entries.
    pub items: Vec<MenuTemplate>,
}

impl SubmenuTemplate {
    /// Create a new submenu with the given label and items.
    pub fn new(label: impl Into<String>, items: Vec<MenuTemplate>) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            icon: None,
            items,
        }
    }

    /// Set whether this submenu is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn icon(mut self, icon: MenuIcon) -> Self {
        self.icon = Some(icon);
        self
    }
}

/// An entry in a menu description, which can be an item, submenu, or separator.
#[derive(Debug, Clone)]
pub enum MenuTemplate {
    Item(ItemTemplate),
    Submenu(SubmenuTemplate),
    /// A visual separator line.
    Separator,
}

impl From<ItemTemplate> for MenuTemplate {
    fn from(item: ItemTemplate) -> Self {
        MenuTemplate::Item(item)
    }
}

impl From<SubmenuTemplate> for MenuTemplate {
    fn from(submenu: SubmenuTemplate) -> Self {
        MenuTemplate::Submenu(submenu)
    }
}
