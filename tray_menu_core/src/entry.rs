//! A single item in a menu and its native widget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::MenuContext;
use crate::error::MenuError;
use crate::icon::MenuIcon;
use crate::native::{self, ItemImage, NativeHandle};
use crate::node::MenuNode;

static NEXT_ENTRY_ID: AtomicUsize = AtomicUsize::new(1);

/// Process-wide unique entry number, carried in activation events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(usize);

impl EntryId {
    fn next() -> Self {
        EntryId(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn into_raw(self) -> usize {
        self.0
    }

    pub const fn from_raw(raw: usize) -> Self {
        EntryId(raw)
    }
}

/// Invoked when the user activates an entry.
pub type MenuAction = Arc<dyn Fn(&MenuEntry) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A clickable item.
    Item,
    /// A visual separator line.
    Separator,
    /// An item that opens a nested [`MenuNode`].
    Submenu,
}

struct EntryState {
    label: String,
    icon: Option<MenuIcon>,
    enabled: bool,
    visible: bool,
    action: Option<MenuAction>,
    native: Option<NativeHandle>,
    /// Container the native widget is currently appended to.
    container: Option<NativeHandle>,
    submenu: Option<Arc<MenuNode>>,
}

/// An entry of a [`MenuNode`].
///
/// The native widget is created with the entry and survives every rebuild of the owning menu;
/// only removal or obliteration destroys it.
pub struct MenuEntry {
    id: EntryId,
    kind: EntryKind,
    ctx: Arc<MenuContext>,
    owner: Weak<MenuNode>,
    state: Mutex<EntryState>,
}

impl std::fmt::Debug for MenuEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MenuEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &state.label)
            .field("icon", &state.icon)
            .field("native", &state.native)
            .finish_non_exhaustive()
    }
}

impl MenuEntry {
    /// Must run on the dispatch thread.
    pub(crate) fn new(
        ctx: Arc<MenuContext>,
        owner: Weak<MenuNode>,
        kind: EntryKind,
        label: String,
        icon: Option<MenuIcon>,
        action: Option<MenuAction>,
    ) -> Arc<Self> {
        let native = match kind {
            EntryKind::Separator => ctx.toolkit().separator_new(),
            EntryKind::Item | EntryKind::Submenu => ctx.toolkit().menu_item_new(),
        };
        let id = EntryId::next();
        trace!(?id, ?kind, %label, ?native, "created menu entry");

        Arc::new(MenuEntry {
            id,
            kind,
            ctx,
            owner,
            state: Mutex::new(EntryState {
                label,
                icon,
                enabled: true,
                visible: true,
                action,
                native: Some(native),
                container: None,
                submenu: None,
            }),
        })
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Empty for separators.
    pub fn label(&self) -> String {
        self.state.lock().label.clone()
    }

    pub fn icon(&self) -> Option<MenuIcon> {
        self.state.lock().icon.clone()
    }

    pub fn has_icon(&self) -> bool {
        self.state.lock().icon.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    /// The native widget, until the entry is removed.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.state.lock().native
    }

    /// The menu node owning this entry, while it exists.
    pub fn owner(&self) -> Option<Arc<MenuNode>> {
        self.owner.upgrade()
    }

    /// The menu opened by this entry, for [`EntryKind::Submenu`] entries.
    pub fn submenu(&self) -> Option<Arc<MenuNode>> {
        self.state.lock().submenu.clone()
    }

    pub(crate) fn set_submenu(&self, node: Arc<MenuNode>) {
        self.state.lock().submenu = Some(node);
    }

    pub(crate) fn matches_label(&self, label: &str) -> bool {
        self.kind != EntryKind::Separator && self.state.lock().label == label
    }

    /// Change the label on the live widget without rebuilding the menu.
    ///
    /// Fails with [`MenuError::InvalidArgument`] if a sibling already uses `label`.
    pub fn set_label(self: &Arc<Self>, label: &str) -> Result<(), MenuError> {
        if label.is_empty() {
            return Err(MenuError::InvalidArgument("menu text cannot be empty"));
        }
        let label = label.to_owned();
        let entry = self.clone();
        self.ctx.dispatcher.post_and_wait(move || -> Result<(), MenuError> {
            if entry.kind == EntryKind::Separator {
                return Ok(());
            }
            // Labels are the lookup key of `MenuNode::get` and `remove`.
            if let Some(owner) = entry.owner.upgrade() {
                if owner.has_other_entry_labelled(&entry, &label) {
                    return Err(MenuError::InvalidArgument(
                        "another entry of this menu already has that text",
                    ));
                }
            }
            let mut state = entry.state.lock();
            if let Some(native) = state.native {
                entry.ctx.toolkit().set_label(native, &label);
            }
            state.label = label;
            Ok(())
        })?
    }

    /// Enable or grey out the entry without rebuilding the menu.
    pub fn set_enabled(self: &Arc<Self>, enabled: bool) -> Result<(), MenuError> {
        let entry = self.clone();
        self.ctx.dispatcher.post_and_wait(move || {
            let mut state = entry.state.lock();
            state.enabled = enabled;
            if let Some(native) = state.native {
                entry.ctx.toolkit().set_sensitive(native, enabled);
            }
        })
    }

    /// Show or hide the entry without rebuilding the menu.
    pub fn set_visible(self: &Arc<Self>, visible: bool) -> Result<(), MenuError> {
        let entry = self.clone();
        self.ctx.dispatcher.post_and_wait(move || {
            let mut state = entry.state.lock();
            state.visible = visible;
            if let Some(native) = state.native {
                entry.ctx.toolkit().set_visible(native, visible);
            }
        })
    }

    /// Replace the icon. The owning menu is rebuilt only if its icon column appears or vanishes.
    pub fn set_icon(self: &Arc<Self>, icon: Option<MenuIcon>) -> Result<(), MenuError> {
        let owner = self.owner.upgrade().ok_or(MenuError::Obliterated)?;
        owner.set_entry_icon(self, icon)
    }

    /// Remove this entry from its menu.
    pub fn remove(self: &Arc<Self>) -> Result<bool, MenuError> {
        let owner = self.owner.upgrade().ok_or(MenuError::Obliterated)?;
        owner.remove_entry(self)
    }

    /// Run the entry's action, if any. Returns whether one ran.
    pub fn activate(&self) -> bool {
        let action = {
            let state = self.state.lock();
            if !state.enabled {
                return false;
            }
            state.action.clone()
        };
        match action {
            Some(action) => {
                trace!(id = ?self.id, "activating menu entry");
                action(self);
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_icon(&self, icon: Option<MenuIcon>) {
        self.state.lock().icon = icon;
    }

    /// Redraw label and icon column. `has_icon_column` is true when any sibling shows an icon,
    /// in which case icon-less entries get a spacer so all labels line up.
    pub(crate) fn render(&self, has_icon_column: bool) {
        let state = self.state.lock();
        let Some(native) = state.native else {
            return;
        };
        if self.kind == EntryKind::Separator {
            return;
        }

        let toolkit = self.ctx.toolkit();
        toolkit.set_label(native, &state.label);
        let image = match &state.icon {
            Some(icon) => ItemImage::Icon(icon),
            None if has_icon_column => ItemImage::Spacer,
            None => ItemImage::None,
        };
        toolkit.set_image(native, image);
        toolkit.set_sensitive(native, state.enabled);
    }

    /// Append to `container`, claiming ownership of the widget.
    pub(crate) fn attach(&self, container: NativeHandle) {
        let mut state = self.state.lock();
        let Some(native) = state.native else {
            return;
        };
        native::attach_child(self.ctx.toolkit(), container, native);
        state.container = Some(container);
    }

    /// Re-apply a hidden state after the container was shown recursively.
    pub(crate) fn apply_visibility(&self) {
        let state = self.state.lock();
        if let (Some(native), false) = (state.native, state.visible) {
            self.ctx.toolkit().set_visible(native, false);
        }
    }

    /// Take the widget out of its container, keeping it alive. No-op when not attached.
    pub(crate) fn detach_native(&self) {
        let mut state = self.state.lock();
        if let (Some(native), Some(container)) = (state.native, state.container.take()) {
            native::detach_child(self.ctx.toolkit(), container, native);
        }
    }

    /// Destroy the widget for good. No-op when already destroyed.
    pub(crate) fn destroy_native(&self) {
        let mut state = self.state.lock();
        state.container = None;
        if let Some(native) = state.native.take() {
            trace!(id = ?self.id, ?native, "destroying menu entry widget");
            self.ctx.toolkit().destroy(native);
        }
    }
}
