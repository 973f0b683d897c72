//! Thread-safe tray menu tree mirrored onto a single-threaded native menu toolkit.
//!
//! Application threads edit [`MenuNode`]s freely; every native call is routed through the
//! [`Dispatcher`] onto the toolkit's affinity thread, and every structural edit tears the native
//! menu down and rebuilds it, since attached native menus cannot be mutated in place.

pub mod dispatch;
pub mod entry;
pub mod error;
pub mod icon;
pub mod native;
pub mod node;
pub mod template;
pub mod tree;

#[cfg(any(test, feature = "headless"))]
pub mod headless;

pub use dispatch::{DispatchAttributes, Dispatcher};
pub use entry::{EntryId, EntryKind, MenuAction, MenuEntry};
pub use error::MenuError;
pub use icon::{BadIcon, MenuIcon};
pub use native::{ItemImage, NativeHandle, NativeToolkit};
pub use node::MenuNode;
pub use template::{ItemTemplate, MenuTemplate, SubmenuTemplate};
pub use tree::{MenuTree, RootRebuiltHook};

use std::sync::Arc;

use parking_lot::Mutex;

/// Shared by every node and entry of one tree.
pub(crate) struct MenuContext {
    pub(crate) toolkit: Arc<dyn NativeToolkit>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) root_hook: Mutex<Option<RootRebuiltHook>>,
}

impl MenuContext {
    pub(crate) fn new(toolkit: Arc<dyn NativeToolkit>, dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(MenuContext {
            toolkit,
            dispatcher,
            root_hook: Mutex::new(None),
        })
    }

    pub(crate) fn toolkit(&self) -> &dyn NativeToolkit {
        &*self.toolkit
    }
}

impl std::fmt::Debug for MenuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuContext")
            .field("dispatcher", &self.dispatcher)
            .field("toolkit", &"<...>")
            .finish()
    }
}
