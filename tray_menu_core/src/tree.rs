//! The root of a menu tree and its contract with the tray indicator.

use std::sync::Arc;

use tracing::debug;

use crate::MenuContext;
use crate::dispatch::Dispatcher;
use crate::entry::MenuEntry;
use crate::error::MenuError;
use crate::native::{NativeHandle, NativeToolkit};
use crate::node::MenuNode;

/// Called on the dispatch thread with the new root container after every root rebuild.
///
/// Runs once the rebuild has released its locks, so the hook may read the tree.
pub type RootRebuiltHook = Arc<dyn Fn(NativeHandle) + Send + Sync>;

/// A root [`MenuNode`] and every submenu reachable from it.
#[derive(Debug)]
pub struct MenuTree {
    ctx: Arc<MenuContext>,
    root: Arc<MenuNode>,
}

impl MenuTree {
    /// Create an empty tree whose root menu is already live.
    pub fn new(
        toolkit: Arc<dyn NativeToolkit>,
        dispatcher: Dispatcher,
    ) -> Result<Self, MenuError> {
        let ctx = MenuContext::new(toolkit, dispatcher);
        let root = MenuNode::new_root(ctx.clone());
        root.build()?;
        debug!(root = ?root.native_handle(), "created menu tree");
        Ok(MenuTree { ctx, root })
    }

    pub fn root(&self) -> Arc<MenuNode> {
        self.root.clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.ctx.dispatcher
    }

    /// The live root container to hand to the tray indicator.
    pub fn root_native_container(&self) -> Option<NativeHandle> {
        self.root.native_handle()
    }

    /// Register the hook told about every new root container.
    pub fn set_on_root_rebuilt(&self, hook: impl Fn(NativeHandle) + Send + Sync + 'static) {
        *self.ctx.root_hook.lock() = Some(Arc::new(hook));
    }

    /// The entry whose native widget is `handle`, anywhere in the tree.
    pub fn find_entry(&self, handle: NativeHandle) -> Option<Arc<MenuEntry>> {
        self.root.find_by_native(handle)
    }

    /// Run the action of the entry owning `handle`, on the calling thread.
    ///
    /// Returns the entry when an action ran.
    pub fn activate(&self, handle: NativeHandle) -> Option<Arc<MenuEntry>> {
        let entry = self.find_entry(handle)?;
        entry.activate().then_some(entry)
    }

    /// Obliterate every menu and stop the dispatch thread.
    pub fn shutdown(&self) -> Result<(), MenuError> {
        debug!("shutting down menu tree");
        let result = self.root.obliterate();
        self.ctx.dispatcher.shutdown();
        result
    }
}
