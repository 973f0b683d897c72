use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvError, Sender, TryRecvError};
use std::time::Duration;

use anyhow::Context;
use tray_menu_core::{
    DispatchAttributes, Dispatcher, EntryId, MenuNode, MenuTemplate, MenuTree, NativeHandle,
    NativeToolkit,
};

/// Events produced by a [`TrayMenu`] for its host.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayMenuEvent {
    /// The root menu was rebuilt. The host must hand the new container to the tray indicator.
    RootRebuilt { container: NativeHandle },

    /// An entry's action ran.
    Activated {
        /// The ID of the activated entry.
        id: EntryId,
        label: String,
    },
}

#[derive(Debug)]
pub struct TrayMenuAttributes {
    /// Upper bound on every blocking menu edit.
    pub dispatch_timeout: Duration,
    pub thread_name: String,
    pub menu: Option<Vec<MenuTemplate>>,
}

impl Default for TrayMenuAttributes {
    fn default() -> Self {
        let dispatch = DispatchAttributes::default();
        TrayMenuAttributes {
            dispatch_timeout: dispatch.timeout,
            thread_name: dispatch.thread_name,
            menu: None,
        }
    }
}

impl TrayMenuAttributes {
    /// Set the timeout applied to every synchronous dispatch.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Set the name of the dispatch thread.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the initial menu contents.
    pub fn with_menu(mut self, menu: Vec<MenuTemplate>) -> Self {
        self.menu = Some(menu);
        self
    }
}

/// A tray menu tree with its own dispatch thread.
///
/// Edits go through [`TrayMenu::root`]; the host drains [`TrayMenuEvent`]s with
/// [`TrayMenu::recv`] or [`TrayMenu::try_recv`].
pub struct TrayMenu {
    tree: MenuTree,
    sender: Sender<TrayMenuEvent>,
    receiver: Receiver<TrayMenuEvent>,
}

impl std::fmt::Debug for TrayMenu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayMenu")
            .field("tree", &self.tree)
            .field("receiver", &"<...>")
            .field("sender", &"<...>")
            .finish()
    }
}

impl TrayMenu {
    pub fn new(toolkit: Arc<dyn NativeToolkit>, attr: TrayMenuAttributes) -> anyhow::Result<Self> {
        let dispatcher = Dispatcher::spawn(
            DispatchAttributes::default()
                .with_timeout(attr.dispatch_timeout)
                .with_thread_name(attr.thread_name),
        )
        .context("failed to start menu dispatch thread")?;

        let tree = MenuTree::new(toolkit, dispatcher).context("failed to build root menu")?;

        let (sender, receiver) = mpsc::channel();
        tree.set_on_root_rebuilt({
            let sender = sender.clone();
            move |container| {
                if let Err(e) = sender.send(TrayMenuEvent::RootRebuilt { container }) {
                    tracing::error!("Failed to send tray menu event: {e}");
                }
            }
        });

        if let Some(menu) = attr.menu {
            tree.root()
                .populate(&menu)
                .context("failed to populate initial menu")?;
        }

        Ok(TrayMenu {
            tree,
            sender,
            receiver,
        })
    }

    pub fn root(&self) -> Arc<MenuNode> {
        self.tree.root()
    }

    pub fn tree(&self) -> &MenuTree {
        &self.tree
    }

    /// The container currently attached to the tray indicator.
    pub fn root_native_container(&self) -> Option<NativeHandle> {
        self.tree.root_native_container()
    }

    /// Forward a native activation of `handle` to the owning entry.
    ///
    /// Returns whether an action ran.
    pub fn activate(&self, handle: NativeHandle) -> bool {
        let Some(entry) = self.tree.activate(handle) else {
            return false;
        };
        let event = TrayMenuEvent::Activated {
            id: entry.id(),
            label: entry.label(),
        };
        if let Err(e) = self.sender.send(event) {
            tracing::error!("Failed to send tray menu event: {e}");
        }
        true
    }

    pub fn recv(&self) -> Result<TrayMenuEvent, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<TrayMenuEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Destroy every menu widget and stop the dispatch thread.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.tree.shutdown().context("failed to obliterate tray menu")
    }
}
