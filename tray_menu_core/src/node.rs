//! Menu nodes and the teardown/rebuild protocol.
//!
//! Some native menu implementations refuse any change to a menu once it is attached to the tray
//! indicator. Every structural edit therefore destroys the native menus from the root down to the
//! edited node, changes the entry list, and builds them again, all inside one task on the
//! dispatch thread while holding the locks of every node on that path.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

use crate::MenuContext;
use crate::entry::{EntryKind, MenuAction, MenuEntry};
use crate::error::MenuError;
use crate::icon::MenuIcon;
use crate::native::NativeHandle;
use crate::template::MenuTemplate;

#[derive(Default)]
struct NodeState {
    /// Present exactly while the node is live.
    native: Option<NativeHandle>,
    entries: Vec<Arc<MenuEntry>>,
    /// Completed builds.
    generation: u64,
    obliterated: bool,
}

impl NodeState {
    fn find(&self, label: &str) -> Option<Arc<MenuEntry>> {
        self.entries.iter().find(|e| e.matches_label(label)).cloned()
    }

    fn has_icon_column(&self) -> bool {
        self.entries.iter().any(|e| e.has_icon())
    }
}

/// A menu: an ordered list of entries mirrored by one native menu container.
///
/// The root node has no parent; every other node is the submenu of a [`MenuEntry`] owned by its
/// parent node.
pub struct MenuNode {
    ctx: Arc<MenuContext>,
    parent: Option<Weak<MenuNode>>,
    parent_entry: Option<Weak<MenuEntry>>,
    state: Mutex<NodeState>,
}

impl std::fmt::Debug for MenuNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MenuNode")
            .field("native", &state.native)
            .field("entries", &state.entries.len())
            .field("generation", &state.generation)
            .field("obliterated", &state.obliterated)
            .finish_non_exhaustive()
    }
}

/// Locks held on a node and all of its ancestors, root first.
///
/// The root-rebuilt hook fires when the chain is dropped, after every lock is released, so the
/// hook may read the tree.
struct Chain<'a> {
    nodes: &'a [Arc<MenuNode>],
    states: Vec<MutexGuard<'a, NodeState>>,
    rebuilt_root: Option<NativeHandle>,
}

impl<'a> Chain<'a> {
    fn lock(nodes: &'a [Arc<MenuNode>]) -> Self {
        let states = nodes.iter().map(|node| node.state.lock()).collect();
        Chain {
            nodes,
            states,
            rebuilt_root: None,
        }
    }

    /// The node the chain was built for.
    fn target(&mut self) -> &mut NodeState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    fn ensure_editable(&self) -> Result<(), MenuError> {
        if self.states.iter().any(|state| state.obliterated) {
            return Err(MenuError::Obliterated);
        }
        Ok(())
    }

    fn teardown(&mut self) {
        for (node, state) in self.nodes.iter().zip(self.states.iter_mut()) {
            node.teardown_locked(state);
        }
    }

    /// Parents are built before their children, so a submenu is only ever attached to a trigger
    /// whose menu is live.
    fn build(&mut self) -> Result<(), MenuError> {
        let mut parent_live = true;
        for (i, (node, state)) in self.nodes.iter().zip(self.states.iter_mut()).enumerate() {
            let generation = state.generation;
            // The next node in the chain is locked here and gets built on the next turn.
            node.build_locked(state, parent_live, self.nodes.get(i + 1))?;
            parent_live = state.native.is_some();

            if node.is_root() && state.generation != generation {
                self.rebuilt_root = state.native;
            }
        }
        Ok(())
    }
}

impl Drop for Chain<'_> {
    fn drop(&mut self) {
        self.states.clear();
        let Some(container) = self.rebuilt_root.take() else {
            return;
        };
        let Some(root) = self.nodes.first() else {
            return;
        };
        let hook = root.ctx.root_hook.lock().clone();
        if let Some(hook) = hook {
            hook(container);
        }
    }
}

fn validate_text(text: &str) -> Result<String, MenuError> {
    if text.is_empty() {
        return Err(MenuError::InvalidArgument("menu text cannot be empty"));
    }
    Ok(text.to_owned())
}

impl MenuNode {
    pub(crate) fn new_root(ctx: Arc<MenuContext>) -> Arc<Self> {
        Arc::new(MenuNode {
            ctx,
            parent: None,
            parent_entry: None,
            state: Mutex::new(NodeState::default()),
        })
    }

    fn new_submenu(
        ctx: Arc<MenuContext>,
        parent: &Arc<MenuNode>,
        entry: &Arc<MenuEntry>,
    ) -> Arc<Self> {
        Arc::new(MenuNode {
            ctx,
            parent: Some(Arc::downgrade(parent)),
            parent_entry: Some(Arc::downgrade(entry)),
            state: Mutex::new(NodeState::default()),
        })
    }

    /// The node this one is a submenu of. `None` for the root.
    pub fn parent(&self) -> Option<Arc<MenuNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// The entry that opens this submenu. `None` for the root.
    pub fn parent_entry(&self) -> Option<Arc<MenuEntry>> {
        self.parent_entry.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the native menu currently exists.
    pub fn is_live(&self) -> bool {
        self.state.lock().native.is_some()
    }

    pub fn is_obliterated(&self) -> bool {
        self.state.lock().obliterated
    }

    /// The native menu container. Changes identity on every rebuild.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.state.lock().native
    }

    /// Number of builds completed so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Snapshot of the entries in display order.
    pub fn entries(&self) -> Vec<Arc<MenuEntry>> {
        self.state.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The non-separator entry labelled `text`.
    pub fn get(&self, text: &str) -> Option<Arc<MenuEntry>> {
        self.state.lock().find(text)
    }

    /// Add an item, or update the icon of the existing entry with the same label.
    ///
    /// Blocks until the menu has been rebuilt on the dispatch thread.
    pub fn add_entry(
        self: &Arc<Self>,
        text: &str,
        icon: Option<MenuIcon>,
        action: Option<MenuAction>,
    ) -> Result<Arc<MenuEntry>, MenuError> {
        let text = validate_text(text)?;
        let node = self.clone();

        self.ctx.dispatcher.post_and_wait(move || -> Result<Arc<MenuEntry>, MenuError> {
            let nodes = node.ancestry();
            let mut chain = Chain::lock(&nodes);
            chain.ensure_editable()?;

            if let Some(existing) = chain.target().find(&text) {
                trace!(label = %text, "entry exists, updating in place");
                node.update_icon_locked(&mut chain, &existing, icon)?;
                return Ok(existing);
            }

            chain.teardown();
            let entry = MenuEntry::new(
                node.ctx.clone(),
                Arc::downgrade(&node),
                EntryKind::Item,
                text,
                icon,
                action,
            );
            chain.target().entries.push(entry.clone());
            chain.build()?;

            debug!(id = ?entry.id(), label = %entry.label(), "added menu entry");
            Ok(entry)
        })?
    }

    /// Add a submenu, or return the existing one with the same label.
    ///
    /// The new submenu has no native menu until something is added to it.
    pub fn add_submenu(
        self: &Arc<Self>,
        text: &str,
        icon: Option<MenuIcon>,
    ) -> Result<Arc<MenuNode>, MenuError> {
        let text = validate_text(text)?;
        let node = self.clone();

        self.ctx.dispatcher.post_and_wait(move || -> Result<Arc<MenuNode>, MenuError> {
            let nodes = node.ancestry();
            let mut chain = Chain::lock(&nodes);
            chain.ensure_editable()?;

            if let Some(existing) = chain.target().find(&text) {
                let Some(submenu) = existing.submenu() else {
                    return Err(MenuError::NotASubmenu { label: text });
                };
                node.update_icon_locked(&mut chain, &existing, icon)?;
                return Ok(submenu);
            }

            chain.teardown();
            let entry = MenuEntry::new(
                node.ctx.clone(),
                Arc::downgrade(&node),
                EntryKind::Submenu,
                text,
                icon,
                None,
            );
            let submenu = MenuNode::new_submenu(node.ctx.clone(), &node, &entry);
            entry.set_submenu(submenu.clone());
            chain.target().entries.push(entry.clone());
            chain.build()?;

            debug!(id = ?entry.id(), label = %entry.label(), "added submenu");
            Ok(submenu)
        })?
    }

    /// Append a separator without waiting for the rebuild.
    pub fn add_separator(self: &Arc<Self>) -> Result<(), MenuError> {
        let node = self.clone();

        self.ctx.dispatcher.post(move || {
            let nodes = node.ancestry();
            let mut chain = Chain::lock(&nodes);
            if let Err(e) = chain.ensure_editable() {
                warn!(%e, "dropping separator");
                return;
            }

            chain.teardown();
            let entry = MenuEntry::new(
                node.ctx.clone(),
                Arc::downgrade(&node),
                EntryKind::Separator,
                String::new(),
                None,
                None,
            );
            chain.target().entries.push(entry);
            if let Err(e) = chain.build() {
                error!(%e, "failed to rebuild menu after adding separator");
            }
        })
    }

    /// Remove the non-separator entry labelled `text`. Returns whether one was removed.
    ///
    /// Removing a submenu entry obliterates the submenu.
    pub fn remove(self: &Arc<Self>, text: &str) -> Result<bool, MenuError> {
        let text = validate_text(text)?;
        self.remove_where(move |entry| entry.matches_label(&text))
    }

    /// Remove `entry` if this node owns it.
    pub fn remove_entry(self: &Arc<Self>, entry: &Arc<MenuEntry>) -> Result<bool, MenuError> {
        let target = Arc::downgrade(entry);
        self.remove_where(move |candidate| std::ptr::eq(candidate, target.as_ptr()))
    }

    fn remove_where(
        self: &Arc<Self>,
        predicate: impl Fn(&MenuEntry) -> bool + Send + 'static,
    ) -> Result<bool, MenuError> {
        let node = self.clone();

        self.ctx.dispatcher.post_and_wait(move || -> Result<bool, MenuError> {
            let nodes = node.ancestry();
            let mut chain = Chain::lock(&nodes);
            chain.ensure_editable()?;

            let Some(index) = chain.target().entries.iter().position(|e| predicate(&**e)) else {
                return Ok(false);
            };

            chain.teardown();
            let entry = chain.target().entries.remove(index);
            if let Some(submenu) = entry.submenu() {
                submenu.obliterate_now();
            }
            entry.destroy_native();
            chain.build()?;

            debug!(id = ?entry.id(), label = %entry.label(), "removed menu entry");
            Ok(true)
        })?
    }

    /// Add every template in order.
    pub fn populate(self: &Arc<Self>, templates: &[MenuTemplate]) -> Result<(), MenuError> {
        for template in templates {
            match template {
                MenuTemplate::Item(item) => {
                    let entry = self.add_entry(&item.label, item.icon.clone(), item.action.clone())?;
                    if !item.enabled {
                        entry.set_enabled(false)?;
                    }
                }
                MenuTemplate::Submenu(submenu) => {
                    let node = self.add_submenu(&submenu.label, submenu.icon.clone())?;
                    node.populate(&submenu.items)?;
                    if !submenu.enabled {
                        if let Some(entry) = node.parent_entry() {
                            entry.set_enabled(false)?;
                        }
                    }
                }
                MenuTemplate::Separator => self.add_separator()?,
            }
        }
        Ok(())
    }

    /// Destroy the native menus of this node and its ancestors. Entries keep their widgets.
    pub fn teardown(self: &Arc<Self>) -> Result<(), MenuError> {
        let node = self.clone();
        self.ctx.dispatcher.post_and_wait(move || {
            let nodes = node.ancestry();
            Chain::lock(&nodes).teardown();
        })
    }

    /// Build the native menus of this node and any torn down ancestors, then restore torn down
    /// submenus below them. Live nodes are left untouched.
    pub fn build(self: &Arc<Self>) -> Result<(), MenuError> {
        let node = self.clone();
        self.ctx.dispatcher.post_and_wait(move || -> Result<(), MenuError> {
            let nodes = node.ancestry();
            let mut chain = Chain::lock(&nodes);
            chain.ensure_editable()?;
            chain.build()
        })?
    }

    /// Destroy every widget of this node and its submenus for good.
    ///
    /// Meant for shutdown; the node rejects any further edit or build.
    pub fn obliterate(self: &Arc<Self>) -> Result<(), MenuError> {
        let node = self.clone();
        self.ctx.dispatcher.post_and_wait(move || node.obliterate_now())
    }

    pub(crate) fn set_entry_icon(
        self: &Arc<Self>,
        entry: &Arc<MenuEntry>,
        icon: Option<MenuIcon>,
    ) -> Result<(), MenuError> {
        let node = self.clone();
        let entry = entry.clone();
        self.ctx.dispatcher.post_and_wait(move || -> Result<(), MenuError> {
            let nodes = node.ancestry();
            let mut chain = Chain::lock(&nodes);
            chain.ensure_editable()?;
            node.update_icon_locked(&mut chain, &entry, icon)
        })?
    }

    /// Entry owning the given native widget, searched depth first.
    ///
    /// Locks one node at a time, so it may be called from any thread.
    pub fn find_by_native(&self, handle: NativeHandle) -> Option<Arc<MenuEntry>> {
        for entry in self.entries() {
            if entry.native_handle() == Some(handle) {
                return Some(entry);
            }
            if let Some(found) = entry.submenu().and_then(|s| s.find_by_native(handle)) {
                return Some(found);
            }
        }
        None
    }

    /// Root first, ending with `self`.
    fn ancestry(self: &Arc<Self>) -> Vec<Arc<MenuNode>> {
        let mut nodes = vec![self.clone()];
        let mut next = self.parent();
        while let Some(node) = next {
            next = node.parent();
            nodes.push(node);
        }
        nodes.reverse();
        nodes
    }

    /// Apply an icon change; a full rebuild is only needed when the icon column flips, since
    /// every sibling then has to gain or lose its spacer.
    fn update_icon_locked(
        &self,
        chain: &mut Chain<'_>,
        entry: &Arc<MenuEntry>,
        icon: Option<MenuIcon>,
    ) -> Result<(), MenuError> {
        let had_column = chain.target().has_icon_column();
        entry.replace_icon(icon);
        let has_column = chain.target().has_icon_column();

        if had_column != has_column {
            chain.teardown();
            chain.build()
        } else {
            entry.render(has_column);
            Ok(())
        }
    }

    fn teardown_locked(&self, state: &mut NodeState) {
        let Some(container) = state.native.take() else {
            return;
        };
        debug!(?container, entries = state.entries.len(), "tearing down menu");

        for entry in &state.entries {
            entry.detach_native();
        }
        self.ctx.toolkit().destroy(container);
    }

    /// Build this node if it is torn down, then restore every submenu below it that was torn
    /// down after having been built. A submenu never built stays empty until its first edit.
    ///
    /// `pending` is the child the caller still holds locked and builds itself.
    fn build_locked(
        &self,
        state: &mut NodeState,
        parent_live: bool,
        pending: Option<&Arc<MenuNode>>,
    ) -> Result<(), MenuError> {
        if state.obliterated {
            return Err(MenuError::Obliterated);
        }
        if state.native.is_none() {
            self.create_container(state, parent_live)?;
        }

        for entry in &state.entries {
            let Some(submenu) = entry.submenu() else {
                continue;
            };
            if pending.is_some_and(|p| Arc::ptr_eq(p, &submenu)) {
                continue;
            }
            let mut sub_state = submenu.state.lock();
            if sub_state.obliterated || sub_state.generation == 0 {
                continue;
            }
            if sub_state.native.is_none() {
                trace!(label = %entry.label(), "restoring torn down submenu");
            }
            submenu.build_locked(&mut sub_state, true, None)?;
        }
        Ok(())
    }

    fn create_container(&self, state: &mut NodeState, parent_live: bool) -> Result<(), MenuError> {
        let toolkit = self.ctx.toolkit();
        let trigger = match self.parent_entry() {
            Some(entry) => match entry.native_handle() {
                Some(item) if parent_live => Some(item),
                _ => return Err(MenuError::ParentNotLive { label: entry.label() }),
            },
            None => None,
        };

        let container = toolkit.menu_new();
        if let Some(item) = trigger {
            toolkit.set_submenu(item, Some(container));
        }

        let has_icon_column = state.has_icon_column();
        for entry in &state.entries {
            entry.render(has_icon_column);
            entry.attach(container);

            // A live submenu keeps its own container on the trigger widget through this rebuild.
            if entry.submenu().is_some() {
                if let Some(item) = entry.native_handle() {
                    toolkit.set_sensitive(item, entry.is_enabled());
                }
            }
        }

        toolkit.show_all(container);
        for entry in &state.entries {
            entry.apply_visibility();
        }

        state.native = Some(container);
        state.generation += 1;
        debug!(
            ?container,
            entries = state.entries.len(),
            generation = state.generation,
            "built menu"
        );
        Ok(())
    }

    /// Whether an entry other than `entry` already uses `label`.
    pub(crate) fn has_other_entry_labelled(&self, entry: &Arc<MenuEntry>, label: &str) -> bool {
        self.state
            .lock()
            .entries
            .iter()
            .any(|e| !Arc::ptr_eq(e, entry) && e.matches_label(label))
    }

    /// Must run on the dispatch thread.
    pub(crate) fn obliterate_now(&self) {
        let mut state = self.state.lock();
        if state.obliterated {
            return;
        }

        let toolkit = self.ctx.toolkit();
        for entry in state.entries.drain(..) {
            if let Some(submenu) = entry.submenu() {
                submenu.obliterate_now();
            }
            entry.destroy_native();
        }
        if let Some(container) = state.native.take() {
            toolkit.destroy(container);
        }
        state.obliterated = true;
        debug!("obliterated menu");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::headless::{HeadlessToolkit, ImageState, NativeCall};
    use crate::template::{ItemTemplate, SubmenuTemplate};
    use crate::{DispatchAttributes, Dispatcher, MenuTree};

    fn tree_with(attr: DispatchAttributes) -> (Arc<HeadlessToolkit>, MenuTree) {
        let toolkit = Arc::new(HeadlessToolkit::new());
        let dispatcher = Dispatcher::spawn(attr).unwrap();
        let tree = MenuTree::new(toolkit.clone(), dispatcher).unwrap();
        (toolkit, tree)
    }

    fn tree() -> (Arc<HeadlessToolkit>, MenuTree) {
        tree_with(DispatchAttributes::default())
    }

    fn labels(node: &MenuNode) -> Vec<String> {
        node.entries().iter().map(|e| e.label()).collect()
    }

    fn icon() -> MenuIcon {
        MenuIcon::from_rgba(vec![0; 2 * 2 * 4], 2, 2).unwrap()
    }

    fn flush(tree: &MenuTree) {
        tree.dispatcher().post_and_wait(|| ()).unwrap();
    }

    #[test]
    fn entry_then_submenu_then_nested_entry() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let start = root.generation();

        root.add_entry("A", None, None).unwrap();
        let b = root.add_submenu("B", None).unwrap();
        assert!(!b.is_live());
        b.add_entry("C", None, None).unwrap();

        assert_eq!(labels(&root), ["A", "B"]);
        assert_eq!(labels(&b), ["C"]);
        assert_eq!(root.generation(), start + 3);
        assert_eq!(b.generation(), 1);

        let root_native = root.native_handle().unwrap();
        let b_native = b.native_handle().unwrap();
        let trigger = b.parent_entry().unwrap().native_handle().unwrap();
        assert_eq!(toolkit.labels(root_native), ["A", "B"]);
        assert_eq!(toolkit.labels(b_native), ["C"]);
        assert_eq!(toolkit.widget(trigger).unwrap().submenu, Some(b_native));
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn building_a_parent_restores_its_torn_down_submenu() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let b = root.add_submenu("B", None).unwrap();
        b.add_entry("C", None, None).unwrap();

        b.teardown().unwrap();
        assert!(!root.is_live());
        assert!(!b.is_live());

        root.build().unwrap();

        assert!(root.is_live());
        assert!(b.is_live());
        assert_eq!(b.generation(), 2);
        let b_native = b.native_handle().unwrap();
        let trigger = b.parent_entry().unwrap().native_handle().unwrap();
        assert_eq!(toolkit.widget(trigger).unwrap().submenu, Some(b_native));
        assert_eq!(toolkit.labels(b_native), ["C"]);
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn empty_submenu_stays_unbuilt_through_parent_rebuilds() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let b = root.add_submenu("B", None).unwrap();

        root.add_entry("A", None, None).unwrap();
        root.teardown().unwrap();
        root.build().unwrap();

        assert!(!b.is_live());
        assert_eq!(b.generation(), 0);
        let trigger = b.parent_entry().unwrap().native_handle().unwrap();
        assert_eq!(toolkit.widget(trigger).unwrap().submenu, None);
    }

    #[test]
    fn submenu_containers_attach_only_to_items_in_live_menus() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        root.add_entry("A", None, None).unwrap();
        let b = root.add_submenu("B", None).unwrap();
        b.add_entry("C", None, None).unwrap();
        let d = b.add_submenu("D", None).unwrap();
        d.add_entry("E", None, None).unwrap();
        root.add_entry("F", None, Some(Arc::new(|_: &MenuEntry| {}))).unwrap();
        root.remove("A").unwrap();
        d.teardown().unwrap();
        root.build().unwrap();
        d.add_entry("G", None, None).unwrap();
        b.get("C").unwrap().set_icon(Some(icon())).unwrap();

        let mut parent_of = HashMap::new();
        let mut shown = HashSet::new();
        let mut destroyed = HashSet::new();
        let mut attached = 0;
        for call in toolkit.call_log() {
            match call {
                NativeCall::Append { menu, child } => {
                    parent_of.insert(child, menu);
                }
                NativeCall::Remove { child, .. } => {
                    parent_of.remove(&child);
                }
                NativeCall::ShowAll(menu) => {
                    shown.insert(menu);
                }
                NativeCall::Destroy(widget) => {
                    destroyed.insert(widget);
                }
                NativeCall::SetSubmenu { item, menu: Some(menu) } => {
                    let parent = parent_of
                        .get(&item)
                        .unwrap_or_else(|| panic!("{menu:?} attached to loose item {item:?}"));
                    assert!(shown.contains(parent), "{parent:?} not yet shown");
                    assert!(!destroyed.contains(parent), "{parent:?} already destroyed");
                    attached += 1;
                }
                NativeCall::SetSubmenu { menu: None, .. } => {}
            }
        }
        assert!(attached >= 4, "only {attached} submenu attachments");
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn building_under_a_torn_down_parent_is_refused() {
        let (toolkit, tree) = tree();
        let b = tree.root().add_submenu("B", None).unwrap();
        b.add_entry("C", None, None).unwrap();
        b.teardown().unwrap();

        let node = b.clone();
        let result = tree
            .dispatcher()
            .post_and_wait(move || {
                let mut state = node.state.lock();
                node.build_locked(&mut state, false, None)
            })
            .unwrap();

        assert!(matches!(result, Err(MenuError::ParentNotLive { label }) if label == "B"));
        assert!(!b.is_live());
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn every_edit_leaves_the_menu_live_in_insertion_order() {
        let (toolkit, tree) = tree();
        let root = tree.root();

        root.add_entry("one", None, None).unwrap();
        assert!(root.is_live());
        root.add_entry("two", None, None).unwrap();
        root.add_entry("three", None, None).unwrap();
        assert!(root.remove("two").unwrap());
        assert!(root.is_live());
        root.add_entry("four", None, None).unwrap();

        assert_eq!(labels(&root), ["one", "three", "four"]);
        assert_eq!(
            toolkit.labels(root.native_handle().unwrap()),
            ["one", "three", "four"]
        );
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn rebuilding_replaces_the_container_but_keeps_entry_widgets() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let entry = root.add_entry("Open", None, None).unwrap();
        let old_container = root.native_handle().unwrap();
        let widget = entry.native_handle().unwrap();

        root.add_entry("Close", None, None).unwrap();

        let new_container = root.native_handle().unwrap();
        assert_ne!(old_container, new_container);
        assert!(toolkit.is_destroyed(old_container));
        assert_eq!(entry.native_handle(), Some(widget));
        let snapshot = toolkit.widget(widget).unwrap();
        assert_eq!(snapshot.parent, Some(new_container));
        assert!(!snapshot.floating);
    }

    #[test]
    fn existing_label_returns_the_same_entry() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        let first = root.add_entry("Open", None, None).unwrap();
        let generation = root.generation();

        let again = root.add_entry("Open", None, None).unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(root.len(), 1);
        assert_eq!(root.generation(), generation);
    }

    #[test]
    fn existing_submenu_label_returns_the_same_node() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        let first = root.add_submenu("More", None).unwrap();
        let again = root.add_submenu("More", None).unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn submenu_over_a_plain_item_is_rejected() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        root.add_entry("Plain", None, None).unwrap();

        let err = root.add_submenu("Plain", None).unwrap_err();
        assert!(matches!(err, MenuError::NotASubmenu { label } if label == "Plain"));
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn empty_text_is_rejected_before_any_native_call() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let calls = toolkit.call_count();

        assert!(matches!(
            root.add_entry("", None, None),
            Err(MenuError::InvalidArgument(_))
        ));
        assert!(matches!(
            root.add_submenu("", None),
            Err(MenuError::InvalidArgument(_))
        ));
        assert!(matches!(root.remove(""), Err(MenuError::InvalidArgument(_))));
        assert_eq!(toolkit.call_count(), calls);
    }

    #[test]
    fn teardown_is_idempotent_and_build_on_live_is_a_no_op() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let entry = root.add_entry("A", None, None).unwrap();

        root.teardown().unwrap();
        assert!(!root.is_live());
        root.teardown().unwrap();
        assert!(!root.is_live());
        let widget = toolkit.widget(entry.native_handle().unwrap()).unwrap();
        assert_eq!(widget.parent, None);
        assert!(widget.floating);

        root.build().unwrap();
        let generation = root.generation();
        let container = root.native_handle();
        root.build().unwrap();
        assert_eq!(root.generation(), generation);
        assert_eq!(root.native_handle(), container);
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn submenu_teardown_takes_the_ancestors_down_too() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        let sub = root.add_submenu("Sub", None).unwrap();
        sub.add_entry("Leaf", None, None).unwrap();

        sub.teardown().unwrap();
        assert!(!sub.is_live());
        assert!(!root.is_live());

        sub.build().unwrap();
        assert!(sub.is_live());
        assert!(root.is_live());
    }

    #[test]
    fn icon_column_is_consistent_after_every_build() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let plain = root.add_entry("Plain", None, None).unwrap();
        assert_eq!(
            toolkit.widget(plain.native_handle().unwrap()).unwrap().image,
            ImageState::None
        );

        let fancy = root.add_entry("Fancy", Some(icon()), None).unwrap();
        let sub = root.add_submenu("Sub", None).unwrap();
        let sub_trigger = sub.parent_entry().unwrap();

        let image = |entry: &Arc<MenuEntry>| toolkit.widget(entry.native_handle().unwrap()).unwrap().image;
        assert_eq!(image(&plain), ImageState::Spacer);
        assert_eq!(image(&fancy), ImageState::Icon { width: 2, height: 2 });
        assert_eq!(image(&sub_trigger), ImageState::Spacer);
    }

    #[test]
    fn separators_are_added_asynchronously_in_order() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        root.add_entry("Above", None, None).unwrap();
        root.add_separator().unwrap();
        root.add_entry("Below", None, None).unwrap();

        let entries = root.entries();
        let kinds: Vec<_> = entries.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, [EntryKind::Item, EntryKind::Separator, EntryKind::Item]);
        assert!(root.get("").is_none());
        assert_eq!(toolkit.children(root.native_handle().unwrap()).len(), 3);
    }

    #[test]
    fn separator_can_be_removed_by_handle() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        root.add_separator().unwrap();
        flush(&tree);

        let separator = root.entries().remove(0);
        assert!(root.remove_entry(&separator).unwrap());
        assert!(!root.remove_entry(&separator).unwrap());
        assert!(root.is_empty());
    }

    #[test]
    fn removing_a_submenu_obliterates_it() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let sub = root.add_submenu("Sub", None).unwrap();
        let leaf = sub.add_entry("Leaf", None, None).unwrap();
        let sub_container = sub.native_handle().unwrap();
        let leaf_widget = leaf.native_handle().unwrap();

        assert!(root.remove("Sub").unwrap());

        assert!(root.is_empty());
        assert!(sub.is_obliterated());
        assert!(toolkit.is_destroyed(sub_container));
        assert!(toolkit.is_destroyed(leaf_widget));
        assert!(matches!(
            sub.add_entry("Late", None, None),
            Err(MenuError::Obliterated)
        ));
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn removing_a_missing_label_changes_nothing() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        root.add_entry("Keep", None, None).unwrap();
        let generation = root.generation();

        assert!(!root.remove("Missing").unwrap());
        assert_eq!(root.generation(), generation);
    }

    #[test]
    fn obliterate_destroys_entries_permanently() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let a = root.add_entry("A", None, None).unwrap();
        let b = root.add_entry("B", None, None).unwrap();
        let widgets = [a.native_handle().unwrap(), b.native_handle().unwrap()];
        let container = root.native_handle().unwrap();

        root.obliterate().unwrap();

        assert!(root.is_empty());
        assert!(!root.is_live());
        assert!(widgets.iter().all(|w| toolkit.is_destroyed(*w)));
        assert!(toolkit.is_destroyed(container));
        assert!(matches!(root.build(), Err(MenuError::Obliterated)));
        assert!(matches!(
            root.add_entry("C", None, None),
            Err(MenuError::Obliterated)
        ));
        root.obliterate().unwrap();
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn concurrent_edits_from_many_threads() {
        let (toolkit, tree) = tree();
        let root = tree.root();
        let sub = root.add_submenu("Shared", None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let root = root.clone();
                let sub = sub.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        root.add_entry(&format!("root-{t}-{i}"), None, None).unwrap();
                        sub.add_entry(&format!("sub-{t}-{i}"), None, None).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(root.len(), 81);
        assert_eq!(sub.len(), 80);
        assert_eq!(toolkit.children(root.native_handle().unwrap()).len(), 81);
        assert_eq!(toolkit.children(sub.native_handle().unwrap()).len(), 80);
        assert!(toolkit.faults().is_empty(), "{:?}", toolkit.faults());
    }

    #[test]
    fn unresponsive_dispatch_thread_times_out() {
        let (_toolkit, tree) =
            tree_with(DispatchAttributes::default().with_timeout(Duration::from_millis(100)));
        let root = tree.root();
        tree.dispatcher()
            .post(|| thread::sleep(Duration::from_millis(400)))
            .unwrap();

        let result = root.add_entry("Late", None, None);
        assert!(matches!(result, Err(MenuError::DispatchTimeout { .. })));

        // The stale edit still completes once the thread catches up.
        thread::sleep(Duration::from_millis(800));
        assert!(root.get("Late").is_some());
    }

    #[test]
    fn populate_applies_templates_in_order() {
        let (_toolkit, tree) = tree();
        let root = tree.root();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        root.populate(&[
            MenuTemplate::Item(ItemTemplate::new("Open").action(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            MenuTemplate::Separator,
            MenuTemplate::Submenu(SubmenuTemplate::new(
                "More",
                vec![
                    MenuTemplate::Item(ItemTemplate::new("Nested")),
                    MenuTemplate::Item(ItemTemplate::new("Greyed").enabled(false)),
                ],
            )),
        ])
        .unwrap();

        assert_eq!(labels(&root), ["Open", "", "More"]);
        let more = root.get("More").unwrap().submenu().unwrap();
        assert_eq!(labels(&more), ["Nested", "Greyed"]);
        assert!(!more.get("Greyed").unwrap().is_enabled());

        assert!(root.get("Open").unwrap().activate());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
