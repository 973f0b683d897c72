//! In-memory [`NativeToolkit`] for tests and headless hosts.
//!
//! Widgets follow the floating-reference rules of GObject-based toolkits closely enough that a
//! forgotten sink, a double destroy, or a call from the wrong thread shows up as a recorded fault
//! instead of a crash.

use std::collections::{HashMap, HashSet};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::error;

use crate::native::{ItemImage, NativeHandle, NativeToolkit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Menu,
    Item,
    Separator,
}

/// Icon column state as last rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    None,
    Spacer,
    Icon { width: u32, height: u32 },
}

/// Structural calls, in the order the toolkit received them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    Append { menu: NativeHandle, child: NativeHandle },
    Remove { container: NativeHandle, child: NativeHandle },
    SetSubmenu { item: NativeHandle, menu: Option<NativeHandle> },
    ShowAll(NativeHandle),
    Destroy(NativeHandle),
}

/// Snapshot of one widget.
#[derive(Debug, Clone)]
pub struct HeadlessWidget {
    pub kind: WidgetKind,
    pub label: String,
    pub image: ImageState,
    pub sensitive: bool,
    pub visible: bool,
    pub floating: bool,
    pub ref_count: u32,
    pub parent: Option<NativeHandle>,
    pub children: Vec<NativeHandle>,
    /// Menu opened by this item.
    pub submenu: Option<NativeHandle>,
    /// Item this menu is the submenu of.
    pub attached_to: Option<NativeHandle>,
    pub destroyed: bool,
}

impl HeadlessWidget {
    fn new(kind: WidgetKind) -> Self {
        HeadlessWidget {
            kind,
            label: String::new(),
            image: ImageState::None,
            sensitive: true,
            visible: false,
            floating: true,
            ref_count: 1,
            parent: None,
            children: Vec::new(),
            submenu: None,
            attached_to: None,
            destroyed: false,
        }
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    widgets: HashMap<NativeHandle, HeadlessWidget>,
    finalized: HashSet<NativeHandle>,
    next: usize,
    calls: usize,
    log: Vec<NativeCall>,
    thread: Option<ThreadId>,
    faults: Vec<String>,
}

impl HeadlessState {
    fn enter(&mut self, call: &str) {
        self.calls += 1;
        let current = thread::current().id();
        match self.thread {
            None => self.thread = Some(current),
            Some(owner) if owner != current => {
                self.fault(format!("`{call}` called off the toolkit thread"));
            }
            Some(_) => {}
        }
    }

    fn fault(&mut self, message: String) {
        error!(%message, "headless toolkit fault");
        self.faults.push(message);
    }

    fn create(&mut self, kind: WidgetKind) -> NativeHandle {
        // Word-aligned fake addresses keep handles looking like pointers in logs.
        self.next += 1;
        let handle = NativeHandle::from_raw(self.next * 0x10);
        self.widgets.insert(handle, HeadlessWidget::new(kind));
        handle
    }

    fn live(&mut self, handle: NativeHandle, call: &str) -> Option<&mut HeadlessWidget> {
        let state = match self.widgets.get(&handle) {
            Some(widget) if !widget.destroyed => None,
            Some(_) => Some("destroyed"),
            None if self.finalized.contains(&handle) => Some("finalized"),
            None => Some("unknown"),
        };
        if let Some(state) = state {
            self.fault(format!("`{call}` on {state} widget {handle:?}"));
            return None;
        }
        self.widgets.get_mut(&handle)
    }

    fn sink(&mut self, handle: NativeHandle, call: &str) {
        if let Some(widget) = self.live(handle, call) {
            if widget.floating {
                widget.floating = false;
            } else {
                widget.ref_count += 1;
            }
        }
    }

    fn unref(&mut self, handle: NativeHandle) {
        let Some(widget) = self.widgets.get_mut(&handle) else {
            return;
        };
        widget.ref_count = widget.ref_count.saturating_sub(1);
        if widget.ref_count == 0 && !widget.destroyed {
            self.widgets.remove(&handle);
            self.finalized.insert(handle);
        }
    }

    fn destroy(&mut self, handle: NativeHandle) {
        let Some(widget) = self.live(handle, "destroy") else {
            return;
        };
        widget.destroyed = true;
        widget.visible = false;
        let children = std::mem::take(&mut widget.children);
        let submenu = widget.submenu.take();
        let parent = widget.parent.take();
        let attached_to = widget.attached_to.take();

        for child in children {
            if let Some(widget) = self.widgets.get_mut(&child) {
                widget.parent = None;
            }
            if !self.is_destroyed(child) {
                self.destroy(child);
            }
        }
        if let Some(submenu) = submenu {
            if let Some(widget) = self.widgets.get_mut(&submenu) {
                widget.attached_to = None;
            }
            if !self.is_destroyed(submenu) {
                self.destroy(submenu);
            }
        }
        if let Some(parent) = parent {
            if let Some(widget) = self.widgets.get_mut(&parent) {
                widget.children.retain(|c| *c != handle);
            }
        }
        if let Some(item) = attached_to {
            if let Some(widget) = self.widgets.get_mut(&item) {
                widget.submenu = None;
            }
        }
    }

    fn is_destroyed(&self, handle: NativeHandle) -> bool {
        self.finalized.contains(&handle) || self.widgets.get(&handle).is_some_and(|w| w.destroyed)
    }

    fn show_all(&mut self, handle: NativeHandle) {
        let Some(widget) = self.widgets.get_mut(&handle) else {
            return;
        };
        widget.visible = true;
        for child in widget.children.clone() {
            self.show_all(child);
        }
    }
}

/// A toolkit that keeps its widget tree in memory.
#[derive(Debug, Default)]
pub struct HeadlessToolkit {
    state: Mutex<HeadlessState>,
}

impl HeadlessToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`NativeToolkit`] calls made so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    pub fn call_log(&self) -> Vec<NativeCall> {
        self.state.lock().log.clone()
    }

    /// Misuse recorded so far; empty when every call was valid.
    pub fn faults(&self) -> Vec<String> {
        self.state.lock().faults.clone()
    }

    /// Snapshot of a widget, or `None` once its last reference was dropped.
    pub fn widget(&self, handle: NativeHandle) -> Option<HeadlessWidget> {
        self.state.lock().widgets.get(&handle).cloned()
    }

    pub fn children(&self, handle: NativeHandle) -> Vec<NativeHandle> {
        self.widget(handle).map(|w| w.children).unwrap_or_default()
    }

    /// Whether the widget was destroyed or finalized.
    pub fn is_destroyed(&self, handle: NativeHandle) -> bool {
        self.state.lock().is_destroyed(handle)
    }

    /// Labels of a menu's children, in order.
    pub fn labels(&self, menu: NativeHandle) -> Vec<String> {
        let state = self.state.lock();
        state
            .widgets
            .get(&menu)
            .map(|m| {
                m.children
                    .iter()
                    .filter_map(|c| state.widgets.get(c))
                    .map(|w| w.label.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl NativeToolkit for HeadlessToolkit {
    fn menu_new(&self) -> NativeHandle {
        let mut state = self.state.lock();
        state.enter("menu_new");
        state.create(WidgetKind::Menu)
    }

    fn menu_item_new(&self) -> NativeHandle {
        let mut state = self.state.lock();
        state.enter("menu_item_new");
        state.create(WidgetKind::Item)
    }

    fn separator_new(&self) -> NativeHandle {
        let mut state = self.state.lock();
        state.enter("separator_new");
        state.create(WidgetKind::Separator)
    }

    fn set_label(&self, item: NativeHandle, label: &str) {
        let mut state = self.state.lock();
        state.enter("set_label");
        if let Some(widget) = state.live(item, "set_label") {
            widget.label = label.to_string();
        }
    }

    fn set_image(&self, item: NativeHandle, image: ItemImage<'_>) {
        let mut state = self.state.lock();
        state.enter("set_image");
        if let Some(widget) = state.live(item, "set_image") {
            widget.image = match image {
                ItemImage::None => ImageState::None,
                ItemImage::Spacer => ImageState::Spacer,
                ItemImage::Icon(icon) => ImageState::Icon {
                    width: icon.width(),
                    height: icon.height(),
                },
            };
        }
    }

    fn set_submenu(&self, item: NativeHandle, menu: Option<NativeHandle>) {
        let mut state = self.state.lock();
        state.enter("set_submenu");
        state.log.push(NativeCall::SetSubmenu { item, menu });
        let Some(widget) = state.live(item, "set_submenu") else {
            return;
        };
        let previous = widget.submenu.take();
        widget.submenu = menu;

        if let Some(previous) = previous.filter(|p| Some(*p) != menu) {
            if let Some(old) = state.widgets.get_mut(&previous) {
                old.attached_to = None;
            }
            state.unref(previous);
        }
        if let Some(menu) = menu.filter(|m| Some(*m) != previous) {
            state.sink(menu, "set_submenu");
            if let Some(widget) = state.widgets.get_mut(&menu) {
                widget.attached_to = Some(item);
            }
        }
    }

    fn menu_shell_append(&self, menu: NativeHandle, child: NativeHandle) {
        let mut state = self.state.lock();
        state.enter("menu_shell_append");
        state.log.push(NativeCall::Append { menu, child });
        if state.live(menu, "menu_shell_append").is_none() {
            return;
        }
        let Some(widget) = state.live(child, "menu_shell_append") else {
            return;
        };
        if let Some(parent) = widget.parent {
            state.fault(format!("{child:?} appended while still inside {parent:?}"));
            return;
        }
        widget.parent = Some(menu);
        state.sink(child, "menu_shell_append");
        if let Some(container) = state.widgets.get_mut(&menu) {
            container.children.push(child);
        }
    }

    fn container_remove(&self, container: NativeHandle, child: NativeHandle) {
        let mut state = self.state.lock();
        state.enter("container_remove");
        state.log.push(NativeCall::Remove { container, child });
        let Some(widget) = state.live(child, "container_remove") else {
            return;
        };
        if widget.parent != Some(container) {
            state.fault(format!("{child:?} is not a child of {container:?}"));
            return;
        }
        widget.parent = None;
        if let Some(parent) = state.widgets.get_mut(&container) {
            parent.children.retain(|c| *c != child);
        }
        state.unref(child);
    }

    fn ref_sink(&self, widget: NativeHandle) {
        let mut state = self.state.lock();
        state.enter("ref_sink");
        state.sink(widget, "ref_sink");
    }

    fn force_floating(&self, widget: NativeHandle) {
        let mut state = self.state.lock();
        state.enter("force_floating");
        if let Some(widget) = state.live(widget, "force_floating") {
            widget.floating = true;
        }
    }

    fn set_sensitive(&self, widget: NativeHandle, sensitive: bool) {
        let mut state = self.state.lock();
        state.enter("set_sensitive");
        if let Some(widget) = state.live(widget, "set_sensitive") {
            widget.sensitive = sensitive;
        }
    }

    fn set_visible(&self, widget: NativeHandle, visible: bool) {
        let mut state = self.state.lock();
        state.enter("set_visible");
        if let Some(widget) = state.live(widget, "set_visible") {
            widget.visible = visible;
        }
    }

    fn show_all(&self, widget: NativeHandle) {
        let mut state = self.state.lock();
        state.enter("show_all");
        state.log.push(NativeCall::ShowAll(widget));
        if state.live(widget, "show_all").is_some() {
            state.show_all(widget);
        }
    }

    fn destroy(&self, widget: NativeHandle) {
        let mut state = self.state.lock();
        state.enter("destroy");
        state.log.push(NativeCall::Destroy(widget));
        state.destroy(widget);
    }
}
