//! Downward interface to the native menu toolkit.
//!
//! Every function here, and every [`NativeToolkit`] method, must only be called on the
//! dispatch thread. New widgets start out *floating*: the first container they are appended to
//! claims that reference, and the toolkit frees a floating widget as soon as nothing holds it.

use std::fmt;

use tracing::trace;

use crate::icon::MenuIcon;

/// Opaque reference to a native widget.
///
/// This is the raw widget pointer address. It is only ever dereferenced by the toolkit on the
/// dispatch thread, which is what lets it travel between threads inside menu state.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// Convert the `NativeHandle` into the underlying integer.
    pub const fn into_raw(self) -> usize {
        self.0
    }

    /// Construct a `NativeHandle` from a widget pointer address.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmtr, "{:#x}", self.0)
    }
}

/// What an item shows in its icon column.
#[derive(Debug, Clone, Copy)]
pub enum ItemImage<'a> {
    /// No icon column at all.
    None,
    /// Blank space the size of an icon, keeping the label aligned with siblings that have one.
    Spacer,
    Icon(&'a MenuIcon),
}

/// Native menu toolkit binding.
///
/// Implementations are free to assume every call arrives on the same thread.
pub trait NativeToolkit: Send + Sync + 'static {
    /// Create an empty menu container.
    fn menu_new(&self) -> NativeHandle;

    fn menu_item_new(&self) -> NativeHandle;

    fn separator_new(&self) -> NativeHandle;

    fn set_label(&self, item: NativeHandle, label: &str);

    fn set_image(&self, item: NativeHandle, image: ItemImage<'_>);

    /// Attach `menu` as the submenu opened by `item`, or detach it with `None`.
    fn set_submenu(&self, item: NativeHandle, menu: Option<NativeHandle>);

    /// Append `child` to `menu`, sinking its floating reference into the container.
    fn menu_shell_append(&self, menu: NativeHandle, child: NativeHandle);

    /// Remove `child` from `container`, dropping the container's reference.
    fn container_remove(&self, container: NativeHandle, child: NativeHandle);

    /// Claim a floating reference, or add a reference when not floating.
    fn ref_sink(&self, widget: NativeHandle);

    /// Mark the widget's reference floating again.
    fn force_floating(&self, widget: NativeHandle);

    fn set_sensitive(&self, widget: NativeHandle, sensitive: bool);

    fn set_visible(&self, widget: NativeHandle, visible: bool);

    /// Show the widget and all of its descendants.
    fn show_all(&self, widget: NativeHandle);

    /// Destroy the widget and everything it contains.
    fn destroy(&self, widget: NativeHandle);
}

/// Append `child` to `container` and take our own reference to it.
///
/// Without the sink the container would hold the only reference, and the widget would be
/// finalized the moment it is removed to rebuild the menu.
pub fn attach_child(toolkit: &dyn NativeToolkit, container: NativeHandle, child: NativeHandle) {
    trace!(?container, ?child, "attaching child widget");
    toolkit.menu_shell_append(container, child);
    toolkit.ref_sink(child);
}

/// Take `child` out of `container` without destroying it.
///
/// The reference is forced floating first, so the widget survives the removal and can be appended
/// to a new container or destroyed later.
pub fn detach_child(toolkit: &dyn NativeToolkit, container: NativeHandle, child: NativeHandle) {
    trace!(?container, ?child, "detaching child widget");
    toolkit.force_floating(child);
    toolkit.container_remove(container, child);
}
