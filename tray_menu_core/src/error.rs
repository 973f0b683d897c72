use std::time::Duration;

/// Errors surfaced by menu edits and the dispatch gateway.
#[derive(Debug, thiserror::Error)]
pub enum MenuError {
    /// Rejected before anything was dispatched.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The affinity thread did not finish the task in time. The task itself is not cancelled.
    #[error(
        "event dispatch queue took longer than {timeout:?} to complete; \
         adjust the dispatch timeout to a value which better suits this environment"
    )]
    DispatchTimeout { timeout: Duration },

    /// The task was dropped or panicked before reporting back.
    #[error("dispatched task did not report completion")]
    DispatchInterrupted,

    #[error("dispatch thread is not running")]
    DispatcherStopped,

    #[error("failed to spawn dispatch thread")]
    Spawn(#[source] std::io::Error),

    /// The node was obliterated and can no longer be built or edited.
    #[error("menu has been obliterated")]
    Obliterated,

    #[error("entry `{label}` exists and is not a submenu")]
    NotASubmenu { label: String },

    /// A submenu was built while its trigger entry had no native widget.
    #[error("submenu `{label}` has no live parent entry to attach to")]
    ParentNotLive { label: String },
}
