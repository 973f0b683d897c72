//! Routes work onto the toolkit's single affinity thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::error::MenuError;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// How long [`Dispatcher::shutdown`] waits for the thread to drain its queue.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DispatchAttributes {
    /// Upper bound on every [`Dispatcher::post_and_wait`].
    pub timeout: Duration,
    pub thread_name: String,
}

impl Default for DispatchAttributes {
    fn default() -> Self {
        DispatchAttributes {
            timeout: Duration::from_secs(2),
            thread_name: "tray-menu-dispatch".to_string(),
        }
    }
}

impl DispatchAttributes {
    /// Set the synchronous dispatch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

struct Inner {
    sender: Mutex<Option<Sender<Task>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    timeout: Duration,
}

/// Handle to the dispatch thread. Clones share the same thread.
///
/// Tasks run one at a time, in submission order, and never re-enter each other.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread_id", &self.inner.thread_id)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn spawn(attr: DispatchAttributes) -> Result<Self, MenuError> {
        let (sender, receiver) = mpsc::channel::<Task>();

        let thread_handle = thread::Builder::new()
            .name(attr.thread_name.clone())
            .spawn(move || {
                trace!("dispatch thread started");
                while let Ok(task) = receiver.recv() {
                    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "<non-string panic>".to_string());
                        error!(%message, "dispatched task panicked");
                    }
                }
                debug!("dispatch queue closed, thread exiting");
            })
            .map_err(MenuError::Spawn)?;

        debug!(name = %attr.thread_name, timeout = ?attr.timeout, "spawned dispatch thread");

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                thread_id: thread_handle.thread().id(),
                thread_handle: Mutex::new(Some(thread_handle)),
                timeout: attr.timeout,
            }),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Queue `task` and return immediately.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), MenuError> {
        let sender = self.inner.sender.lock();
        let sender = sender.as_ref().ok_or(MenuError::DispatcherStopped)?;
        sender
            .send(Box::new(task))
            .map_err(|_| MenuError::DispatcherStopped)
    }

    /// Run `task` on the dispatch thread and block until it finishes or the timeout elapses.
    ///
    /// A timed out task still runs to completion later; its result is discarded. Called from the
    /// dispatch thread itself, the task runs inline.
    pub fn post_and_wait<R, F>(&self, task: F) -> Result<R, MenuError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_dispatch_thread() {
            return Ok(task());
        }

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.post(move || {
            let _ = done_tx.send(task());
        })?;

        match done_rx.recv_timeout(self.inner.timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.inner.timeout, "dispatched task did not complete in time");
                Err(MenuError::DispatchTimeout {
                    timeout: self.inner.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("error waiting for dispatch to complete");
                Err(MenuError::DispatchInterrupted)
            }
        }
    }

    /// Close the queue and wait briefly for already queued tasks to finish.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Inner {
    fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        debug!("shutting down dispatch thread");

        let Some(handle) = self.thread_handle.lock().take() else {
            return;
        };
        // The thread cannot join itself; it exits once the current task returns.
        if thread::current().id() == self.thread_id {
            return;
        }

        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < SHUTDOWN_GRACE {
            thread::sleep(Duration::from_millis(10));
        }

        if handle.is_finished() {
            let _ = handle.join();
            debug!("dispatch thread cleaned up successfully");
        } else {
            warn!("dispatch thread did not exit cleanly within timeout");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
