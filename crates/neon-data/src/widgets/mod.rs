//! Widget controllers wired to the event bus

use std::future::Future;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

mod data_view;
mod filter_builder;

pub use data_view::{DataView, ViewState};
pub use filter_builder::FilterBuilder;

/// Registry cleanup started from a bus handler
///
/// Handlers run synchronously and cannot await, so the cleanup is spawned and
/// every later mutation of the widget waits for it first.
pub(crate) struct PendingWork {
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PendingWork {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            task: Mutex::new(None),
        }
    }

    /// Queue `work` behind whatever is still outstanding
    pub(crate) fn start<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.task.lock();
        let previous = task.take();
        *task = Some(self.runtime.spawn(async move {
            if let Some(previous) = previous {
                if let Err(err) = previous.await {
                    warn!("Earlier widget cleanup failed: {}", err);
                }
            }
            work.await;
        }));
    }

    /// Wait until all queued work has landed
    pub(crate) async fn settle(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!("Widget cleanup failed: {}", err);
            }
        }
    }
}
