//! Serialized execution contexts.
//!
//! # Responsibility
//! - Give every session one queue it is permanently bound to: a dedicated
//!   thread draining jobs in FIFO order.
//!
//! # Invariants
//! - Jobs submitted from one thread run in submission order.
//! - The queue thread exits when the context is dropped; jobs submitted
//!   after that are discarded with a warning.

use crossbeam_channel::{unbounded, Sender};
use log::warn;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Whether a context carries interactive (UI-adjacent) or background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Interactive,
    Background,
}

impl ContextKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Background => "background",
        }
    }
}

/// One serialized work queue backed by a dedicated thread.
pub struct ExecutionContext {
    label: String,
    kind: ContextKind,
    queue: Sender<Job>,
}

impl ExecutionContext {
    pub fn new(kind: ContextKind, label: impl Into<String>) -> Self {
        let label = label.into();
        let (queue, jobs) = unbounded::<Job>();
        thread::spawn(move || {
            while let Ok(job) = jobs.recv() {
                job();
            }
        });
        Self { label, kind, queue }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Schedules a job onto this context. Jobs never run on the calling
    /// thread.
    pub fn run(&self, job: impl FnOnce() + Send + 'static) {
        if self.queue.send(Box::new(job)).is_err() {
            warn!(
                "event=context_dropped_job module=session context={} kind={}",
                self.label,
                self.kind.as_str()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextKind, ExecutionContext};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn jobs_run_in_submission_order() {
        let context = ExecutionContext::new(ContextKind::Background, "test-order");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        for n in 0..32 {
            let seen = Arc::clone(&seen);
            context.run(move || seen.lock().unwrap().push(n));
        }
        context.run(move || {
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("queue drains");
        let order = seen.lock().unwrap().clone();
        assert_eq!(order, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn jobs_never_run_on_the_calling_thread() {
        let context = ExecutionContext::new(ContextKind::Interactive, "test-thread");
        let caller = std::thread::current().id();
        let (tx, rx) = crossbeam_channel::bounded(1);

        context.run(move || {
            let _ = tx.send(std::thread::current().id());
        });

        let worker = rx.recv_timeout(Duration::from_secs(5)).expect("job ran");
        assert_ne!(caller, worker);
    }
}
