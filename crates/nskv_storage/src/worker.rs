//! Dedicated worker threads fed through a message queue.

use crate::error::StorageResult;
use std::sync::mpsc::{self, SendError, Sender};
use std::thread::{self, JoinHandle, ThreadId};

/// A named thread draining a FIFO queue of messages.
///
/// The thread is spawned on construction and joined on drop. Messages
/// already queued when the worker is dropped are still processed. The
/// loop ends once every sender (including clones handed out through
/// [`Worker::sender`]) is gone.
pub(crate) struct Worker<M: Send + 'static> {
    sender: Option<Sender<M>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    name: String,
}

impl<M: Send + 'static> Worker<M> {
    /// Spawns a worker that passes every received message to `handle`.
    pub(crate) fn spawn<F>(name: &str, mut handle: F) -> StorageResult<Self>
    where
        F: FnMut(M) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<M>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for message in receiver {
                    handle(message);
                }
            })?;
        tracing::debug!(worker = name, "worker thread started");

        Ok(Self {
            sender: Some(sender),
            thread_id: thread.thread().id(),
            thread: Some(thread),
            name: name.to_string(),
        })
    }

    /// Queues a message. Returns it back if the worker has stopped.
    pub(crate) fn send(&self, message: M) -> Result<(), M> {
        match &self.sender {
            Some(sender) => sender.send(message).map_err(|SendError(m)| m),
            None => Err(message),
        }
    }

    /// Returns a sender for queueing from other threads, e.g. from a
    /// completion handler that chains a follow-up message.
    pub(crate) fn sender(&self) -> Option<Sender<M>> {
        self.sender.clone()
    }
}

impl<M: Send + 'static> Drop for Worker<M> {
    fn drop(&mut self) {
        self.sender.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Dropped from inside one of its own handlers: joining would deadlock.
        if thread::current().id() == self.thread_id {
            return;
        }
        if thread.join().is_err() {
            tracing::error!(worker = %self.name, "worker thread panicked");
        } else {
            tracing::debug!(worker = %self.name, "worker thread stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn processes_messages_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let worker = Worker::spawn("test-worker", move |n: u32| {
            sink.lock().unwrap().push(n);
        })
        .unwrap();

        for n in 0..10 {
            worker.send(n).unwrap();
        }
        drop(worker);

        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn runs_on_named_thread() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn("named-worker", move |_: ()| {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        })
        .unwrap();

        worker.send(()).unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("named-worker"));
    }

    #[test]
    fn chained_sender_delivers_before_shutdown() {
        let (tx, rx) = mpsc::channel();
        let worker = Worker::spawn("chain-worker", move |n: u32| {
            tx.send(n).unwrap();
        })
        .unwrap();

        let chained = worker.sender().unwrap();
        chained.send(7).unwrap();
        drop(chained);
        drop(worker);

        assert_eq!(rx.recv().unwrap(), 7);
    }
}
