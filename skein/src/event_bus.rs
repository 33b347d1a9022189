//! Multi-consumer event stream with a bounded try-send-with-eviction buffer,
//! supporting two delivery policies: block the producer for critical events,
//! drop the oldest buffered chatty event on overflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;

use crate::event::Event;

const DEFAULT_CAPACITY: usize = 256;

struct ChattyBuffer {
    queue: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl ChattyBuffer {
    fn push(&self, event: Event) {
        let mut q = self.queue.lock().unwrap();
        if q.len() >= self.capacity {
            // Drop the oldest buffered chatty event to make room for the new one.
            q.pop_front();
        }
        q.push_back(event);
        drop(q);
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

fn chatty_stream(inner: Arc<ChattyBuffer>) -> impl Stream<Item = Event> {
    stream::unfold(inner, |inner| async move {
        loop {
            if let Some(ev) = inner.queue.lock().unwrap().pop_front() {
                return Some((ev, inner));
            }
            if inner.closed.load(Ordering::Acquire) {
                return None;
            }
            inner.notify.notified().await;
        }
    })
}

struct Subscriber {
    critical_tx: mpsc::Sender<Event>,
    chatty: Arc<ChattyBuffer>,
}

/// Fans out `Event`s published by a `Runner` to any number of registered consumers.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Registers a new consumer and returns its event stream.
    pub fn subscribe(&self) -> impl Stream<Item = Event> + Send + Unpin + 'static {
        let (tx, rx) = mpsc::channel(self.capacity);
        let chatty = Arc::new(ChattyBuffer {
            queue: Mutex::new(VecDeque::new()),
            capacity: self.capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        self.subscribers.lock().unwrap().push(Subscriber {
            critical_tx: tx,
            chatty: chatty.clone(),
        });
        Box::pin(ReceiverStream::new(rx).merge(chatty_stream(chatty)))
    }

    /// Publishes one event to every registered consumer, applying the
    /// critical-blocks / chatty-drops-oldest backpressure policy per kind.
    pub async fn publish(&self, event: Event) {
        let subs: Vec<(mpsc::Sender<Event>, Arc<ChattyBuffer>)> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|s| (s.critical_tx.clone(), s.chatty.clone()))
            .collect();

        if event.is_critical() {
            for (tx, _) in &subs {
                // Best-effort: a consumer that dropped its receiver is simply skipped.
                let _ = tx.send(event.clone()).await;
            }
        } else {
            for (_, chatty) in &subs {
                chatty.push(event.clone());
            }
        }
    }

    /// Closes every subscriber's chatty buffer so their streams terminate
    /// once drained, matching the critical channel's close-on-drop behavior.
    pub fn close(&self) {
        for sub in self.subscribers.lock().unwrap().iter() {
            sub.chatty.close();
        }
    }
}
