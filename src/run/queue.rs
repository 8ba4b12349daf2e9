//! Per-run event queue
//!
//! One queue is created for every started run and tagged with that run's id.
//! The worker is the single producer; any number of stream consumers may drain
//! it concurrently, each item going to exactly one of them. A queue abandoned by
//! the controller when a newer run starts still receives its sentinel, so a
//! consumer attached to it always terminates.

use log::trace;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

use crate::iperf::Event;

/// An entry of the queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Event(Event),
    /// End of run; exactly one per queue, always last
    Sentinel,
}

/// Outcome of waiting on the queue
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Item(QueueItem),
    /// Nothing arrived within the wait
    Idle,
    /// The sentinel was already taken by another consumer
    Closed,
}

#[derive(Debug)]
pub struct EventQueue {
    run_id: u64,
    /// Dropped together with pushing the sentinel
    sender: Mutex<Option<UnboundedSender<QueueItem>>>,
    receiver: AsyncMutex<UnboundedReceiver<QueueItem>>,
}

impl EventQueue {
    pub fn new(run_id: u64) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            run_id,
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Appends an event; returns `false` once the queue has been finished
    pub fn push(&self, event: Event) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(QueueItem::Event(event)).is_ok(),
            None => {
                trace!("Dropping event pushed to finished queue of run {}", self.run_id);
                false
            }
        }
    }

    /// Appends the sentinel and closes the queue for producers
    ///
    /// Only the first call has an effect; it returns `true`.
    pub fn finish(&self) -> bool {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.take() {
            Some(sender) => {
                let _ = sender.send(QueueItem::Sentinel);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Waits up to `wait` for the next item
    pub async fn next(&self, wait: Duration) -> Received {
        let received = timeout(wait, async { self.receiver.lock().await.recv().await }).await;
        match received {
            Ok(Some(item)) => Received::Item(item),
            Ok(None) => Received::Closed,
            Err(_) => Received::Idle,
        }
    }

    /// Takes every item currently buffered without waiting
    pub async fn drain(&self) -> Vec<QueueItem> {
        let mut receiver = self.receiver.lock().await;
        let mut items = Vec::new();
        while let Ok(item) = receiver.try_recv() {
            items.push(item);
        }
        items
    }
}
