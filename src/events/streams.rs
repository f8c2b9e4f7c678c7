use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Broadcast stream that also keeps the most recent events for late subscribers
pub struct EventStream<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
    buffer: Mutex<VecDeque<T>>,
    buffer_size: usize,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        debug!(capacity, buffer_size, "Creating event stream");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Mutex::new(VecDeque::with_capacity(buffer_size)),
            buffer_size,
        }
    }

    pub fn subscribe(&self) -> Subscriber<T> {
        trace!("New subscriber registered to event stream");
        Subscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event to all current subscribers and the replay buffer.
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: T) -> usize {
        {
            let mut buffer = lock(&self.buffer);
            buffer.push_back(event.clone());
            while buffer.len() > self.buffer_size {
                buffer.pop_front();
            }
        }

        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(receivers, "Event published");
        receivers
    }

    /// Events held for replay, oldest first
    pub fn recent(&self) -> Vec<T> {
        lock(&self.buffer).iter().cloned().collect()
    }

    /// Drop everything held for replay
    pub fn clear_buffer(&self) {
        lock(&self.buffer).clear();
    }
}

/// Subscriber for receiving events from a stream
pub struct Subscriber<T: Clone + Send + 'static> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Result<T, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
