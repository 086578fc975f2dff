use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use wifi_core::error::{PhyError, PhyResult};

struct QueueState<T> {
    items: VecDeque<T>,
    is_closed: bool,
}

/// A light wrapper around a mutex and condition variable used to hand messages between threads.
/// Closing the queue lets consumers drain what is left before they see `Closed`.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use wifi_phy::message_queue::MessageQueue;
///
/// let queue = Arc::new(MessageQueue::new());
/// let consumer = std::thread::spawn({
///     let queue = queue.clone();
///     move || {
///         let mut total = 0;
///         while let Ok(x) = queue.pop_blocking() {
///             total += x;
///         }
///         total
///     }
/// });
/// for i in 1..=4 {
///     queue.push(i).unwrap();
/// }
/// queue.close();
/// assert_eq!(consumer.join().unwrap(), 10);
/// ```
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    on_change: Condvar,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                is_closed: false,
            }),
            on_change: Condvar::new(),
        }
    }

    // NOTE: A panicking producer cannot leave the deque half updated so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message and wakes a waiting consumer.
    pub fn push(&self, item: T) -> PhyResult<()> {
        let mut state = self.lock();
        if state.is_closed {
            return Err(PhyError::Closed);
        }
        state.items.push_back(item);
        self.on_change.notify_one();
        Ok(())
    }

    /// Blocks until a message is available.
    /// Returns `Closed` once the queue has been closed and drained.
    pub fn pop_blocking(&self) -> PhyResult<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.is_closed {
                return Err(PhyError::Closed);
            }
            state = self.on_change.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Marks the end of the stream. Consumers waiting on an empty queue are woken up.
    pub fn close(&self) {
        let mut state = self.lock();
        state.is_closed = true;
        self.on_change.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
