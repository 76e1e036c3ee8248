//! Blocking iterator over topology events
//!
//! Iteration patterns for consuming events from an `EventBus` subscription:
//! - Blocking: `recv()`, `for event in iter`
//! - Non-blocking: `try_recv()`, `try_iter()`
//! - Timeout: `recv_timeout()`, `timeout_iter()`

use std::sync::mpsc;
use std::time::Duration;

use crate::event::TopologyEvent;

/// Blocking iterator over topology events
///
/// Each subscriber owns its receiver; all methods are synchronous.
///
/// # Example
///
/// ```rust,ignore
/// // Blocking iteration
/// for event in bus.subscribe() {
///     println!("{}", event.name());
/// }
///
/// // Non-blocking batch drain
/// for event in events.try_iter() {
///     println!("{}", event.name());
/// }
///
/// // With timeout
/// if let Some(event) = events.recv_timeout(Duration::from_secs(1)) {
///     println!("got {}", event.name());
/// }
/// ```
pub struct EventIterator {
    rx: mpsc::Receiver<TopologyEvent>,
}

impl EventIterator {
    pub(crate) fn new(rx: mpsc::Receiver<TopologyEvent>) -> Self {
        Self { rx }
    }

    /// Block until the next event is available
    ///
    /// Returns `None` if the bus has been dropped.
    pub fn recv(&self) -> Option<TopologyEvent> {
        self.rx.recv().ok()
    }

    /// Block until the next event or the timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TopologyEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Receive an event without blocking
    pub fn try_recv(&self) -> Option<TopologyEvent> {
        self.rx.try_recv().ok()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }

    /// Blocking iterator that gives up after `timeout` without events
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for EventIterator {
    type Item = TopologyEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over currently queued events
pub struct TryIter<'a> {
    inner: &'a EventIterator,
}

impl Iterator for TryIter<'_> {
    type Item = TopologyEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with a per-event timeout
pub struct TimeoutIter<'a> {
    inner: &'a EventIterator,
    timeout: Duration,
}

impl Iterator for TimeoutIter<'_> {
    type Item = TopologyEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}
