/*! Ports connecting components.

Components are connected with typed FIFO ports. A value pushed into an
[`OutputPort`] appears, with its timestamp, at the paired [`InputPort`].
Ownership of the value crosses the port: these carry owned buffers and
packet batches, not copyable samples.
*/
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Timestamp carried alongside every value.
///
/// Packet-derived timestamps inherit the packet's integer/fractional
/// words; live captures use [`Timestamp::now`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    /// Whole seconds.
    pub seconds: u32,

    /// Picoseconds within the second.
    pub picoseconds: u64,
}

impl Timestamp {
    /// Create a timestamp.
    #[must_use]
    pub fn new(seconds: u32, picoseconds: u64) -> Self {
        Self {
            seconds,
            picoseconds,
        }
    }

    /// Current wall-clock time since the Unix epoch.
    #[must_use]
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: now.as_secs() as u32,
            picoseconds: u64::from(now.subsec_nanos()) * 1_000,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:012}", self.seconds, self.picoseconds)
    }
}

const DEFAULT_PORT_CAPACITY: usize = 1_000;

struct Entry<T> {
    val: T,
    ts: Timestamp,
}

struct Inner<T> {
    lock: Mutex<VecDeque<Entry<T>>>,
    cv: Condvar,
    capacity: usize,
}

/// Create a connected port pair.
///
/// The [`OutputPort`] end goes to the producing component, the
/// [`InputPort`] end to the consumer.
#[must_use]
pub fn channel<T>() -> (OutputPort<T>, InputPort<T>) {
    let inner = Arc::new(Inner {
        lock: Mutex::new(VecDeque::new()),
        cv: Condvar::new(),
        capacity: DEFAULT_PORT_CAPACITY,
    });
    (
        OutputPort {
            inner: inner.clone(),
        },
        InputPort { inner },
    )
}

/// The writing end of a port.
pub struct OutputPort<T> {
    inner: Arc<Inner<T>>,
}

impl<T> OutputPort<T> {
    /// Push one value, handing off ownership.
    ///
    /// This function doesn't enforce capacity. If there's a risk of
    /// overflowing, check `remaining()` before pushing.
    pub fn push(&self, val: T, ts: Timestamp) {
        self.inner.lock.lock().unwrap().push_back(Entry { val, ts });
        self.inner.cv.notify_all();
    }

    /// Remaining advisory capacity.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let has = self.inner.lock.lock().unwrap().len();
        self.inner.capacity.saturating_sub(has)
    }

    /// Return true if the reading end has been dropped.
    #[must_use]
    pub fn closed(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

/// The reading end of a port.
pub struct InputPort<T> {
    inner: Arc<Inner<T>>,
}

impl<T> InputPort<T> {
    /// Pop one value, if any is queued.
    #[must_use]
    pub fn pop(&self) -> Option<(T, Timestamp)> {
        let ret = self
            .inner
            .lock
            .lock()
            .unwrap()
            .pop_front()
            .map(|e| (e.val, e.ts));
        self.inner.cv.notify_all();
        ret
    }

    /// Pop one value, waiting up to `timeout` for one to arrive.
    ///
    /// Spurious wakeups are handled by re-checking the queue; the wait
    /// never exceeds the timeout, so stop requests propagate promptly.
    #[must_use]
    pub fn wait_pop(&self, timeout: Duration) -> Option<(T, Timestamp)> {
        let guard = self.inner.lock.lock().unwrap();
        let (mut guard, _) = self
            .inner
            .cv
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap();
        let ret = guard.pop_front().map(|e| (e.val, e.ts));
        drop(guard);
        if ret.is_some() {
            self.inner.cv.notify_all();
        }
        ret
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        self.inner.lock.lock().unwrap().clear();
        self.inner.cv.notify_all();
    }

    /// Number of queued values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock.lock().unwrap().len()
    }

    /// Return true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock.lock().unwrap().is_empty()
    }

    /// Return true if the writing end has been dropped and the queue is
    /// drained.
    #[must_use]
    pub fn eof(&self) -> bool {
        if !self.inner.lock.lock().unwrap().is_empty() {
            false
        } else {
            Arc::strong_count(&self.inner) == 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_order() {
        let (tx, rx) = channel();
        tx.push(vec![1u8], Timestamp::new(1, 10));
        tx.push(vec![2u8], Timestamp::new(2, 20));
        let (v, ts) = rx.pop().unwrap();
        assert_eq!(v, vec![1]);
        assert_eq!(ts, Timestamp::new(1, 10));
        let (v, ts) = rx.pop().unwrap();
        assert_eq!(v, vec![2]);
        assert_eq!(ts, Timestamp::new(2, 20));
        assert!(rx.pop().is_none());
    }

    #[test]
    fn wait_pop_times_out() {
        let (_tx, rx) = channel::<Vec<u8>>();
        let start = std::time::Instant::now();
        assert!(rx.wait_pop(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_pop_wakes_on_push() {
        let (tx, rx) = channel::<u32>();
        let t = std::thread::spawn(move || rx.wait_pop(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        tx.push(7, Timestamp::default());
        let got = t.join().unwrap();
        assert_eq!(got.unwrap().0, 7);
    }

    #[test]
    fn eof_after_writer_drop() {
        let (tx, rx) = channel::<u32>();
        tx.push(1, Timestamp::default());
        drop(tx);
        assert!(!rx.eof());
        let _ = rx.pop();
        assert!(rx.eof());
    }

    #[test]
    fn clear_discards() {
        let (tx, rx) = channel::<u32>();
        tx.push(1, Timestamp::default());
        tx.push(2, Timestamp::default());
        rx.clear();
        assert!(rx.is_empty());
    }
}
/* vim: textwidth=80
 */
