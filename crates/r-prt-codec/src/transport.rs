//! ---
//! prt_section: "02-protocol-codec"
//! prt_subsection: "module"
//! prt_type: "source"
//! prt_scope: "code"
//! prt_description: "Raw frame transport capabilities and in-process implementations."
//! prt_version: "v0.0.0-prealpha"
//! prt_owner: "tbd"
//! ---
//! Raw Ethernet frame transport seam.
//!
//! Platform drivers (packet sockets, BPF, capture libraries) live outside this
//! workspace and plug in through [`RawFrameSender`] and [`RawFrameReceiver`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::TransportError;

pub trait RawFrameSender: Send + Sync {
    /// Transmit one frame, returning the number of bytes written.
    fn send_frame(&self, frame: &[u8]) -> Result<usize, TransportError>;
}

pub trait RawFrameReceiver: Send + Sync {
    /// Wait up to `timeout` for the next frame; `Ok(None)` on timeout.
    fn receive_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

pub const DEFAULT_LOOPBACK_CAPACITY: usize = 4096;

/// Bounded in-memory queue implementing both halves of the transport.
#[derive(Debug)]
pub struct LoopbackTransport {
    queue: Mutex<VecDeque<Vec<u8>>>,
    ready: Condvar,
    capacity: usize,
    sent: AtomicU64,
    failing: AtomicBool,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOOPBACK_CAPACITY)
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOOPBACK_CAPACITY))),
            ready: Condvar::new(),
            capacity: capacity.max(1),
            sent: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent send fail, to exercise the transient error path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.queue.lock().drain(..).collect()
    }

    /// Queue a frame for receivers without counting it as sent, e.g. a GOOSE frame
    /// injected by a test.
    pub fn inject(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(TransportError::QueueFull {
                capacity: self.capacity,
            });
        }
        queue.push_back(frame);
        self.ready.notify_one();
        Ok(())
    }
}

impl RawFrameSender for LoopbackTransport {
    fn send_frame(&self, frame: &[u8]) -> Result<usize, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("loopback send disabled".into()));
        }
        self.inject(frame.to_vec())?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(frame.len())
    }
}

impl RawFrameReceiver for LoopbackTransport {
    fn receive_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            if self.ready.wait_until(&mut queue, deadline).timed_out() {
                break;
            }
        }
        Ok(queue.pop_front())
    }
}

/// Sender that drops every frame; receiver that never yields one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl RawFrameSender for NullTransport {
    fn send_frame(&self, frame: &[u8]) -> Result<usize, TransportError> {
        Ok(frame.len())
    }
}

impl RawFrameReceiver for NullTransport {
    fn receive_frame(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        thread::sleep(timeout);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn loopback_delivers_in_order() {
        let transport = LoopbackTransport::new();
        transport.send_frame(&[1]).unwrap();
        transport.send_frame(&[2, 2]).unwrap();
        assert_eq!(transport.sent(), 2);
        let timeout = Duration::from_millis(1);
        assert_eq!(transport.receive_frame(timeout).unwrap(), Some(vec![1]));
        assert_eq!(transport.receive_frame(timeout).unwrap(), Some(vec![2, 2]));
        assert_eq!(transport.receive_frame(timeout).unwrap(), None);
    }

    #[test]
    fn full_queue_rejects_send() {
        let transport = LoopbackTransport::with_capacity(1);
        transport.send_frame(&[1]).unwrap();
        assert!(matches!(
            transport.send_frame(&[2]),
            Err(TransportError::QueueFull { capacity: 1 })
        ));
        assert_eq!(transport.sent(), 1);
    }

    #[test]
    fn failing_mode_surfaces_error() {
        let transport = LoopbackTransport::new();
        transport.set_failing(true);
        assert!(transport.send_frame(&[1]).is_err());
        assert!(transport.is_empty());
    }

    #[test]
    fn receiver_wakes_on_send() {
        let transport = Arc::new(LoopbackTransport::new());
        let sender = transport.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender.send_frame(&[9]).unwrap();
        });
        let started = Instant::now();
        let frame = transport.receive_frame(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(frame, Some(vec![9]));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
