//! In-memory [`Connection`] for exercising the registry without sockets.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::connection::{Connection, TransportError};
use crate::frame::Frame;

/// Records every frame written to it and can be told to fail, stall or
/// slow down. Also tracks how many writes overlap in time.
pub struct MemoryConnection {
    frames: Mutex<Vec<Frame>>,
    failing: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryConnection {
    /// A connection that accepts every write immediately.
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            delay: None,
            gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// A connection whose every write fails.
    pub fn failing() -> Self {
        let conn = Self::new();
        conn.set_failing(true);
        conn
    }

    /// A connection whose writes each take `delay` to complete.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// A connection whose writes block until [`open_gate`](Self::open_gate)
    /// releases them, one permit per write.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Let `writes` more gated writes through.
    pub fn open_gate(&self, writes: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(writes);
        }
    }

    /// Switch write failures on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Frames written so far, in write order.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    /// Payloads written so far, decoded lossily as UTF-8.
    pub fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .map(|f| String::from_utf8_lossy(&f.payload).into_owned())
            .collect()
    }

    /// Number of times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called at least once.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Highest number of writes observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` frames were written or `within` elapses.
    pub async fn wait_for_frames(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.frames.lock().len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn write(&self, frame: &Frame) -> Result<(), TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| TransportError::Write(e.to_string()))?
                .forget();
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Write("simulated write failure".into()));
        }
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.write(frame).await;
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
