//! Periodic progress reporting for a single transfer.
//!
//! The transfer loop reports sent bytes through [`TransferProgress::count`];
//! a ticker task started on the first count writes a progress line to the
//! sink every interval until it observes completion.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::sink::LogSink;

/// Shared counters of one transfer. Only ever touched under its mutex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferState {
    pub bytes_sent: u64,
    pub total_bytes: u64,
    pub is_done: bool,
}

impl TransferState {
    /// Everything announced has been sent. A zero total means the size is
    /// unknown, so only an empty transfer counts as complete then.
    pub fn reached_total(&self) -> bool {
        if self.total_bytes == 0 {
            self.bytes_sent == 0
        } else {
            self.bytes_sent >= self.total_bytes
        }
    }
}

/// What the ticker should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

pub struct TransferProgress {
    state: Arc<Mutex<TransferState>>,
    sink: Arc<dyn LogSink>,
    interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TransferProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferProgress")
            .field("state", &*self.state.lock())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl TransferProgress {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_interval(sink, Duration::from_secs(1))
    }

    pub fn with_interval(sink: Arc<dyn LogSink>, interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TransferState::default())),
            sink,
            interval,
            ticker: Mutex::new(None),
        }
    }

    /// Reset counters for a transfer of `total_bytes`.
    pub fn init(&self, total_bytes: u64) {
        *self.state.lock() = TransferState {
            bytes_sent: 0,
            total_bytes,
            is_done: false,
        };
    }

    /// Record `bytes` more sent. Returns `false` once the transfer has been
    /// marked done or the known total was already reached, telling the
    /// caller to stop sending. Refused bytes are not counted.
    pub fn count(&self, bytes: u64) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_done || (state.total_bytes != 0 && state.reached_total()) {
                return false;
            }
            state.bytes_sent = state.bytes_sent.saturating_add(bytes);
        }
        self.ensure_ticker();
        true
    }

    /// Transfer finished: mark done and cancel the ticker.
    pub fn end(&self) {
        self.state.lock().is_done = true;
        self.stop();
    }

    /// Cancel the ticker. Safe to call when it never started.
    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
    }

    pub fn snapshot(&self) -> TransferState {
        *self.state.lock()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }

    fn ensure_ticker(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let state = self.state.clone();
        let sink = self.sink.clone();
        let period = self.interval;
        *ticker = Some(tokio::spawn(async move {
            // First report one full period after the transfer starts
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if on_tick(&state, sink.as_ref()) == Tick::Stop {
                    tracing::trace!("progress ticker stopped");
                    break;
                }
            }
        }));
    }
}

impl Drop for TransferProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One ticker period. Completion is noticed on one tick and the ticker stops
/// on the next, so nothing is printed once everything has been sent.
pub fn on_tick(state: &Mutex<TransferState>, sink: &dyn LogSink) -> Tick {
    let snapshot = {
        let mut state = state.lock();
        if state.is_done {
            return Tick::Stop;
        }
        if state.reached_total() {
            state.is_done = true;
            return Tick::Continue;
        }
        *state
    };

    sink.write(&format!("transferred: {} bytes ", snapshot.bytes_sent));
    if snapshot.total_bytes != 0 {
        let percent = snapshot.bytes_sent as f64 * 100.0 / snapshot.total_bytes as f64;
        sink.writeln(&format!("transferred: {}%", format_percent(percent)));
    } else {
        sink.writeln("");
    }
    Tick::Continue
}

/// At most three fraction digits, trailing zeros dropped.
pub fn format_percent(value: f64) -> String {
    let formatted = format!("{:.3}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
