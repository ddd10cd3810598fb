//! Pulse capture worker
//!
//! Bridges the edge-reporting context of the radio (which must return
//! immediately) to decoder code running on a dedicated thread:
//! 1. The radio calls [`EdgeSink::push_edge`] for every edge
//! 2. Edges go into a fixed-capacity crossbeam queue with `try_send`
//! 3. The `subghz-worker` thread pops them in order and calls the pair callback
//!
//! Overrun policy is drop-newest. A full queue opens an overrun episode during
//! which every new edge is dropped. Once the worker thread has drained the
//! edges queued before the overrun it calls the overrun callback once and the
//! episode closes.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::WorkerError;
use crate::protocol::PulseEvent;

/// Default edge queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// How often the worker thread re-checks the stop flag while idle
const IDLE_POLL: Duration = Duration::from_millis(20);

type PairCallback = Box<dyn FnMut(PulseEvent) + Send>;
type OverrunCallback = Box<dyn FnMut() + Send>;

/// Statistics for the worker (atomic for access from any thread)
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub edges_accepted: AtomicU64,
    pub edges_dropped: AtomicU64,
    pub overruns: AtomicU64,
    pub pulses_delivered: AtomicU64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            edges_accepted: self.edges_accepted.load(Ordering::Relaxed),
            edges_dropped: self.edges_dropped.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            pulses_delivered: self.pulses_delivered.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`WorkerStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub edges_accepted: u64,
    pub edges_dropped: u64,
    pub overruns: u64,
    pub pulses_delivered: u64,
}

#[derive(Debug, Default)]
struct Shared {
    accepting: AtomicBool,
    overrun: AtomicBool,
    stats: WorkerStats,
}

/// Producer handle given to the radio's edge callback
#[derive(Clone)]
pub struct EdgeSink {
    tx: Sender<PulseEvent>,
    shared: Arc<Shared>,
}

impl EdgeSink {
    /// Queue one edge. Never blocks and never allocates.
    #[inline]
    pub fn push_edge(&self, level: bool, duration: u32) {
        let shared = &*self.shared;
        if !shared.accepting.load(Ordering::Acquire) {
            return;
        }
        if shared.overrun.load(Ordering::Acquire) {
            shared.stats.edges_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.tx.try_send(PulseEvent { level, duration }) {
            Ok(()) => {
                shared.stats.edges_accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                shared.stats.edges_dropped.fetch_add(1, Ordering::Relaxed);
                if !shared.overrun.swap(true, Ordering::AcqRel) {
                    shared.stats.overruns.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                shared.stats.edges_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Pulse capture worker
pub struct PulseWorker {
    capacity: usize,
    pair_callback: Option<PairCallback>,
    overrun_callback: Option<OverrunCallback>,
    shared: Arc<Shared>,
    sink: Option<EdgeSink>,
    thread: Option<JoinHandle<(Option<PairCallback>, Option<OverrunCallback>)>>,
}

impl PulseWorker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pair_callback: None,
            overrun_callback: None,
            shared: Arc::new(Shared::default()),
            sink: None,
            thread: None,
        }
    }

    /// Set the per-pulse callback (runs on the worker thread)
    pub fn set_pair_callback<F>(&mut self, callback: F) -> Result<(), WorkerError>
    where
        F: FnMut(PulseEvent) + Send + 'static,
    {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }
        self.pair_callback = Some(Box::new(callback));
        Ok(())
    }

    /// Set the overrun callback (runs on the worker thread, once per episode)
    pub fn set_overrun_callback<F>(&mut self, callback: F) -> Result<(), WorkerError>
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }
        self.overrun_callback = Some(Box::new(callback));
        Ok(())
    }

    /// Allocate the edge queue and start the worker thread
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }

        info!("Starting pulse worker (queue capacity: {} edges)", self.capacity);

        let (tx, rx) = bounded::<PulseEvent>(self.capacity);
        let shared = self.shared.clone();
        let pair_callback = self.pair_callback.take();
        let overrun_callback = self.overrun_callback.take();

        shared.overrun.store(false, Ordering::Release);
        shared.accepting.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name("subghz-worker".to_string())
            .spawn(move || run_worker(rx, shared, pair_callback, overrun_callback));

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                self.sink = Some(EdgeSink {
                    tx,
                    shared: self.shared.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.shared.accepting.store(false, Ordering::Release);
                error!("Failed to spawn pulse worker thread: {}", e);
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Stop accepting edges, deliver the ones already queued, join the thread
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        let handle = self.thread.take().ok_or(WorkerError::NotRunning)?;

        info!("Stopping pulse worker...");
        self.shared.accepting.store(false, Ordering::Release);
        self.sink = None;

        match handle.join() {
            Ok((pair_callback, overrun_callback)) => {
                self.pair_callback = pair_callback;
                self.overrun_callback = overrun_callback;
            }
            Err(_) => error!("Pulse worker thread panicked"),
        }

        let stats = self.stats();
        info!(
            "Pulse worker stopped. Edges: {} accepted, {} dropped | Overruns: {} | Pulses delivered: {}",
            stats.edges_accepted, stats.edges_dropped, stats.overruns, stats.pulses_delivered
        );
        Ok(())
    }

    /// True from a successful `start` until `stop` has joined the thread
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Producer handle for the radio, available while running
    pub fn edge_sink(&self) -> Option<EdgeSink> {
        self.sink.clone()
    }

    /// Queue an edge through the worker's own sink
    pub fn push_edge(&self, level: bool, duration: u32) {
        if let Some(sink) = &self.sink {
            sink.push_edge(level, duration);
        }
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Default for PulseWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PulseWorker {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

/// Worker thread loop
fn run_worker(
    rx: Receiver<PulseEvent>,
    shared: Arc<Shared>,
    mut pair_callback: Option<PairCallback>,
    mut overrun_callback: Option<OverrunCallback>,
) -> (Option<PairCallback>, Option<OverrunCallback>) {
    debug!("Pulse worker thread running");

    let mut recover_overrun = |rx: &Receiver<PulseEvent>| {
        // Producer drops everything while the flag is set, so an empty queue
        // stays empty until the flag is cleared. Edges accepted once it is
        // cleared are only popped after the callback returns.
        if shared.overrun.load(Ordering::Acquire) && rx.is_empty() {
            debug!("Edge queue overrun, discarding partial pulse train");
            shared.overrun.store(false, Ordering::Release);
            if let Some(callback) = overrun_callback.as_mut() {
                callback();
            }
        }
    };

    loop {
        recover_overrun(&rx);

        match rx.recv_timeout(IDLE_POLL) {
            Ok(pulse) => {
                if let Some(callback) = pair_callback.as_mut() {
                    callback(pulse);
                }
                shared.stats.pulses_delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !shared.accepting.load(Ordering::Acquire) {
                    recover_overrun(&rx);
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(recover_overrun);
    debug!("Pulse worker thread exiting");
    (pair_callback, overrun_callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_pulses_delivered_in_order() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let mut worker = PulseWorker::with_capacity(64);
        worker
            .set_pair_callback(move |pulse| sink.lock().unwrap().push(pulse))
            .unwrap();
        worker.start().unwrap();

        let edges = worker.edge_sink().unwrap();
        for i in 0..40u32 {
            edges.push_edge(i % 2 == 0, 100 + i);
        }
        worker.stop().unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 40);
        for (i, pulse) in received.iter().enumerate() {
            assert_eq!(pulse.level, i % 2 == 0);
            assert_eq!(pulse.duration, 100 + i as u32);
        }
        assert_eq!(worker.stats().pulses_delivered, 40);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut worker = PulseWorker::new();
        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(WorkerError::AlreadyRunning)));
        assert!(matches!(
            worker.set_pair_callback(|_| {}),
            Err(WorkerError::AlreadyRunning)
        ));
        worker.stop().unwrap();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_stop_when_not_running() {
        let mut worker = PulseWorker::new();
        assert!(matches!(worker.stop(), Err(WorkerError::NotRunning)));
        // Edges pushed while stopped are ignored
        worker.push_edge(true, 350);
        assert_eq!(worker.stats(), WorkerStatsSnapshot::default());
    }

    #[test]
    fn test_overrun_reported_once_per_episode() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
        let overruns = Arc::new(AtomicU64::new(0));
        let delivered = Arc::new(AtomicU64::new(0));

        let mut worker = PulseWorker::with_capacity(4);
        let counter = delivered.clone();
        let mut blocked = false;
        worker
            .set_pair_callback(move |_| {
                if !blocked {
                    blocked = true;
                    let _ = gate_rx.recv();
                }
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let overrun_counter = overruns.clone();
        worker
            .set_overrun_callback(move || {
                overrun_counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        worker.start().unwrap();

        // Far more edges than the queue can hold while the consumer is stuck
        let edges = worker.edge_sink().unwrap();
        for _ in 0..200 {
            edges.push_edge(true, 350);
        }
        assert_eq!(worker.stats().overruns, 1);
        assert_eq!(overruns.load(Ordering::SeqCst), 0);

        gate_tx.send(()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            overruns.load(Ordering::SeqCst) == 1
        }));

        // Episode closed: new edges flow again without another overrun
        for _ in 0..3 {
            edges.push_edge(false, 350);
        }
        worker.stop().unwrap();

        let stats = worker.stats();
        assert_eq!(overruns.load(Ordering::SeqCst), 1);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.edges_accepted + stats.edges_dropped, 203);
        assert_eq!(delivered.load(Ordering::SeqCst), stats.edges_accepted);
    }

    #[test]
    fn test_each_saturation_opens_new_episode() {
        let hold = Arc::new(AtomicBool::new(false));
        let overruns = Arc::new(AtomicU64::new(0));

        let mut worker = PulseWorker::with_capacity(4);
        let held = hold.clone();
        worker
            .set_pair_callback(move |_| {
                while held.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap();
        let overrun_counter = overruns.clone();
        worker
            .set_overrun_callback(move || {
                overrun_counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        worker.start().unwrap();
        let edges = worker.edge_sink().unwrap();

        for episode in 1..=2u64 {
            hold.store(true, Ordering::SeqCst);
            for _ in 0..200 {
                edges.push_edge(true, 350);
            }
            assert_eq!(worker.stats().overruns, episode);

            hold.store(false, Ordering::SeqCst);
            assert!(wait_until(Duration::from_secs(2), || {
                overruns.load(Ordering::SeqCst) == episode
            }));
        }
        worker.stop().unwrap();

        assert_eq!(overruns.load(Ordering::SeqCst), 2);
        assert_eq!(worker.stats().overruns, 2);
    }

    #[test]
    fn test_restart_keeps_callbacks() {
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();

        let mut worker = PulseWorker::with_capacity(16);
        worker
            .set_pair_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        for _ in 0..2 {
            worker.start().unwrap();
            worker.push_edge(true, 350);
            worker.push_edge(false, 350);
            worker.stop().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
