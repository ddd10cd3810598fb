//! Capture session controller
//!
//! Wires worker → receiver → caller, acquires the radio and runs the
//! interruptible wait loop. Everything acquired after the frequency check is
//! owned by a [`Capture`] guard, so release happens in a fixed order on every
//! exit path: stop async RX and sleep the radio, restore power saving, stop
//! the worker, then drop the receiver and the environment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{SessionError, WorkerError};
use crate::protocol::{
    DecodedFrame, DecodingEnvironment, KeystoreSource, ProtocolFlags, ProtocolRegistry,
};
use crate::radio::{PowerPolicy, Preset, RadioHal, FREQUENCY_RANGE_STR};
use crate::receiver::{FrameDisposition, Receiver};
use crate::worker::{PulseWorker, WorkerStatsSnapshot, DEFAULT_QUEUE_CAPACITY};

/// Default frequency when none is requested (433.92 MHz)
pub const DEFAULT_FREQUENCY: u32 = 433_920_000;

/// Session parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub frequency: u32,
    pub preset: Preset,
    pub filter: ProtocolFlags,
    pub queue_capacity: usize,
    /// How often the wait loop checks for cancellation
    pub poll_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            preset: Preset::default(),
            filter: ProtocolFlags::ALL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(250),
            stats_interval: Duration::from_secs(10),
        }
    }
}

/// Session lifecycle position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// External interrupt request (e.g. Ctrl+C), checked cooperatively
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Asks a running session to stop; a no-op when it is not running
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.requested.store(true, Ordering::SeqCst);
        }
    }
}

/// Summary returned when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Frequency the radio actually tuned to
    pub frequency: u32,
    pub frames_decoded: u64,
    pub worker: WorkerStatsSnapshot,
}

/// Capture session over a radio and power policy
pub struct Session<R: RadioHal, P: PowerPolicy> {
    radio: R,
    power: P,
    registry: Arc<ProtocolRegistry>,
    keystores: Vec<Box<dyn KeystoreSource + Send + Sync>>,
    config: SessionConfig,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl<R: RadioHal, P: PowerPolicy> Session<R, P> {
    pub fn new(radio: R, power: P, registry: Arc<ProtocolRegistry>, config: SessionConfig) -> Self {
        Self {
            radio,
            power,
            registry,
            keystores: Vec::new(),
            config,
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Keystore to attach to the environment of every run
    pub fn add_keystore(&mut self, source: impl KeystoreSource + Send + Sync + 'static) {
        self.keystores.push(Box::new(source));
    }

    pub fn state(&self) -> SessionState {
        if self.running.load(Ordering::SeqCst) {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
            requested: self.stop_requested.clone(),
        }
    }

    /// Request a stop; does nothing when the session is not running
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Capture until `interrupt` fires or a stop is requested.
    ///
    /// Decoded frames are pushed to `frames`; a full channel drops the frame.
    pub async fn run(
        &mut self,
        frames: mpsc::Sender<DecodedFrame>,
        interrupt: &Interrupt,
    ) -> Result<SessionReport, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        let frequency = self.config.frequency;
        if !self.radio.is_frequency_valid(frequency) {
            return Err(SessionError::InvalidArgument(format!(
                "Frequency must be in {} range, not {}",
                FREQUENCY_RANGE_STR, frequency
            )));
        }

        // Decoding environment
        let mut environment = DecodingEnvironment::new(self.registry.clone());
        for source in &self.keystores {
            if environment.attach_keystore(source.as_ref()).is_err() {
                warn!(
                    "Continuing without keystore '{}'; dependent protocols will not decode",
                    source.name()
                );
            }
        }

        // Receiver wired to the caller's channel
        let mut receiver = Receiver::with_filter(&environment, self.config.filter);
        receiver.set_result_callback(move |frame| {
            if frames.try_send(frame.clone()).is_err() {
                debug!("Frame channel full, dropping frame");
            }
            FrameDisposition::Reset
        });
        let receiver = Arc::new(Mutex::new(receiver));

        let worker = receiver_worker(self.config.queue_capacity, &receiver)?;

        // Hardware
        let mut capture = Capture::new(
            &mut self.radio,
            &mut self.power,
            worker,
            self.running.clone(),
            self.stop_requested.clone(),
        );
        capture.radio.reset()?;
        capture.radio.load_preset(self.config.preset)?;
        let actual_frequency = capture.radio.set_frequency_and_path(frequency)?;
        capture.radio.configure_input_pin()?;
        capture.suppress_power();
        capture.start_rx()?;

        capture.mark_running();

        info!("===========================================");
        info!("  Listening at {} Hz ({})", actual_frequency, self.config.preset);
        info!("  Protocols: {}", self.registry.len());
        info!("  Press Ctrl+C to stop.");
        info!("===========================================");

        let mut ticker =
            tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(1)));
        let mut last_stats = Instant::now();
        loop {
            ticker.tick().await;

            if interrupt.is_triggered() {
                info!("Interrupt received, stopping capture");
                break;
            }
            if self.stop_requested.load(Ordering::SeqCst) {
                info!("Stop requested, stopping capture");
                break;
            }

            if last_stats.elapsed() >= self.config.stats_interval {
                let worker_stats = capture.worker.stats();
                let receiver_stats = lock(&receiver).stats();
                info!(
                    "[Capture Stats] Pulses: {} | Frames: {} | Dropped edges: {} | Overruns: {}",
                    worker_stats.pulses_delivered,
                    receiver_stats.frames_decoded,
                    worker_stats.edges_dropped,
                    worker_stats.overruns
                );
                last_stats = Instant::now();
            }
        }

        let worker_stats = capture.finish();
        let frames_decoded = lock(&receiver).stats().frames_decoded;

        info!(
            "Capture session ended. Frames decoded: {}, pulses: {}",
            frames_decoded, worker_stats.pulses_delivered
        );

        Ok(SessionReport {
            frequency: actual_frequency,
            frames_decoded,
            worker: worker_stats,
        })
    }
}

/// Worker whose pulses feed `receiver` and whose overruns reset it
fn receiver_worker(
    capacity: usize,
    receiver: &Arc<Mutex<Receiver>>,
) -> Result<PulseWorker, WorkerError> {
    let mut worker = PulseWorker::with_capacity(capacity);
    let on_overrun = receiver.clone();
    worker.set_overrun_callback(move || lock(&on_overrun).reset())?;
    let on_pulse = receiver.clone();
    worker.set_pair_callback(move |pulse| {
        lock(&on_pulse).feed(pulse);
    })?;
    Ok(worker)
}

fn lock(receiver: &Mutex<Receiver>) -> MutexGuard<'_, Receiver> {
    receiver.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hardware, power suppression, worker and run flag held for one capture.
///
/// Released on drop in reverse acquisition order, including when the `run`
/// future is dropped mid-await. Release joins the radio and worker threads on
/// the calling thread: the guard borrows the session so it cannot move to a
/// blocking task, and a drop cannot await one. The joins are bounded by the
/// worker's idle poll plus the queue drain.
struct Capture<'a, R: RadioHal, P: PowerPolicy> {
    radio: &'a mut R,
    power: &'a mut P,
    worker: PulseWorker,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    power_suppressed: bool,
    rx_started: bool,
    released: bool,
}

impl<'a, R: RadioHal, P: PowerPolicy> Capture<'a, R, P> {
    fn new(
        radio: &'a mut R,
        power: &'a mut P,
        worker: PulseWorker,
        running: Arc<AtomicBool>,
        stop_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            radio,
            power,
            worker,
            running,
            stop_requested,
            power_suppressed: false,
            rx_started: false,
            released: false,
        }
    }

    fn suppress_power(&mut self) {
        self.power.suppress_enter();
        self.power_suppressed = true;
    }

    /// Start the worker, then let the radio report edges into it
    fn start_rx(&mut self) -> Result<(), SessionError> {
        self.worker.start()?;
        self.radio.rx()?;
        let sink = self.worker.edge_sink().ok_or(WorkerError::NotRunning)?;
        self.radio.start_async_rx(sink)?;
        self.rx_started = true;
        Ok(())
    }

    fn mark_running(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.rx_started {
            self.radio.stop_async_rx();
            self.rx_started = false;
        }
        self.radio.sleep();

        if self.power_suppressed {
            self.power.suppress_exit();
            self.power_suppressed = false;
        }

        if self.worker.is_running() {
            let _ = self.worker.stop();
        }

        self.running.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Release everything and report the final worker statistics
    fn finish(mut self) -> WorkerStatsSnapshot {
        self.release();
        self.worker.stats()
    }
}

impl<R: RadioHal, P: PowerPolicy> Drop for Capture<'_, R, P> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HalError;
    use crate::protocol::decoders::PulseTrainDecoder;
    use crate::protocol::{DecoderState, ProtocolDescriptor, PulseEvent};
    use crate::worker::EdgeSink;
    use std::thread::{self, JoinHandle};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Reset,
        LoadPreset(Preset),
        SetFrequency(u32),
        ConfigurePin,
        Rx,
        StartAsyncRx,
        StopAsyncRx,
        Sleep,
        SuppressEnter,
        SuppressExit,
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    struct MockRadio {
        log: CallLog,
        script: Vec<PulseEvent>,
        fail_start: bool,
        thread: Option<JoinHandle<()>>,
    }

    impl MockRadio {
        fn new(log: CallLog, script: Vec<PulseEvent>) -> Self {
            Self {
                log,
                script,
                fail_start: false,
                thread: None,
            }
        }

        fn record(&self, call: Call) {
            self.log.lock().unwrap().push(call);
        }
    }

    impl RadioHal for MockRadio {
        fn reset(&mut self) -> Result<(), HalError> {
            self.record(Call::Reset);
            Ok(())
        }

        fn load_preset(&mut self, preset: Preset) -> Result<(), HalError> {
            self.record(Call::LoadPreset(preset));
            Ok(())
        }

        fn set_frequency_and_path(&mut self, frequency: u32) -> Result<u32, HalError> {
            self.record(Call::SetFrequency(frequency));
            Ok(frequency)
        }

        fn configure_input_pin(&mut self) -> Result<(), HalError> {
            self.record(Call::ConfigurePin);
            Ok(())
        }

        fn rx(&mut self) -> Result<(), HalError> {
            self.record(Call::Rx);
            Ok(())
        }

        fn start_async_rx(&mut self, sink: EdgeSink) -> Result<(), HalError> {
            self.record(Call::StartAsyncRx);
            if self.fail_start {
                return Err(HalError::Fault("edge interrupt unavailable".to_string()));
            }
            let script = self.script.clone();
            self.thread = Some(thread::spawn(move || {
                for pulse in script {
                    sink.push_edge(pulse.level, pulse.duration);
                }
            }));
            Ok(())
        }

        fn stop_async_rx(&mut self) {
            self.record(Call::StopAsyncRx);
            if let Some(handle) = self.thread.take() {
                handle.join().unwrap();
            }
        }

        fn sleep(&mut self) {
            self.record(Call::Sleep);
        }
    }

    struct MockPower {
        log: CallLog,
    }

    impl PowerPolicy for MockPower {
        fn suppress_enter(&mut self) {
            self.log.lock().unwrap().push(Call::SuppressEnter);
        }

        fn suppress_exit(&mut self) {
            self.log.lock().unwrap().push(Call::SuppressExit);
        }
    }

    fn pattern(repetitions: usize) -> Vec<PulseEvent> {
        (0..repetitions)
            .flat_map(|_| [PulseEvent::high(350), PulseEvent::low(350)])
            .collect()
    }

    fn registry() -> Arc<ProtocolRegistry> {
        Arc::new(
            ProtocolRegistry::new(vec![ProtocolDescriptor::new(
                "PulseTrain",
                ProtocolFlags::DECODABLE | ProtocolFlags::AM,
                |_| Box::new(PulseTrainDecoder::new(350, 24)),
            )])
            .unwrap(),
        )
    }

    fn config(frequency: u32) -> SessionConfig {
        SessionConfig {
            frequency,
            poll_interval: Duration::from_millis(10),
            ..SessionConfig::default()
        }
    }

    fn session(log: &CallLog, script: Vec<PulseEvent>, frequency: u32) -> Session<MockRadio, MockPower> {
        Session::new(
            MockRadio::new(log.clone(), script),
            MockPower { log: log.clone() },
            registry(),
            config(frequency),
        )
    }

    #[tokio::test]
    async fn test_invalid_frequency_touches_no_hardware() {
        let log = CallLog::default();
        let mut session = session(&log, Vec::new(), 1);
        let (tx, _rx) = mpsc::channel(8);

        let result = session.run(tx, &Interrupt::new()).await;
        assert!(matches!(result, Err(SessionError::InvalidArgument(_))));
        assert!(log.lock().unwrap().is_empty());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_decodes_frames_until_interrupted() {
        let log = CallLog::default();
        let mut script = pattern(24);
        script.extend(pattern(24));
        let mut session = session(&log, script, 433_920_000);
        let (tx, mut rx) = mpsc::channel(8);
        let interrupt = Interrupt::new();

        let (result, frames) = tokio::join!(session.run(tx, &interrupt), async {
            let mut frames = Vec::new();
            while frames.len() < 2 {
                match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                    Ok(Some(frame)) => frames.push(frame),
                    _ => break,
                }
            }
            interrupt.trigger();
            frames
        });

        let report = result.unwrap();
        assert_eq!(report.frequency, 433_920_000);
        assert_eq!(report.frames_decoded, 2);
        assert_eq!(report.worker.pulses_delivered, 96);
        assert_eq!(frames.len(), 2);
        assert!(frames
            .iter()
            .all(|f| f.text == "PulseTrain 24 pairs te:350us avg:350us"));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Call::Reset,
                Call::LoadPreset(Preset::Ook650Async),
                Call::SetFrequency(433_920_000),
                Call::ConfigurePin,
                Call::SuppressEnter,
                Call::Rx,
                Call::StartAsyncRx,
                Call::StopAsyncRx,
                Call::Sleep,
                Call::SuppressExit,
            ]
        );
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_stop_handle_ends_session() {
        let log = CallLog::default();
        let mut session = session(&log, Vec::new(), 868_350_000);
        let handle = session.stop_handle();
        let (tx, _rx) = mpsc::channel(8);
        let interrupt = Interrupt::new();

        let (result, _) = tokio::join!(session.run(tx, &interrupt), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.stop();
        });

        assert_eq!(result.unwrap().frames_decoded, 0);
        assert_eq!(log.lock().unwrap().last(), Some(&Call::SuppressExit));
    }

    #[test]
    fn test_stop_when_never_started_is_noop() {
        let log = CallLog::default();
        let session = session(&log, Vec::new(), 433_920_000);
        assert!(!session.is_running());
        session.stop();
        session.stop_handle().stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_releases_in_order() {
        let log = CallLog::default();
        let mut session = session(&log, pattern(24), 433_920_000);
        session.radio.fail_start = true;
        let (tx, _rx) = mpsc::channel(8);

        let result = session.run(tx, &Interrupt::new()).await;
        assert!(matches!(result, Err(SessionError::Hardware(_))));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Call::Reset,
                Call::LoadPreset(Preset::Ook650Async),
                Call::SetFrequency(433_920_000),
                Call::ConfigurePin,
                Call::SuppressEnter,
                Call::Rx,
                Call::StartAsyncRx,
                Call::Sleep,
                Call::SuppressExit,
            ]
        );
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_run_releases_and_can_restart() {
        let log = CallLog::default();
        let mut session = session(&log, Vec::new(), 433_920_000);
        let handle = session.stop_handle();
        let (tx, _rx) = mpsc::channel(8);
        let interrupt = Interrupt::new();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), session.run(tx, &interrupt)).await;
        assert!(cancelled.is_err());
        assert_eq!(log.lock().unwrap().last(), Some(&Call::SuppressExit));
        assert_eq!(session.state(), SessionState::Idle);

        // Stop on an idle session must not leak into the next run
        handle.stop();

        log.lock().unwrap().clear();
        let (tx, _rx) = mpsc::channel(8);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let report = session.run(tx, &interrupt).await.unwrap();
        assert_eq!(report.frequency, 433_920_000);
        assert_eq!(log.lock().unwrap().first(), Some(&Call::Reset));
        assert!(!session.is_running());
    }

    #[test]
    fn test_overrun_discards_partial_train() {
        let env = DecodingEnvironment::new(registry());
        let mut receiver = Receiver::new(&env);
        let frames = Arc::new(Mutex::new(Vec::new()));
        let collected = frames.clone();
        receiver.set_result_callback(move |frame| {
            collected.lock().unwrap().push(frame.clone());
            FrameDisposition::Reset
        });
        let receiver = Arc::new(Mutex::new(receiver));

        let mut worker = receiver_worker(8, &receiver).unwrap();
        worker.start().unwrap();
        let edges = worker.edge_sink().unwrap();

        let wait_until = |condition: &dyn Fn() -> bool| {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !condition() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(2));
            }
            condition()
        };

        // Half a train reaches the decoder
        for pulse in pattern(12) {
            edges.push_edge(pulse.level, pulse.duration);
        }
        assert!(wait_until(&|| lock(&receiver).stats().pulses_fed == 24));
        assert!(lock(&receiver)
            .states()
            .all(|(_, state)| state == DecoderState::Accumulating));

        // Saturate the queue while the worker is stuck on the receiver
        {
            let _held = lock(&receiver);
            for pulse in pattern(15) {
                edges.push_edge(pulse.level, pulse.duration);
            }
            assert_eq!(worker.stats().overruns, 1);
        }
        assert!(wait_until(&|| lock(&receiver).stats().resets == 1));
        assert!(lock(&receiver)
            .states()
            .all(|(_, state)| state == DecoderState::Idle));

        // A full train afterwards decodes exactly once
        let delivered = worker.stats().pulses_delivered;
        for (i, pulse) in pattern(24).into_iter().enumerate() {
            edges.push_edge(pulse.level, pulse.duration);
            let expected = delivered + i as u64 + 1;
            assert!(wait_until(&|| worker.stats().pulses_delivered == expected));
        }
        worker.stop().unwrap();

        assert_eq!(frames.lock().unwrap().len(), 1);
        assert_eq!(worker.stats().overruns, 1);
        assert!(lock(&receiver)
            .states()
            .all(|(_, state)| state == DecoderState::Idle));
    }

    #[tokio::test]
    async fn test_missing_keystore_does_not_abort() {
        let log = CallLog::default();
        let mut session = session(&log, pattern(24), 433_920_000);
        session.add_keystore(crate::protocol::StaticKeystore::new("mfcodes", Vec::new()));
        let (tx, mut rx) = mpsc::channel(8);
        let interrupt = Interrupt::new();

        let (result, frame) = tokio::join!(session.run(tx, &interrupt), async {
            let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
            interrupt.trigger();
            frame
        });

        assert!(result.is_ok());
        assert!(matches!(frame, Ok(Some(_))));
    }
}
