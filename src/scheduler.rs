//! Fixed-rate periodic trigger for the sampler
//!
//! A dedicated timer thread fires at the configured frequency, pacing itself
//! against absolute deadlines. Each firing runs one sampler tick under a
//! mutex; a firing that finds the previous cycle still holding the lock is
//! dropped rather than queued, so bus transactions never overlap.

use crate::config::SamplerConfig;
use crate::error::{Result, TelemetryError};
use crate::safety::{SafetyMonitor, SafetyState, TimerControl};
use crate::sampler::{Sampler, TickOutcome};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Periodic trigger configured once at startup
pub struct Scheduler {
    config: SamplerConfig,
}

impl Scheduler {
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Start firing `sampler` periodically
    ///
    /// The sampler must still be armed; a sampler that was halted before
    /// arming is rejected.
    pub fn arm<SPI, CS, W>(&self, sampler: Sampler<SPI, CS, W>) -> Result<SchedulerHandle<SPI, CS, W>>
    where
        SPI: SpiBus<u8> + Send + 'static,
        CS: OutputPin + Send + 'static,
        W: Write + Send + 'static,
    {
        self.start(sampler, |body| {
            thread::Builder::new()
                .name("sampling-timer".to_string())
                .spawn(body)
        })
    }

    /// Arm with a caller-supplied thread spawner
    ///
    /// A spawn failure halts the sampler before the error is returned.
    fn start<SPI, CS, W, F>(
        &self,
        sampler: Sampler<SPI, CS, W>,
        spawn: F,
    ) -> Result<SchedulerHandle<SPI, CS, W>>
    where
        SPI: SpiBus<u8> + Send + 'static,
        CS: OutputPin + Send + 'static,
        W: Write + Send + 'static,
        F: FnOnce(TimerBody) -> io::Result<JoinHandle<()>>,
    {
        if !sampler.safety().is_armed() {
            return Err(TelemetryError::InvalidParameter(
                "cannot arm scheduler: sampler is in safe state".to_string(),
            ));
        }

        let timer = TimerControl::new_running();
        sampler.safety().attach_timer(timer.clone());
        let safety = sampler.safety().clone();

        let shared = Arc::new(Mutex::new(sampler));
        let counters = Arc::new(TickCounters::default());
        let (fault_tx, fault_rx) = mpsc::channel();
        let interval = Duration::from_micros(1_000_000 / u64::from(self.config.frequency_hz));

        let body: TimerBody = {
            let shared = shared.clone();
            let counters = counters.clone();
            let timer = timer.clone();
            Box::new(move || run_timer(shared, counters, timer, fault_tx, interval))
        };
        let thread = match spawn(body) {
            Ok(thread) => thread,
            Err(e) => {
                let fault = lock_sampler(&shared).halt(e.into());
                return Err(fault);
            }
        };

        log::info!("Scheduler armed at {} Hz", self.config.frequency_hz);

        Ok(SchedulerHandle {
            sampler: shared,
            safety,
            counters,
            faults: fault_rx,
            thread: Some(thread),
        })
    }
}

type TimerBody = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TickCounters {
    fired: AtomicU64,
    skipped: AtomicU64,
    emitted: AtomicU64,
}

fn lock_sampler<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_timer<SPI, CS, W>(
    shared: Arc<Mutex<Sampler<SPI, CS, W>>>,
    counters: Arc<TickCounters>,
    timer: TimerControl,
    faults: Sender<TelemetryError>,
    interval: Duration,
) where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    W: Write,
{
    let mut next_tick = Instant::now();

    while timer.is_running() {
        counters.fired.fetch_add(1, Ordering::Relaxed);
        fire(&shared, &counters, &faults);

        // Wait until next tick; when running behind, fire immediately
        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        }
    }

    log::debug!("Sampling timer stopped");
}

fn fire<SPI, CS, W>(
    shared: &Mutex<Sampler<SPI, CS, W>>,
    counters: &TickCounters,
    faults: &Sender<TelemetryError>,
) where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    W: Write,
{
    let mut sampler = match shared.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::WouldBlock) => {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            log::warn!("Sampling tick skipped: previous cycle still in flight");
            return;
        }
        Err(TryLockError::Poisoned(poisoned)) => {
            let mut sampler = poisoned.into_inner();
            let e = sampler.halt(TelemetryError::BusTransactionFailure(
                "acquisition cycle panicked".to_string(),
            ));
            let _ = faults.send(e);
            return;
        }
    };

    match sampler.tick() {
        Ok(TickOutcome::Emitted) => {
            counters.emitted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(TickOutcome::Halted) => {}
        Err(e) => {
            let _ = faults.send(e);
        }
    }
}

/// Running scheduler; dropping it halts sampling through the safety monitor
pub struct SchedulerHandle<SPI, CS, W>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    W: Write,
{
    sampler: Arc<Mutex<Sampler<SPI, CS, W>>>,
    safety: SafetyMonitor,
    counters: Arc<TickCounters>,
    faults: Receiver<TelemetryError>,
    thread: Option<JoinHandle<()>>,
}

impl<SPI, CS, W> SchedulerHandle<SPI, CS, W>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    W: Write,
{
    pub fn state(&self) -> SafetyState {
        self.safety.state()
    }

    /// Block until the sampler trips and return the fault
    pub fn wait(&mut self) -> TelemetryError {
        let fault = self.faults.recv().unwrap_or(TelemetryError::Interrupted);
        self.join();
        fault
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<TelemetryError> {
        match self.faults.recv_timeout(timeout) {
            Ok(fault) => {
                self.join();
                Some(fault)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.join();
                Some(TelemetryError::Interrupted)
            }
        }
    }

    /// Stop sampling on request; waits for an in-flight cycle to finish
    pub fn interrupt(&mut self) -> TelemetryError {
        let e = lock_sampler(&self.sampler).halt(TelemetryError::Interrupted);
        self.join();
        // A fault that beat the interrupt takes precedence
        self.faults.try_recv().unwrap_or(e)
    }

    /// Timer firings so far, including skipped ones
    pub fn ticks(&self) -> u64 {
        self.counters.fired.load(Ordering::Relaxed)
    }

    /// Firings dropped because the previous cycle was still running
    pub fn skipped_ticks(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    /// Records written so far; does not contend with the timer for the sampler
    pub fn samples_emitted(&self) -> u64 {
        self.counters.emitted.load(Ordering::Relaxed)
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Sampling timer thread panicked");
            }
        }
    }
}

impl<SPI, CS, W> Drop for SchedulerHandle<SPI, CS, W>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    W: Write,
{
    fn drop(&mut self) {
        if self.safety.is_armed() {
            let _ = lock_sampler(&self.sampler).halt(TelemetryError::Interrupted);
        }
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adxl343::{Adxl343, DeviceConfig};
    use crate::bus::RegisterBus;
    use crate::sim::{SimChipSelect, SimSpi, SimulatedAdxl343};
    use crate::wire::WireEncoder;
    use std::io;

    /// Cloneable in-memory sink shared between the test and the timer thread
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sampler(
        sim: &SimulatedAdxl343,
        sink: SharedBuffer,
    ) -> Sampler<SimSpi, SimChipSelect, SharedBuffer> {
        let (spi, cs) = sim.split();
        let config = DeviceConfig {
            settle_delay: Duration::ZERO,
            ..DeviceConfig::default()
        };
        let sensor = Adxl343::new(RegisterBus::new(spi, cs), config);
        Sampler::initialize(sensor, WireEncoder::new(sink), SafetyMonitor::new()).unwrap()
    }

    fn timestamps(text: &str) -> Vec<u32> {
        text.lines()
            .map(|line| {
                line.trim_start_matches('|')
                    .split(',')
                    .next()
                    .unwrap()
                    .parse()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_rejects_invalid_rate() {
        assert!(Scheduler::new(SamplerConfig { frequency_hz: 0 }).is_err());
        assert!(Scheduler::new(SamplerConfig { frequency_hz: 5000 }).is_err());
    }

    #[test]
    fn test_periodic_sampling_in_order() {
        let sim = SimulatedAdxl343::new();
        let sink = SharedBuffer::default();
        let scheduler = Scheduler::new(SamplerConfig { frequency_hz: 100 }).unwrap();
        let mut handle = scheduler.arm(sampler(&sim, sink.clone())).unwrap();
        assert_eq!(handle.state(), SafetyState::Armed);

        thread::sleep(Duration::from_millis(300));
        let reason = handle.interrupt();
        assert!(matches!(reason, TelemetryError::Interrupted));
        assert_eq!(handle.state(), SafetyState::Safe);

        let stamps = timestamps(&sink.text());
        // ~30 expected; allow generous scheduling jitter
        assert!(stamps.len() >= 10, "only {} samples", stamps.len());
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(handle.samples_emitted(), stamps.len() as u64);
        assert!(sim.cs_is_high());
    }

    #[test]
    fn test_fault_stops_timer() {
        let sim = SimulatedAdxl343::new();
        let sink = SharedBuffer::default();
        let scheduler = Scheduler::new(SamplerConfig { frequency_hz: 200 }).unwrap();
        let mut handle = scheduler.arm(sampler(&sim, sink.clone())).unwrap();

        thread::sleep(Duration::from_millis(50));
        sim.fail_next_transfers(1);

        let fault = handle
            .wait_timeout(Duration::from_secs(2))
            .expect("fault should be reported");
        assert!(matches!(fault, TelemetryError::BusTransactionFailure(_)));
        assert_eq!(handle.state(), SafetyState::Safe);

        // Timer thread has exited; nothing touches the bus any more
        let transactions = sim.transaction_count();
        let ticks = handle.ticks();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(sim.transaction_count(), transactions);
        assert_eq!(handle.ticks(), ticks);
        assert!(sim.cs_is_high());
    }

    #[test]
    fn test_overlapping_tick_is_skipped() {
        let sim = SimulatedAdxl343::new();
        let sink = SharedBuffer::default();
        let shared = Mutex::new(sampler(&sim, sink.clone()));
        let counters = TickCounters::default();
        let (tx, rx) = mpsc::channel();

        {
            let _in_flight = shared.lock().unwrap();
            let before = sim.transaction_count();
            fire(&shared, &counters, &tx);
            assert_eq!(sim.transaction_count(), before);
        }
        assert_eq!(counters.skipped.load(Ordering::Relaxed), 1);

        fire(&shared, &counters, &tx);
        assert_eq!(sink.text().lines().count(), 1);
        assert_eq!(counters.emitted.load(Ordering::Relaxed), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_counter_reads_do_not_skip_ticks() {
        let sim = SimulatedAdxl343::new();
        let sink = SharedBuffer::default();
        let scheduler = Scheduler::new(SamplerConfig { frequency_hz: 500 }).unwrap();
        let mut handle = scheduler.arm(sampler(&sim, sink.clone())).unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let mut last = 0;
        while Instant::now() < deadline {
            let emitted = handle.samples_emitted();
            assert!(emitted >= last);
            last = emitted;
        }

        assert_eq!(handle.skipped_ticks(), 0);
        handle.interrupt();
        assert_eq!(handle.samples_emitted(), sink.text().lines().count() as u64);
    }

    #[test]
    fn test_spawn_failure_enters_safe_state() {
        let sim = SimulatedAdxl343::new();
        let sampler = sampler(&sim, SharedBuffer::default());
        let safety = sampler.safety().clone();
        assert_eq!(safety.state(), SafetyState::Armed);

        let scheduler = Scheduler::new(SamplerConfig::default()).unwrap();
        let result = scheduler.start(sampler, |_body| {
            Err(io::Error::new(io::ErrorKind::OutOfMemory, "no threads left"))
        });

        assert!(matches!(result, Err(TelemetryError::Transport(_))));
        assert_eq!(safety.state(), SafetyState::Safe);
        assert!(safety.fault().is_some());
        assert!(sim.cs_is_high());
    }

    #[test]
    fn test_drop_halts_sampling() {
        let sim = SimulatedAdxl343::new();
        let sink = SharedBuffer::default();
        let scheduler = Scheduler::new(SamplerConfig::default()).unwrap();
        let handle = scheduler.arm(sampler(&sim, sink.clone())).unwrap();

        thread::sleep(Duration::from_millis(30));
        drop(handle);

        let transactions = sim.transaction_count();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(sim.transaction_count(), transactions);
    }

    #[test]
    fn test_halted_sampler_cannot_arm() {
        let sim = SimulatedAdxl343::new();
        let mut sampler = sampler(&sim, SharedBuffer::default());
        sampler.halt(TelemetryError::Interrupted);

        let scheduler = Scheduler::new(SamplerConfig::default()).unwrap();
        assert!(scheduler.arm(sampler).is_err());
    }
}
