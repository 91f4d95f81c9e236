//! Progress and throughput reporting.
//!
//! A [`ProgressTracker`] counts bytes as they are copied (lock-free, on the
//! I/O path) and runs one sampler task that periodically pushes the bar
//! fraction and a smoothed `speed t:eta` text to a [`ProgressDisplay`].
//!
//! The receiver shares one tracker across all inbound transfers. Each
//! transfer joins it through a [`TransferShare`], which grows the target when
//! the transfer starts and takes its bytes back out when it ends, so the
//! aggregate bar never jumps back to zero while others are still running.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::events::EventReporter;
use crate::transfer::copy::ByteSink;
use crate::{AppEvent, Role};

/// Bar refresh cadence.
pub const FRACTION_INTERVAL: Duration = Duration::from_millis(100);
/// Speed refresh cadence.
pub const SPEED_INTERVAL: Duration = Duration::from_millis(250);
/// Number of speed samples kept; speed is measured across this many windows.
pub const SPEED_WINDOWS: usize = 4;

pub const IDLE_SPEED_TEXT: &str = "0.0B/s t:0s";

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Where sampled progress goes. Implementations must not block.
pub trait ProgressDisplay: Send + Sync + 'static {
    fn set_fraction(&self, fraction: f64);
    fn set_speed_text(&self, text: &str);

    /// Final idle frame after the tracker closes. Must not be lost.
    fn reset(&self) {
        self.set_fraction(0.0);
        self.set_speed_text(IDLE_SPEED_TEXT);
    }
}

/// Forwards progress frames to the UI as [`AppEvent`]s for one role.
pub struct EventDisplay {
    role: Role,
    reporter: EventReporter,
}

impl EventDisplay {
    pub fn new(role: Role, reporter: EventReporter) -> Arc<Self> {
        Arc::new(Self { role, reporter })
    }
}

impl ProgressDisplay for EventDisplay {
    fn set_fraction(&self, fraction: f64) {
        self.reporter.emit_now(AppEvent::Progress {
            role: self.role,
            fraction,
        });
    }

    fn set_speed_text(&self, text: &str) {
        self.reporter.emit_now(AppEvent::Speed {
            role: self.role,
            text: text.to_string(),
        });
    }

    fn reset(&self) {
        let reporter = self.reporter.clone();
        let role = self.role;
        // Queued behind whatever is pending instead of dropped when full.
        tokio::spawn(async move {
            reporter
                .emit(AppEvent::Progress {
                    role,
                    fraction: 0.0,
                })
                .await;
            reporter
                .emit(AppEvent::Speed {
                    role,
                    text: IDLE_SPEED_TEXT.to_string(),
                })
                .await;
        });
    }
}

#[derive(Default)]
struct Counters {
    now: AtomicI64,
    target: AtomicI64,
    /// Every byte ever observed; never decreases, feeds the speed window.
    observed: AtomicI64,
}

impl Counters {
    fn fraction(&self) -> f64 {
        let target = self.target.load(Ordering::Relaxed);
        if target <= 0 {
            return 0.0;
        }
        let now = self.now.load(Ordering::Relaxed);
        (now as f64 / target as f64).clamp(0.0, 1.0)
    }
}

/// Shared byte counter with a background sampler.
///
/// Clones share the same counters. The sampler stops on [`close`] or when
/// the last clone is dropped.
///
/// [`close`]: ProgressTracker::close
#[derive(Clone)]
pub struct ProgressTracker {
    counters: Arc<Counters>,
    cancel: CancellationToken,
    _guard: Arc<DropGuard>,
}

impl ProgressTracker {
    /// Track a single transfer of `target` bytes. Must be called inside a
    /// tokio runtime.
    pub fn new(target: u64, display: Arc<dyn ProgressDisplay>) -> Self {
        let counters = Arc::new(Counters::default());
        counters.target.store(target as i64, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        tokio::spawn(run_sampler(counters.clone(), display, cancel.clone()));

        Self {
            counters,
            _guard: Arc::new(cancel.clone().drop_guard()),
            cancel,
        }
    }

    /// Track a dynamic set of transfers; the target starts at zero.
    pub fn aggregate(display: Arc<dyn ProgressDisplay>) -> Self {
        Self::new(0, display)
    }

    pub fn observe(&self, n: u64) {
        self.counters.now.fetch_add(n as i64, Ordering::Relaxed);
        self.counters.observed.fetch_add(n as i64, Ordering::Relaxed);
    }

    pub fn add_target(&self, n: u64) {
        self.counters.target.fetch_add(n as i64, Ordering::Relaxed);
    }

    /// Remove a finished transfer: `completed` bytes it contributed and the
    /// `n` bytes it had added to the target.
    pub fn remove_target(&self, completed: u64, n: u64) {
        self.counters
            .now
            .fetch_sub(completed as i64, Ordering::Relaxed);
        self.counters.target.fetch_sub(n as i64, Ordering::Relaxed);
    }

    /// Join this tracker as one transfer of `size` bytes.
    pub fn join(&self, size: u64) -> TransferShare {
        self.add_target(size);
        TransferShare {
            tracker: self.clone(),
            size,
            contributed: 0,
        }
    }

    pub fn now(&self) -> i64 {
        self.counters.now.load(Ordering::Relaxed)
    }

    pub fn target(&self) -> i64 {
        self.counters.target.load(Ordering::Relaxed)
    }

    pub fn fraction(&self) -> f64 {
        self.counters.fraction()
    }

    /// Stop the sampler and reset the display to idle.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl ByteSink for ProgressTracker {
    fn consume(&mut self, chunk: &[u8]) {
        self.observe(chunk.len() as u64);
    }
}

/// One transfer's stake in an aggregate tracker. Dropping it removes the
/// transfer from the aggregate, whatever the outcome.
pub struct TransferShare {
    tracker: ProgressTracker,
    size: u64,
    contributed: u64,
}

impl TransferShare {
    pub fn contributed(&self) -> u64 {
        self.contributed
    }
}

impl ByteSink for TransferShare {
    fn consume(&mut self, chunk: &[u8]) {
        let n = chunk.len() as u64;
        self.contributed += n;
        self.tracker.observe(n);
    }
}

impl Drop for TransferShare {
    fn drop(&mut self) {
        self.tracker.remove_target(self.contributed, self.size);
    }
}

async fn run_sampler(
    counters: Arc<Counters>,
    display: Arc<dyn ProgressDisplay>,
    cancel: CancellationToken,
) {
    let mut bar_tick = interval(FRACTION_INTERVAL);
    bar_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut speed_tick = interval(SPEED_INTERVAL);
    speed_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut window = SpeedWindow::new(SPEED_WINDOWS, Instant::now());
    let mut shown_fraction = f64::NAN;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                display.reset();
                return;
            }
            _ = bar_tick.tick() => {
                let fraction = counters.fraction();
                if fraction != shown_fraction {
                    display.set_fraction(fraction);
                    shown_fraction = fraction;
                }
            }
            _ = speed_tick.tick() => {
                let now = counters.now.load(Ordering::Relaxed);
                let target = counters.target.load(Ordering::Relaxed);
                let observed = counters.observed.load(Ordering::Relaxed);
                let speed = window.beat(Instant::now(), observed);
                display.set_speed_text(&format_speed_and_eta(speed, target - now));
            }
        }
    }
}

/// Ring buffer of `(timestamp, bytes)` samples. Each beat measures the
/// throughput since the oldest sample and replaces it.
#[derive(Debug)]
pub struct SpeedWindow {
    samples: Vec<(Instant, i64)>,
    turn: usize,
}

impl SpeedWindow {
    pub fn new(depth: usize, start: Instant) -> Self {
        Self {
            samples: vec![(start, 0); depth.max(1)],
            turn: 0,
        }
    }

    /// Record `bytes` at `at`; returns bytes per second over the window.
    pub fn beat(&mut self, at: Instant, bytes: i64) -> u64 {
        let (then, then_bytes) = self.samples[self.turn];
        self.samples[self.turn] = (at, bytes);
        self.turn = (self.turn + 1) % self.samples.len();

        let elapsed = at.saturating_duration_since(then).as_secs_f64();
        let delta = bytes - then_bytes;
        if elapsed <= 0.0 || delta <= 0 {
            return 0;
        }
        (delta as f64 / elapsed) as u64
    }
}

/// Base-1024 size with `precision` decimals, e.g. `1.5MB`.
pub fn format_byte_size(bytes: u64, precision: usize) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.*}{}", precision, size, UNITS[unit])
}

pub fn format_byte_speed(bytes_per_sec: u64, precision: usize) -> String {
    format!("{}/s", format_byte_size(bytes_per_sec, precision))
}

/// `1h1m1s`, `2m5s` or `7s`.
pub fn format_seconds(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = seconds % 3600 / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_eta(bytes_per_sec: u64, remaining: i64) -> String {
    if remaining <= 0 || bytes_per_sec == 0 {
        return format_seconds(0);
    }
    format_seconds(remaining as u64 / bytes_per_sec)
}

pub fn format_speed_and_eta(bytes_per_sec: u64, remaining: i64) -> String {
    format!(
        "{} t:{}",
        format_byte_speed(bytes_per_sec, 1),
        format_eta(bytes_per_sec, remaining)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        fractions: Mutex<Vec<f64>>,
        texts: Mutex<Vec<String>>,
    }

    impl ProgressDisplay for Recorded {
        fn set_fraction(&self, fraction: f64) {
            self.fractions.lock().unwrap().push(fraction);
        }

        fn set_speed_text(&self, text: &str) {
            self.texts.lock().unwrap().push(text.to_string());
        }
    }

    #[test]
    fn test_format_byte_size() {
        assert_eq!(format_byte_size(0, 1), "0.0B");
        assert_eq!(format_byte_size(1023, 1), "1023.0B");
        assert_eq!(format_byte_size(1536, 1), "1.5KB");
        assert_eq!(format_byte_size(5 * 1024 * 1024, 2), "5.00MB");
        assert_eq!(format_byte_size(u64::MAX, 1), "16.0EB");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(1000, 0), "0s");
        assert_eq!(format_eta(0, 5000), "0s");
        assert_eq!(format_eta(1, 3661), "1h1m1s");
        assert_eq!(format_eta(10, 1250), "2m5s");
        assert_eq!(format_eta(100, 700), "7s");
        assert_eq!(format_eta(100, -50), "0s");
    }

    #[test]
    fn test_speed_window_smooths_over_depth() {
        let start = Instant::now();
        let mut window = SpeedWindow::new(4, start);
        let step = Duration::from_millis(250);

        // 1000 bytes per 250ms step, i.e. 4000 B/s.
        let mut speeds = Vec::new();
        for i in 1..=8i64 {
            speeds.push(window.beat(start + step * i as u32, 1000 * i));
        }
        for speed in &speeds {
            assert!((3990..=4010).contains(speed), "speed {speed}");
        }

        // Bytes going backwards (a transfer left the aggregate) reads as idle.
        assert_eq!(window.beat(start + step * 9, 0), 0);
    }

    #[tokio::test]
    async fn test_fraction_clamped_and_idle_when_no_target() {
        let display = Arc::new(Recorded::default());
        let tracker = ProgressTracker::new(100, display.clone());
        tracker.observe(40);
        assert!((tracker.fraction() - 0.4).abs() < f64::EPSILON);
        tracker.observe(100);
        assert_eq!(tracker.fraction(), 1.0);

        let idle = ProgressTracker::aggregate(display);
        idle.observe(10);
        assert_eq!(idle.fraction(), 0.0);
        tracker.close();
        idle.close();
    }

    #[tokio::test]
    async fn test_share_removed_on_drop() {
        let tracker = ProgressTracker::aggregate(Arc::new(Recorded::default()));
        let mut small = tracker.join(100);
        let mut large = tracker.join(300);
        assert_eq!(tracker.target(), 400);

        small.consume(&[0u8; 100]);
        large.consume(&[0u8; 120]);
        assert_eq!(tracker.now(), 220);

        drop(small);
        assert_eq!(tracker.target(), 300);
        assert_eq!(tracker.now(), 120);
        assert_eq!(large.contributed(), 120);

        drop(large);
        assert_eq!(tracker.target(), 0);
        assert_eq!(tracker.now(), 0);
    }

    #[tokio::test]
    async fn test_close_resets_display() {
        let display = Arc::new(Recorded::default());
        let tracker = ProgressTracker::new(1000, display.clone());
        tracker.observe(500);
        tokio::time::sleep(Duration::from_millis(300)).await;

        tracker.close();
        assert!(tracker.is_closed());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(display.fractions.lock().unwrap().last(), Some(&0.0));
        assert_eq!(
            display.texts.lock().unwrap().last().map(String::as_str),
            Some(IDLE_SPEED_TEXT)
        );
        assert!(display.fractions.lock().unwrap().contains(&0.5));
    }

    #[tokio::test]
    async fn test_sampler_stops_when_last_clone_dropped() {
        let display = Arc::new(Recorded::default());
        let tracker = ProgressTracker::new(10, display.clone());
        let clone = tracker.clone();
        drop(tracker);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!clone.is_closed());

        drop(clone);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frames = display.texts.lock().unwrap().len();
        assert_eq!(
            display.texts.lock().unwrap().last().map(String::as_str),
            Some(IDLE_SPEED_TEXT)
        );

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(display.texts.lock().unwrap().len(), frames);
    }

    #[tokio::test]
    async fn test_speed_survives_finished_share() {
        let display = Arc::new(Recorded::default());
        let tracker = ProgressTracker::aggregate(display.clone());
        let mut done = tracker.join(50_000_000);
        let mut streaming = tracker.join(50_000_000);

        done.consume(&vec![0u8; 2_000_000]);
        for _ in 0..20 {
            streaming.consume(&[0u8; 10_000]);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(done);
        let frames_at_drop = display.texts.lock().unwrap().len();
        for _ in 0..40 {
            streaming.consume(&[0u8; 10_000]);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let texts = display.texts.lock().unwrap();
        let after_drop = &texts[frames_at_drop..];
        assert!(after_drop.len() >= 2, "{after_drop:?}");
        for text in after_drop {
            assert!(!text.starts_with("0.0B/s"), "speed reset to zero: {after_drop:?}");
        }
        drop(texts);
        tracker.close();
    }

    #[tokio::test]
    async fn test_reset_frames_wait_for_full_channel() {
        use crate::events::{LogLevel, LogLine};
        use tokio::sync::mpsc;

        let (tx, mut rx) = mpsc::channel(1);
        let reporter = EventReporter::new(tx);
        reporter.emit_now(AppEvent::Log(LogLine::new(LogLevel::Info, "backlog")));

        let tracker = ProgressTracker::new(100, EventDisplay::new(Role::Receiver, reporter));
        tracker.observe(60);
        tokio::time::sleep(Duration::from_millis(300)).await;
        tracker.close();

        let mut reset_fraction = false;
        let idle = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = rx.recv().await {
                match event {
                    AppEvent::Progress { fraction, .. } => reset_fraction = fraction == 0.0,
                    AppEvent::Speed { text, .. } if text == IDLE_SPEED_TEXT => return true,
                    _ => {}
                }
            }
            false
        })
        .await
        .expect("idle frame never delivered");

        assert!(idle);
        assert!(reset_fraction);
    }
}
