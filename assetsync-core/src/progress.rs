use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

/// Counters for a run, optionally logged from a background thread.
#[derive(Clone)]
pub struct Progress {
    interval: Duration,
    stage: &'static str,
    pub entries_done: Arc<AtomicU64>,
    pub entries_total: Arc<AtomicU64>,
    pub bytes_done: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl Progress {
    /// `interval == 0` disables the reporter thread; counters still work.
    pub fn new(stage: &'static str, interval: Duration) -> Self {
        Self {
            interval,
            stage,
            entries_done: Arc::new(AtomicU64::new(0)),
            entries_total: Arc::new(AtomicU64::new(0)),
            bytes_done: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_total(&self, n: u64) {
        self.entries_total.store(n, Ordering::Relaxed);
    }
    pub fn inc_entry(&self) {
        self.entries_done.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_bytes(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::Relaxed);
    }
    pub fn entries_done(&self) -> u64 {
        self.entries_done.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the reporter thread. It runs until the returned guard is dropped.
    #[must_use = "the reporter stops when the guard is dropped"]
    pub fn start(&self) -> Reporter {
        let guard = Reporter(self.running.clone());
        if self.interval.is_zero() {
            return guard;
        }
        self.running.store(true, Ordering::Relaxed);
        let this = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            while this.running.load(Ordering::Relaxed) {
                thread::sleep(this.interval);
                if !this.running.load(Ordering::Relaxed) {
                    break;
                }
                let done = this.entries_done.load(Ordering::Relaxed);
                let total = this.entries_total.load(Ordering::Relaxed);
                let pct = if total > 0 { done as f64 / total as f64 * 100.0 } else { 0.0 };
                tracing::info!(
                    stage = this.stage,
                    elapsed_s = t0.elapsed().as_secs(),
                    done,
                    total,
                    bytes = this.bytes_done.load(Ordering::Relaxed),
                    "{} {:.0}%",
                    this.stage,
                    pct
                );
            }
        });
        guard
    }
}

/// Stops the reporter thread on drop, including early returns.
pub struct Reporter(Arc<AtomicBool>);

impl Drop for Reporter {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
