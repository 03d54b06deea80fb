//! Progress reporting for training runs.
//!
//! The trainer pushes one [`ProgressInfo`] per iteration into a
//! [`ProgressTracker`], which fans it out to its callbacks. A callback can
//! ask the run to stop through [`ProgressCallback::should_stop`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot of one training iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// 1-based count of completed iterations.
    pub iteration: usize,
    pub total_iterations: Option<usize>,
    /// Sum of the left and right losses.
    pub loss: f64,
    pub loss_left: f64,
    pub loss_right: f64,
    pub learning_rate: f64,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
}

impl ProgressInfo {
    pub fn new(
        iteration: usize,
        total_iterations: Option<usize>,
        loss: f64,
        elapsed: Duration,
        learning_rate: f64,
    ) -> Self {
        Self {
            iteration,
            total_iterations,
            loss,
            loss_left: loss / 2.0,
            loss_right: loss / 2.0,
            learning_rate,
            elapsed,
            estimated_remaining: None,
        }
    }

    pub fn with_view_losses(mut self, left: f64, right: f64) -> Self {
        self.loss_left = left;
        self.loss_right = right;
        self
    }

    pub fn progress_percent(&self) -> Option<f64> {
        self.total_iterations
            .filter(|&total| total > 0)
            .map(|total| self.iteration as f64 / total as f64 * 100.0)
    }

    /// Linear extrapolation of the time per iteration so far.
    pub fn calculate_remaining(&mut self) {
        if let (Some(total), true) = (self.total_iterations, self.iteration > 0) {
            let per_iteration = self.elapsed.as_secs_f64() / self.iteration as f64;
            let remaining = total.saturating_sub(self.iteration) as f64;
            self.estimated_remaining = Some(Duration::from_secs_f64(per_iteration * remaining));
        }
    }
}

/// Observer of a training run.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self) {}

    fn on_complete(&self, _info: &ProgressInfo) {}

    fn on_error(&self, _error: &str) {}

    /// Request an early end of the run.
    fn should_stop(&self) -> bool {
        false
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Logs every `log_interval` iterations through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 100 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }

    pub fn log_interval(&self) -> usize {
        self.log_interval
    }

    /// True on every `log_interval`-th iteration and on the last one.
    pub fn should_log(&self, info: &ProgressInfo) -> bool {
        info.total_iterations == Some(info.iteration)
            || info.iteration.checked_rem(self.log_interval).map_or(true, |r| r == 0)
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if !self.should_log(info) {
            return;
        }
        let eta = info
            .estimated_remaining
            .map(|d| format!("{:.1}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());
        tracing::info!(
            "Iter {}/{} ({:.1}%) | Loss: {:.6} (L {:.6}, R {:.6}) | LR: {:.2e} | Elapsed: {:.1}s | ETA: {}",
            info.iteration,
            info.total_iterations.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
            info.progress_percent().unwrap_or(0.0),
            info.loss,
            info.loss_left,
            info.loss_right,
            info.learning_rate,
            info.elapsed.as_secs_f64(),
            eta
        );
    }

    fn on_start(&self) {
        tracing::info!("Training started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "Training finished after {} iterations in {:.1}s, final loss {:.6}",
            info.iteration,
            info.elapsed.as_secs_f64(),
            info.loss
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Training failed: {}", error);
    }
}

/// Records every iteration.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    pub fn losses(&self) -> Vec<f64> {
        lock(&self.history).iter().map(|info| info.loss).collect()
    }

    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }
}

#[derive(Debug)]
struct EarlyStoppingState {
    best_loss: f64,
    stale: usize,
    stop: bool,
}

impl Default for EarlyStoppingState {
    fn default() -> Self {
        Self {
            best_loss: f64::INFINITY,
            stale: 0,
            stop: false,
        }
    }
}

/// Stops when the loss has not improved by `min_improvement` for
/// `patience` iterations, or once it falls to `min_loss`.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    pub min_improvement: f64,
    pub patience: usize,
    pub min_loss: Option<f64>,
    state: Arc<Mutex<EarlyStoppingState>>,
}

impl EarlyStoppingCallback {
    pub fn new(min_improvement: f64, patience: usize) -> Self {
        Self {
            min_improvement,
            patience,
            min_loss: None,
            state: Arc::default(),
        }
    }

    pub fn with_min_loss(mut self, min_loss: f64) -> Self {
        self.min_loss = Some(min_loss);
        self
    }

    pub fn reset(&self) {
        *lock(&self.state) = EarlyStoppingState::default();
    }
}

impl ProgressCallback for EarlyStoppingCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        let mut state = lock(&self.state);
        if state.stop {
            return;
        }

        if self.min_loss.is_some_and(|min| info.loss <= min) {
            state.stop = true;
            tracing::info!("Early stopping: loss {:.6} reached the threshold", info.loss);
            return;
        }

        if state.best_loss - info.loss > self.min_improvement {
            state.best_loss = info.loss;
            state.stale = 0;
        } else {
            state.stale += 1;
        }

        if state.stale >= self.patience {
            state.stop = true;
            tracing::info!(
                "Early stopping: no improvement for {} iterations (best {:.6}, current {:.6})",
                self.patience,
                state.best_loss,
                info.loss
            );
        }
    }

    fn should_stop(&self) -> bool {
        lock(&self.state).stop
    }
}

/// Fans progress out to a set of callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    pub fn start(&self) {
        *lock(&self.start_time) = Some(Instant::now());
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.start_time).map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// Time-stamp `info`, estimate the remaining time and notify.
    pub fn update(&self, mut info: ProgressInfo) {
        info.elapsed = self.elapsed();
        info.calculate_remaining();
        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
    }

    pub fn complete(&self, mut info: ProgressInfo) {
        info.elapsed = self.elapsed();
        info.estimated_remaining = None;
        for callback in &self.callbacks {
            callback.on_complete(&info);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }

    pub fn should_stop(&self) -> bool {
        self.callbacks.iter().any(|callback| callback.should_stop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(iteration: usize, loss: f64) -> ProgressInfo {
        ProgressInfo::new(iteration, Some(10), loss, Duration::ZERO, 0.01)
    }

    #[test]
    fn test_progress_info() {
        let mut info = ProgressInfo::new(10, Some(100), 0.5, Duration::from_secs(10), 0.01);
        assert_eq!(info.progress_percent(), Some(10.0));
        info.calculate_remaining();
        assert_eq!(info.estimated_remaining, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_early_stopping_patience() {
        let callback = EarlyStoppingCallback::new(0.01, 3);
        for (i, loss) in [1.0, 0.9, 0.8].into_iter().enumerate() {
            callback.on_progress(&info(i + 1, loss));
        }
        assert!(!callback.should_stop());

        for i in 4..=6 {
            callback.on_progress(&info(i, 0.8));
        }
        assert!(callback.should_stop());

        callback.reset();
        assert!(!callback.should_stop());
    }

    #[test]
    fn test_early_stopping_threshold() {
        let callback = EarlyStoppingCallback::new(0.0, 100).with_min_loss(0.1);
        callback.on_progress(&info(1, 0.5));
        assert!(!callback.should_stop());
        callback.on_progress(&info(2, 0.05));
        assert!(callback.should_stop());
    }

    #[test]
    fn test_console_log_interval() {
        let console = ConsoleProgressCallback::new(0);
        assert_eq!(console.log_interval(), 1);
        assert!(console.should_log(&info(3, 0.5)));

        let console = ConsoleProgressCallback::new(4);
        assert!(!console.should_log(&info(3, 0.5)));
        assert!(console.should_log(&info(8, 0.5)));
        // The last iteration is always logged.
        assert!(console.should_log(&info(10, 0.5)));
        console.on_progress(&info(3, 0.5));
    }

    #[test]
    fn test_tracker_fans_out() {
        let history = Arc::new(HistoryCallback::new());
        let stopper = Arc::new(EarlyStoppingCallback::new(0.0, 1));
        let tracker = ProgressTracker::new()
            .with_callback(history.clone())
            .with_callback(Arc::new(ConsoleProgressCallback::new(1)))
            .with_callback(stopper);

        tracker.start();
        tracker.update(info(1, 0.5).with_view_losses(0.2, 0.3));
        assert!(!tracker.should_stop());
        tracker.update(info(2, 0.5));
        assert!(tracker.should_stop());
        tracker.complete(info(2, 0.5));

        assert_eq!(history.losses(), vec![0.5, 0.5]);
        assert_eq!(history.history()[0].loss_left, 0.2);
    }
}
