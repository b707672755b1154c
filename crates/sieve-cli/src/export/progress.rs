use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Progress and cancellation sink driven by long-running exports
pub trait WaitingHandler {
    fn set_indeterminate(&self, _indeterminate: bool) {}

    fn increment(&self) {}

    /// Queried at least once per top-level entity
    fn is_canceled(&self) -> bool {
        false
    }
}

/// Never reports, never cancels
impl WaitingHandler for () {}

/// Logs progress every 10% of `total`, and can be canceled from another thread
pub struct LogProgress {
    label: String,
    total: usize,
    count: AtomicUsize,
    indeterminate: AtomicBool,
    canceled: AtomicBool,
}

impl LogProgress {
    pub fn new<S: Into<String>>(label: S, total: usize) -> Self {
        Self {
            label: label.into(),
            total,
            count: AtomicUsize::default(),
            indeterminate: AtomicBool::default(),
            canceled: AtomicBool::default(),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl WaitingHandler for LogProgress {
    fn set_indeterminate(&self, indeterminate: bool) {
        self.indeterminate.store(indeterminate, Ordering::Relaxed);
    }

    fn increment(&self) {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.indeterminate.load(Ordering::Relaxed) || self.total < 10 {
            return;
        }
        let step = self.total / 10;
        if count % step == 0 {
            log::debug!(
                "{}: {}% ({}/{})",
                self.label,
                100 * count / self.total,
                count,
                self.total
            );
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}
