//! Progress reporting for long-running algorithms.
//!
//! This module provides a simple progress callback mechanism that algorithms
//! can use to report their progress to callers, plus an optional abort hook
//! that lets the caller stop an algorithm early. An aborted algorithm still
//! leaves a valid mesh behind: it stops between two complete operations and
//! runs its regular clean-up.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! use hemesh::algo::progress::Progress;
//! use hemesh::algo::remesh::RemeshOptions;
//!
//! let cancel = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&cancel);
//!
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! })
//! .with_abort(move || flag.load(Ordering::Relaxed));
//!
//! // Pass to algorithm options
//! let options = RemeshOptions::uniform(0.1).with_progress(progress);
//! assert!(!options.progress.is_aborted());
//! cancel.store(true, Ordering::Relaxed);
//! assert!(options.progress.is_aborted());
//! ```

use std::sync::Arc;

type Callback = dyn Fn(usize, usize, &str) + Send + Sync;
type AbortHook = dyn Fn() -> bool + Send + Sync;

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives:
/// - `current`: Current step (0-based)
/// - `total`: Total number of steps
/// - `message`: Description of the current operation
///
/// Cloning is cheap: clones share the same callback and abort hook.
#[derive(Clone)]
pub struct Progress {
    callback: Arc<Callback>,
    abort: Option<Arc<AbortHook>>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            abort: None,
        }
    }

    /// Attach an abort hook. Algorithms poll it between steps and stop once
    /// it returns `true`.
    pub fn with_abort<F>(mut self, abort: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.abort = Some(Arc::new(abort));
        self
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress within a sub-range.
    ///
    /// Maps progress from `[0, sub_total]` to `[range_current, range_current + 1]`
    /// within a total of `range_total` steps. This enables hierarchical progress
    /// where sub-operations report their progress within an allocated slice.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        range_current: usize,
        range_total: usize,
        message: &str,
    ) {
        if sub_total == 0 || range_total == 0 {
            return;
        }
        // Fixed-point with three decimal digits
        let sub_fraction = (sub_current * 1000) / sub_total;
        let effective = range_current * 1000 + sub_fraction;
        let total_scaled = range_total * 1000;
        (self.callback)(effective, total_scaled, message);
    }

    /// True once the abort hook asks to stop.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|abort| abort())
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("abortable", &self.abort.is_some())
            .finish_non_exhaustive()
    }
}
