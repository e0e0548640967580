//! Progress-callback trait for audit events.
//!
//! Inject an [`Arc<dyn AuditProgressCallback>`] via
//! [`crate::config::AuditConfigBuilder::progress_callback`] to receive events
//! as the model calls finish and as each finding is placed on the page.
//!
//! # Example
//!
//! ```rust
//! use pdf_audit::{AuditConfig, AuditProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     annotated: AtomicUsize,
//! }
//!
//! impl AuditProgressCallback for CountingCallback {
//!     fn on_finding_annotated(&self, index: usize, total: usize, rects: usize) {
//!         self.annotated.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Finding {}/{}: {} highlights", index + 1, total, rects);
//!     }
//! }
//!
//! let config = AuditConfig::builder()
//!     .reference_document("rbi_master_circular.pdf")
//!     .progress_callback(Arc::new(CountingCallback { annotated: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::SkipReason;
use std::sync::Arc;

/// Called by the audit pipeline as it runs.
///
/// Implementations must be `Send + Sync`: model events may arrive from two
/// concurrent tasks, and highlight events arrive from a blocking worker
/// thread. Every method defaults to a no-op.
pub trait AuditProgressCallback: Send + Sync {
    /// A model call is about to be issued.
    fn on_model_start(&self, tag: &str, model: &str) {
        let _ = (tag, model);
    }

    /// A model answered with `findings` parsed records.
    fn on_model_complete(&self, tag: &str, model: &str, findings: usize) {
        let _ = (tag, model, findings);
    }

    /// The highlight pass is starting over `total` merged findings.
    fn on_highlight_start(&self, total: usize) {
        let _ = total;
    }

    /// Finding `index` (0-based) received `rects` highlights.
    fn on_finding_annotated(&self, index: usize, total: usize, rects: usize) {
        let _ = (index, total, rects);
    }

    /// Finding `index` (0-based) was skipped.
    fn on_finding_skipped(&self, index: usize, total: usize, reason: &SkipReason) {
        let _ = (index, total, reason);
    }

    /// The highlight pass finished; `annotated` of `total` findings were placed.
    fn on_highlight_complete(&self, annotated: usize, total: usize) {
        let _ = (annotated, total);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl AuditProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AuditConfig`].
pub type ProgressCallback = Arc<dyn AuditProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        annotated: AtomicUsize,
        skipped: AtomicUsize,
        models: AtomicUsize,
    }

    impl AuditProgressCallback for TrackingCallback {
        fn on_model_complete(&self, _tag: &str, _model: &str, _findings: usize) {
            self.models.fetch_add(1, Ordering::SeqCst);
        }

        fn on_finding_annotated(&self, _index: usize, _total: usize, _rects: usize) {
            self.annotated.fetch_add(1, Ordering::SeqCst);
        }

        fn on_finding_skipped(&self, _index: usize, _total: usize, _reason: &SkipReason) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_model_start("model_1", "gemini-2.5-pro");
        cb.on_highlight_start(2);
        cb.on_finding_skipped(0, 2, &SkipReason::EmptyPhrase);
        cb.on_highlight_complete(0, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_model_complete("model_1", "m", 4);
        cb.on_model_complete("model_2", "m", 1);
        cb.on_finding_annotated(0, 3, 2);
        cb.on_finding_skipped(1, 3, &SkipReason::NotLocated { page: 1 });
        cb.on_finding_annotated(2, 3, 1);

        assert_eq!(tracker.models.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.annotated.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
    }
}
