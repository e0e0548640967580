//! Scoped suppression of native-library diagnostics.
//!
//! pdfium prints parser warnings ("Object is not a stream", xref repair
//! notices) straight to file descriptor 2. They are noise for a CLI user and
//! interleave with the progress bar, so the highlight pass runs inside a
//! [`QuietStderr`] guard that points fd 2 at the null device and puts the
//! original descriptor back when dropped.
//!
//! The guard is process-wide: anything else writing to stderr on another
//! thread while it is held is silenced too. On non-unix targets it does
//! nothing.

use crate::error::SkipReason;
use crate::progress::AuditProgressCallback;
use tracing::debug;

/// Descriptors held while stderr is redirected.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
struct Redirect {
    /// Duplicate of the original fd 2.
    saved: libc::c_int,
    /// Open handle on the null device.
    null: libc::c_int,
}

/// RAII guard that silences the process stderr while alive.
pub struct QuietStderr {
    #[cfg(unix)]
    redirect: Option<Redirect>,
}

impl QuietStderr {
    /// Redirect stderr to the null device. When `enabled` is false, or the
    /// redirection fails, the guard is inert.
    pub fn new(enabled: bool) -> Self {
        #[cfg(unix)]
        {
            if !enabled {
                return Self { redirect: None };
            }
            Self {
                redirect: redirect_to_null(),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = enabled;
            Self {}
        }
    }

    /// Whether stderr is currently redirected by this guard.
    pub fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.redirect.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Give fd 2 back to the original stderr until the returned scope is
    /// dropped, then silence it again.
    pub fn unmuted(&self) -> Unmuted<'_> {
        #[cfg(unix)]
        if let Some(redirect) = self.redirect {
            // SAFETY: both descriptors are owned by the guard and outlive
            // the returned scope.
            unsafe {
                libc::dup2(redirect.saved, libc::STDERR_FILENO);
            }
        }
        Unmuted { guard: self }
    }
}

/// Scope during which a [`QuietStderr`] lets writes through.
pub struct Unmuted<'a> {
    guard: &'a QuietStderr,
}

impl Drop for Unmuted<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(redirect) = self.guard.redirect {
            // SAFETY: see `QuietStderr::unmuted`.
            unsafe {
                libc::dup2(redirect.null, libc::STDERR_FILENO);
            }
        }
        #[cfg(not(unix))]
        let _ = self.guard;
    }
}

#[cfg(unix)]
fn redirect_to_null() -> Option<Redirect> {
    // SAFETY: plain descriptor syscalls; every descriptor opened here is
    // either closed on the failure path or owned by the guard.
    unsafe {
        let null = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if null < 0 {
            debug!("Could not open /dev/null; stderr left as is");
            return None;
        }
        let saved = libc::dup(libc::STDERR_FILENO);
        if saved < 0 {
            libc::close(null);
            return None;
        }
        if libc::dup2(null, libc::STDERR_FILENO) < 0 {
            libc::close(null);
            libc::close(saved);
            return None;
        }
        Some(Redirect { saved, null })
    }
}

impl Drop for QuietStderr {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(redirect) = self.redirect.take() {
            // SAFETY: both descriptors were duplicated by this guard and are
            // owned by it.
            unsafe {
                libc::dup2(redirect.saved, libc::STDERR_FILENO);
                libc::close(redirect.saved);
                libc::close(redirect.null);
            }
        }
    }
}

/// Progress callback wrapper that lifts a [`QuietStderr`] around every
/// event, so a terminal progress bar keeps drawing while pdfium is silenced.
pub struct UnmutedProgress<'a> {
    inner: &'a dyn AuditProgressCallback,
    quiet: &'a QuietStderr,
}

impl<'a> UnmutedProgress<'a> {
    pub fn new(inner: &'a dyn AuditProgressCallback, quiet: &'a QuietStderr) -> Self {
        Self { inner, quiet }
    }
}

impl AuditProgressCallback for UnmutedProgress<'_> {
    fn on_model_start(&self, tag: &str, model: &str) {
        let _loud = self.quiet.unmuted();
        self.inner.on_model_start(tag, model);
    }

    fn on_model_complete(&self, tag: &str, model: &str, findings: usize) {
        let _loud = self.quiet.unmuted();
        self.inner.on_model_complete(tag, model, findings);
    }

    fn on_highlight_start(&self, total: usize) {
        let _loud = self.quiet.unmuted();
        self.inner.on_highlight_start(total);
    }

    fn on_finding_annotated(&self, index: usize, total: usize, rects: usize) {
        let _loud = self.quiet.unmuted();
        self.inner.on_finding_annotated(index, total, rects);
    }

    fn on_finding_skipped(&self, index: usize, total: usize, reason: &SkipReason) {
        let _loud = self.quiet.unmuted();
        self.inner.on_finding_skipped(index, total, reason);
    }

    fn on_highlight_complete(&self, annotated: usize, total: usize) {
        let _loud = self.quiet.unmuted();
        self.inner.on_highlight_complete(annotated, total);
    }
}
