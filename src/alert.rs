/// Operator alert for documents that need manual signing
///
/// Some document types are excluded from automatic signing. While any of
/// them is pending the operator must be nudged; once none are left the
/// nudge is withdrawn.
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Persistent alert that is raised or cleared once per polling cycle
pub trait AlertSink: Send + Sync {
    /// Documents need manual action
    fn raise(&self, pending: usize);

    /// No document needs manual action
    fn clear(&self);
}

/// Alert that reports state changes through the log
#[derive(Debug, Default)]
pub struct LogAlert {
    active: AtomicBool,
}

impl LogAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl AlertSink for LogAlert {
    fn raise(&self, pending: usize) {
        if !self.active.swap(true, Ordering::SeqCst) {
            warn!("Manual signing required: {} document(s) pending", pending);
        }
    }

    fn clear(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("No documents waiting for manual signing");
        }
    }
}
