//! Emergency-stop plumbing between the monitoring surface and the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use systemx_core::{EmergencyStopRequest, StopActor};

/// Cloneable handle that requests a full halt of the control core.
///
/// The first trigger wins; every later call is acknowledged as a no-op so the
/// dashboard can mash the button without producing duplicate halts. The
/// scheduler consumes the request exactly once.
#[derive(Clone)]
pub struct EmergencyStopHandle {
    pending: Arc<AtomicBool>,
    tx: mpsc::Sender<EmergencyStopRequest>,
}

impl EmergencyStopHandle {
    pub(crate) fn new(pending: Arc<AtomicBool>, tx: mpsc::Sender<EmergencyStopRequest>) -> Self {
        Self { pending, tx }
    }

    /// Request a halt. Returns true when this call initiated the stop, false
    /// when a stop was already pending.
    pub fn trigger(&self, reason: impl Into<String>, actor: StopActor) -> bool {
        if self.pending.swap(true, Ordering::SeqCst) {
            return false;
        }

        let request = EmergencyStopRequest::new(reason, actor);
        warn!(
            actor = ?request.actor,
            reason = %request.reason,
            "EMERGENCY STOP requested"
        );
        // Capacity 1 and guarded by the swap above, so this cannot be full.
        let _ = self.tx.try_send(request);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}
