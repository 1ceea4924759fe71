//! Bridge from a string-level controller transport to [`ControllerPort`].

use std::fmt;

use crate::domain::ExportError;
use crate::ports::ControllerPort;

type Transport = dyn Fn(&str, bool) -> Result<String, String> + Send + Sync;

/// Wraps the node's raw controller call. Transport errors are returned
/// unchanged as [`ExportError::Controller`].
pub struct JsonControllerBridge {
    transport: Box<Transport>,
}

impl JsonControllerBridge {
    pub fn new<F>(transport: F) -> Self
    where
        F: Fn(&str, bool) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            transport: Box::new(transport),
        }
    }
}

impl fmt::Debug for JsonControllerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonControllerBridge").finish_non_exhaustive()
    }
}

impl ControllerPort for JsonControllerBridge {
    fn blocking_send(&self, action: &str, must_not_be_initialized: bool) -> Result<String, ExportError> {
        tracing::trace!(action, must_not_be_initialized, "sending controller action");
        (self.transport)(action, must_not_be_initialized).map_err(|e| {
            tracing::debug!(error = %e, "controller action failed");
            ExportError::Controller(e)
        })
    }
}
