use crate::accel::Accelerator;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::warn;

/// Owner-provided handle to the accelerator runtime.
///
/// A positive check is never cached: the device is asked on every call. When
/// `memoize_unavailable` is set, the first negative answer sticks for the
/// lifetime of this provider.
pub struct Capability {
    accelerator: Option<Arc<dyn Accelerator>>,
    memoize_unavailable: bool,
    unavailable: OnceCell<()>,
}

impl Capability {
    pub fn none() -> Self {
        Self {
            accelerator: None,
            memoize_unavailable: false,
            unavailable: OnceCell::new(),
        }
    }

    pub fn new(accelerator: Arc<dyn Accelerator>) -> Self {
        Self {
            accelerator: Some(accelerator),
            ..Self::none()
        }
    }

    pub fn memoize_unavailable(mut self, memoize: bool) -> Self {
        self.memoize_unavailable = memoize;
        self
    }

    pub fn accelerator(&self) -> Option<&Arc<dyn Accelerator>> {
        self.accelerator.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.functional().is_some()
    }

    /// The accelerator, if it is functional right now.
    pub fn functional(&self) -> Option<&Arc<dyn Accelerator>> {
        let accelerator = self.accelerator.as_ref()?;
        if self.unavailable.get().is_some() {
            return None;
        }
        if accelerator.is_functional() {
            return Some(accelerator);
        }
        if self.memoize_unavailable && self.unavailable.set(()).is_ok() {
            warn!(
                device = accelerator.name(),
                "accelerator not functional; using host path for the rest of the run"
            );
        }
        None
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("accelerator", &self.accelerator)
            .field("memoize_unavailable", &self.memoize_unavailable)
            .field("memoized", &self.unavailable.get().is_some())
            .finish()
    }
}
