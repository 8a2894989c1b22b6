//! Capability-gated update dispatch.
//!
//! Every update first tries the fast path for the indicator's kind. A fast
//! path checks its own preconditions and reports `false` without touching the
//! indicator when one of them does not hold; the update then goes through the
//! host reference implementation instead, with any device-resident buffers
//! pulled to the host for the duration of the call.

mod ema;
mod rsi;
mod sma;

use crate::{
    accel::{
        same_device, Accelerator, DeviceArray, Kernel, KernelArg, LaunchConfig, Residency,
    },
    capability::Capability,
    config::EngineConfig,
    error::Result,
    indicators::{Indicator, Reference},
    sample::Sample,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub fast_path: u64,
    pub fallback: u64,
}

pub struct Engine {
    capability: Capability,
    config: EngineConfig,
    // Output slot for scalar kernels.
    scratch: Mutex<Option<DeviceArray>>,
    fast_path: AtomicU64,
    fallback: AtomicU64,
}

impl Engine {
    pub fn new(capability: Capability) -> Self {
        Self::with_config(capability, EngineConfig::default())
    }

    pub fn with_config(capability: Capability, config: EngineConfig) -> Self {
        let capability = if config.memoize_unavailable {
            capability.memoize_unavailable(true)
        } else {
            capability
        };
        Self {
            capability,
            config,
            scratch: Mutex::new(None),
            fast_path: AtomicU64::new(0),
            fallback: AtomicU64::new(0),
        }
    }

    pub fn host_only() -> Self {
        Self::new(Capability::none())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Whether updates would currently be accelerated. For diagnostics only;
    /// `update` behaves the same either way apart from speed.
    pub fn is_accelerated(&self) -> bool {
        self.device().is_some()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            fast_path: self.fast_path.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
        }
    }

    /// Feeds one sample to `indicator` and returns its value afterwards.
    pub fn update<'a>(
        &self,
        indicator: &mut Indicator,
        sample: impl Into<Sample<'a>>,
    ) -> Result<f64> {
        let price = sample.into().to_f64()?;
        self.dispatch(indicator, price)?;
        Ok(indicator.value())
    }

    /// Moves every buffer of `indicator` to `residency`. Device placement
    /// without a functional accelerator leaves the buffers where they are.
    /// Returns the residency the indicator ends up with.
    pub fn place(&self, indicator: &mut Indicator, residency: Residency) -> Result<Residency> {
        match (residency, self.device()) {
            (Residency::Host, _) => {
                for buffer in indicator.buffers_mut() {
                    buffer.to_host()?;
                }
            }
            (Residency::Device, Some(device)) => {
                for buffer in indicator.buffers_mut() {
                    buffer.to_device(device)?;
                }
            }
            (Residency::Device, None) => {
                debug!(
                    kind = ?indicator.kind(),
                    "no functional accelerator; buffers stay where they are"
                );
            }
        }
        Ok(indicator.residency().unwrap_or(Residency::Host))
    }

    pub fn place_default(&self, indicator: &mut Indicator) -> Result<Residency> {
        self.place(indicator, self.config.placement)
    }

    fn device(&self) -> Option<&Arc<dyn Accelerator>> {
        if !self.config.accelerate {
            return None;
        }
        self.capability.functional()
    }

    pub(crate) fn dispatch(&self, indicator: &mut Indicator, price: f64) -> Result<()> {
        let kind = indicator.kind();
        if let Some(device) = self.device() {
            let handled = match indicator {
                Indicator::Sma(indicator) => sma::try_update(indicator, device, price)?,
                Indicator::Ema(indicator) => ema::try_update(self, indicator, device, price)?,
                Indicator::Rsi(indicator) => rsi::try_update(self, indicator, device, price)?,
                Indicator::Other(_) => false,
            };
            if handled {
                self.fast_path.fetch_add(1, Ordering::Relaxed);
                trace!(?kind, price, "fast path");
                return Ok(());
            }
        }
        trace!(?kind, price, "fallback");
        self.fallback(indicator, price)
    }

    fn fallback(&self, indicator: &mut Indicator, price: f64) -> Result<()> {
        let mut homes = Vec::new();
        let mut relocated = Ok(());
        for (i, buffer) in indicator.buffers_mut().into_iter().enumerate() {
            match buffer.to_host() {
                Ok(Some(device)) => homes.push((i, device)),
                Ok(None) => {}
                Err(err) => {
                    relocated = Err(err);
                    break;
                }
            }
        }

        let result = relocated.and_then(|()| indicator.update(price));
        if result.is_ok() {
            self.fallback.fetch_add(1, Ordering::Relaxed);
        }

        // Buffers go back even when relocation or the update failed.
        if !homes.is_empty() {
            let mut buffers = indicator.buffers_mut();
            for (i, device) in homes {
                if let Some(buffer) = buffers.get_mut(i) {
                    // A buffer that cannot be pushed back stays valid on the
                    // host.
                    if let Err(err) = buffer.to_device(&device) {
                        warn!(device = device.name(), %err, "buffer left on host");
                    }
                }
            }
        }
        result
    }

    /// Runs a scalar kernel whose first argument is a one-element output
    /// array, and reads the result back.
    pub(crate) fn launch_scalar(
        &self,
        device: &Arc<dyn Accelerator>,
        kernel: Kernel,
        params: &[f64],
    ) -> Result<f64> {
        let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match scratch.take() {
            Some(slot) if same_device(slot.device(), device) => slot,
            _ => DeviceArray::zeroed(device, 1)?,
        };
        let slot = scratch.insert(slot);

        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(KernelArg::Array(slot.id()));
        args.extend(params.iter().map(|&p| KernelArg::Scalar(p)));
        device.launch(kernel, LaunchConfig::single(), &args)?;

        let mut out = [0.0];
        slot.copy_to(&mut out)?;
        Ok(out[0])
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("capability", &self.capability)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Whether a buffer can be driven by `device`: host storage always can,
/// device storage only when it lives on that device.
fn reachable(buffer: &crate::buffer::CircularBuffer, device: &Arc<dyn Accelerator>) -> bool {
    match buffer.device() {
        Some(resident) => same_device(resident, device),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accel::EmulatedDevice, indicators::Smma};

    fn engine() -> (Arc<EmulatedDevice>, Engine) {
        let emulated = Arc::new(EmulatedDevice::new("test"));
        let engine = Engine::new(Capability::new(emulated.clone()));
        (emulated, engine)
    }

    #[test]
    fn test_host_only_engine_uses_fallback() {
        let engine = Engine::host_only();
        assert!(!engine.is_accelerated());
        let mut sma = Indicator::sma(2).unwrap();
        assert_eq!(engine.update(&mut sma, 4).unwrap(), 4.0);
        assert_eq!(engine.update(&mut sma, 6.0f32).unwrap(), 5.0);
        assert_eq!(
            engine.stats(),
            EngineStats {
                fast_path: 0,
                fallback: 2,
            }
        );
    }

    #[test]
    fn test_accelerate_flag_forces_fallback() {
        let emulated = Arc::new(EmulatedDevice::new("test"));
        let config = EngineConfig {
            accelerate: false,
            ..EngineConfig::default()
        };
        let engine = Engine::with_config(Capability::new(emulated.clone()), config);
        assert!(!engine.is_accelerated());
        let mut sma = Indicator::sma(2).unwrap();
        assert_eq!(engine.place_default(&mut sma).unwrap(), Residency::Host);
        engine.update(&mut sma, 1.0).unwrap();
        assert_eq!(engine.stats().fast_path, 0);
        assert_eq!(emulated.stats().launches, 0);
    }

    #[test]
    fn test_place_moves_every_buffer() {
        let (emulated, engine) = engine();
        let mut rsi = Indicator::rsi(3).unwrap();
        assert_eq!(engine.place(&mut rsi, Residency::Device).unwrap(), Residency::Device);
        // Two buffers, each with a data array and a slot.
        assert_eq!(emulated.live_arrays(), 4);
        assert_eq!(engine.place(&mut rsi, Residency::Host).unwrap(), Residency::Host);
        assert_eq!(emulated.live_arrays(), 0);
    }

    #[test]
    fn test_place_on_device_without_accelerator_keeps_host() {
        let engine = Engine::host_only();
        let mut ema = Indicator::ema(3).unwrap();
        assert_eq!(engine.place(&mut ema, Residency::Device).unwrap(), Residency::Host);
    }

    #[test]
    fn test_other_kind_fallback_keeps_residency() {
        let (emulated, engine) = engine();
        let mut smma = Indicator::other(Smma::new(2).unwrap());
        engine.place(&mut smma, Residency::Device).unwrap();
        for price in [1.0, 3.0, 5.0] {
            engine.update(&mut smma, price).unwrap();
        }
        assert_eq!(smma.value(), 3.5);
        assert_eq!(smma.residency(), Some(Residency::Device));
        assert_eq!(engine.stats().fast_path, 0);
        assert_eq!(emulated.stats().launches, 0);
    }

    #[test]
    fn test_fallback_push_back_failure_leaves_buffer_on_host() {
        let (emulated, engine) = engine();
        let mut smma = Indicator::other(Smma::new(2).unwrap());
        engine.place(&mut smma, Residency::Device).unwrap();
        emulated.inject(crate::accel::Fault::Upload);
        assert!(engine.update(&mut smma, 2.0).unwrap().is_nan());
        assert_eq!(smma.residency(), Some(Residency::Host));
        engine.update(&mut smma, 4.0).unwrap();
        assert_eq!(smma.value(), 3.0);
    }

    #[test]
    fn test_failed_relocation_restores_earlier_buffers() {
        let (primary, engine) = engine();
        let primary: Arc<dyn Accelerator> = primary;
        let secondary = Arc::new(EmulatedDevice::new("secondary"));
        let secondary_dyn: Arc<dyn Accelerator> = secondary.clone();

        let mut rsi = Indicator::rsi(3).unwrap();
        if let Indicator::Rsi(inner) = &mut rsi {
            inner.mean_up.buffers_mut()[0].to_device(&primary).unwrap();
            inner.mean_down.buffers_mut()[0].to_device(&secondary_dyn).unwrap();
        }
        secondary.inject(crate::accel::Fault::Download);

        assert!(engine.update(&mut rsi, 1.0).is_err());
        assert_eq!(engine.stats().fallback, 0);
        let buffers = rsi.buffers_mut();
        assert_eq!(buffers[0].residency(), Residency::Device);
        assert!(same_device(buffers[0].device().unwrap(), &primary));
        assert_eq!(buffers[1].residency(), Residency::Device);
        assert_eq!(buffers[1].len(), 0);
    }

    #[test]
    fn test_launch_scalar_reuses_slot() {
        let (emulated, engine) = engine();
        let device: Arc<dyn Accelerator> = emulated.clone();
        let value = engine
            .launch_scalar(&device, Kernel::RsiRatio, &[1.0, 1.0])
            .unwrap();
        assert_eq!(value, 50.0);
        engine
            .launch_scalar(&device, Kernel::EmaStep, &[1.0, 1.0, 0.5])
            .unwrap();
        assert_eq!(emulated.live_arrays(), 1);
        assert_eq!(emulated.stats().uploads, 1);
    }
}
