use super::Engine;
use crate::{
    accel::{Accelerator, Kernel},
    error::Result,
    indicators::{split, Reference, Rsi},
};
use std::sync::Arc;

/// Steady-state RSI update. The two averages go back through the engine, so
/// each picks its own path; only the final ratio is computed here.
pub(super) fn try_update(
    engine: &Engine,
    rsi: &mut Rsi,
    device: &Arc<dyn Accelerator>,
    price: f64,
) -> Result<bool> {
    if rsi.warming_up() {
        return Ok(false);
    }

    let (up, down) = split(price - rsi.last_price);
    engine.dispatch(&mut rsi.mean_up, up)?;
    engine.dispatch(&mut rsi.mean_down, down)?;

    let value = engine.launch_scalar(
        device,
        Kernel::RsiRatio,
        &[rsi.mean_up.value(), rsi.mean_down.value()],
    )?;
    rsi.value = value;
    rsi.last_price = price;
    rsi.n += 1;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::{
        accel::{EmulatedDevice, Residency},
        capability::Capability,
        engine::Engine,
        indicators::{Indicator, Reference},
    };
    use std::sync::Arc;

    fn setup() -> (Arc<EmulatedDevice>, Engine) {
        let emulated = Arc::new(EmulatedDevice::new("test"));
        let engine = Engine::new(Capability::new(emulated.clone()));
        (emulated, engine)
    }

    #[test]
    fn test_sub_indicators_go_through_dispatcher() {
        let (_, engine) = setup();
        let mut rsi = Indicator::rsi(2).unwrap();
        engine.place(&mut rsi, Residency::Device).unwrap();

        // n = 0 and n = 1 are warm-up; the first only records the price.
        engine.update(&mut rsi, 10.0).unwrap();
        engine.update(&mut rsi, 11.0).unwrap();
        let after_warm_up = engine.stats();
        assert_eq!(after_warm_up.fast_path, 0);
        // Warm-up runs the RSI's host reference, which updates the averages
        // directly rather than through the engine.
        assert_eq!(after_warm_up.fallback, 2);

        // n == 2: fast path for the RSI; the averages finish their own warm-up
        // on the host.
        assert_eq!(engine.update(&mut rsi, 10.0).unwrap(), 50.0);
        let stats = engine.stats();
        assert_eq!(stats.fast_path, 1);
        assert_eq!(stats.fallback, 4);

        // Everything is steady state now.
        engine.update(&mut rsi, 12.0).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.fast_path, 4);
        assert_eq!(stats.fallback, 4);
        assert_eq!(rsi.residency(), Some(Residency::Device));
    }

    #[test]
    fn test_increasing_prices_report_exactly_100() {
        let (_, engine) = setup();
        let mut rsi = Indicator::rsi(4).unwrap();
        engine.place(&mut rsi, Residency::Device).unwrap();
        let mut value = f64::NAN;
        for i in 0..40 {
            value = engine.update(&mut rsi, 100.0 + f64::from(i) * 0.5).unwrap();
        }
        assert_eq!(value, 100.0);
    }

    #[test]
    fn test_decreasing_prices_converge_to_zero() {
        let (_, engine) = setup();
        let mut rsi = Indicator::rsi(4).unwrap();
        let mut value = f64::NAN;
        for i in 0..40 {
            value = engine.update(&mut rsi, 100.0 - f64::from(i)).unwrap();
        }
        assert_eq!(value, 0.0);
        assert!(engine.stats().fast_path > 0);
    }
}
