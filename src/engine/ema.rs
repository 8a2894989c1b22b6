use super::{reachable, Engine};
use crate::{
    accel::{Accelerator, Kernel},
    error::Result,
    indicators::Ema,
};
use std::sync::Arc;

/// Steady-state EMA update on the device. Warm-up always belongs to the host
/// reference, which owns the seeding.
pub(super) fn try_update(
    engine: &Engine,
    ema: &mut Ema,
    device: &Arc<dyn Accelerator>,
    price: f64,
) -> Result<bool> {
    if ema.warming_up() || !reachable(&ema.buffer, device) {
        return Ok(false);
    }

    let value = engine.launch_scalar(device, Kernel::EmaStep, &[price, ema.value, ema.a])?;
    // Keeps the window in step with the host path even though the steady
    // state no longer reads it.
    ema.buffer.insert(price)?;
    ema.value = value;
    ema.n += 1;
    Ok(true)
}
