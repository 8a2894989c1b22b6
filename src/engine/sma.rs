use super::reachable;
use crate::{accel::Accelerator, error::Result, indicators::Sma};
use std::sync::Arc;

/// Device-resident SMA update. Only the evicted sample comes back from the
/// device; the running sum is maintained on the host.
pub(super) fn try_update(sma: &mut Sma, device: &Arc<dyn Accelerator>, price: f64) -> Result<bool> {
    let sum = match sma.sum {
        Some(sum) => sum,
        None => return Ok(false),
    };
    if sma.buffer.device().is_none() || !reachable(&sma.buffer, device) {
        return Ok(false);
    }

    let full = sma.buffer.is_full();
    let evicted = sma.buffer.insert(price)?;
    let sum = if full { sum - evicted + price } else { sum + price };
    sma.set_sum(sum);
    Ok(true)
}
