use super::{Ema, Indicator, Reference};
use crate::{buffer::CircularBuffer, error::Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct RsiParams {
    pub period: u32,
}

/// Relative strength index over Wilder-smoothed gains and losses.
pub struct Rsi {
    pub value: f64,
    pub(crate) mean_up: Box<Indicator>,
    pub(crate) mean_down: Box<Indicator>,
    pub(crate) last_price: f64,
    pub(crate) n: u64,
    period: u32,
}

impl Rsi {
    pub fn new(period: u32) -> Result<Self> {
        let a = 1.0 / f64::from(period.max(1));
        Ok(Self {
            value: f64::NAN,
            mean_up: Box::new(Indicator::Ema(Ema::with_smoothing(period, a)?)),
            mean_down: Box::new(Indicator::Ema(Ema::with_smoothing(period, a)?)),
            last_price: f64::NAN,
            n: 0,
            period,
        })
    }

    pub fn from_params(params: &RsiParams) -> Result<Self> {
        Self::new(params.period)
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn samples(&self) -> u64 {
        self.n
    }

    pub fn avg_gain(&self) -> &Indicator {
        &self.mean_up
    }

    pub fn avg_loss(&self) -> &Indicator {
        &self.mean_down
    }

    pub fn warming_up(&self) -> bool {
        self.n < u64::from(self.period)
    }
}

/// Splits a price change into its gain and loss parts. At most one of them
/// is nonzero and neither is negative. A NaN change poisons both.
pub(crate) fn split(delta: f64) -> (f64, f64) {
    if delta.is_nan() {
        (delta, delta)
    } else if delta > 0.0 {
        (delta, 0.0)
    } else if delta < 0.0 {
        (0.0, -delta)
    } else {
        (0.0, 0.0)
    }
}

pub(crate) fn ratio(mean_up: f64, mean_down: f64) -> f64 {
    if mean_down == 0.0 {
        100.0
    } else {
        let rs = mean_up / mean_down;
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Reference for Rsi {
    fn maturity(&self) -> u32 {
        self.period.saturating_add(1)
    }

    fn mature(&self) -> bool {
        self.mean_up.mature() && self.mean_down.mature()
    }

    fn update(&mut self, price: f64) -> Result<()> {
        if self.n > 0 {
            let (up, down) = split(price - self.last_price);
            self.mean_up.update(up)?;
            self.mean_down.update(down)?;
            if self.mature() {
                self.value = ratio(self.mean_up.value(), self.mean_down.value());
            }
        }
        self.last_price = price;
        self.n += 1;
        Ok(())
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn buffers_mut(&mut self) -> Vec<&mut CircularBuffer> {
        let mut buffers = self.mean_up.buffers_mut();
        buffers.extend(self.mean_down.buffers_mut());
        buffers
    }
}
