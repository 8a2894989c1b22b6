use super::{Reference, Sma};
use crate::{buffer::CircularBuffer, error::Result};
use serde::{Deserialize, Serialize};
use std::cmp::min;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct SmmaParams {
    pub period: u32,
}

/// Smoothed moving average.
///
/// This is the stock indicator without an accelerated path: wrapped in
/// [`Indicator::Other`](super::Indicator::Other) it is always updated by the
/// engine's host fallback, with its SMA seed buffer relocated to the host
/// for the call and pushed back afterwards.
pub struct Smma {
    pub value: f64,

    sma: Sma,
    weight: f64,

    t: u32,
    t1: u32,
    t2: u32,
}

impl Smma {
    pub fn new(period: u32) -> Result<Self> {
        Ok(Self {
            value: f64::NAN,
            sma: Sma::new(period)?,
            weight: f64::from(period),
            t: 0,
            t1: period,
            t2: period.saturating_add(1),
        })
    }

    pub fn from_params(params: &SmmaParams) -> Result<Self> {
        Self::new(params.period)
    }
}

impl Reference for Smma {
    fn maturity(&self) -> u32 {
        self.t1
    }

    fn mature(&self) -> bool {
        self.t >= self.t1
    }

    fn update(&mut self, price: f64) -> Result<()> {
        self.t = min(self.t + 1, self.t2);

        if self.t <= self.t1 {
            self.sma.update(price)?;
        }

        if self.t == self.t1 {
            self.value = self.sma.value;
        } else if self.t >= self.t2 {
            self.value = (self.value * (self.weight - 1.0) + price) / self.weight;
        }
        Ok(())
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn buffers_mut(&mut self) -> Vec<&mut CircularBuffer> {
        self.sma.buffers_mut()
    }
}
