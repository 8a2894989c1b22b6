use super::Reference;
use crate::{buffer::CircularBuffer, error::Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct SmaParams {
    pub period: u32,
}

pub struct Sma {
    pub value: f64,
    // `None` when the running sum went non-finite; the next host update
    // recomputes it from the buffer.
    pub(crate) sum: Option<f64>,
    pub(crate) buffer: CircularBuffer,
    period: u32,
}

impl Sma {
    pub fn new(period: u32) -> Result<Self> {
        Ok(Self {
            value: f64::NAN,
            sum: Some(0.0),
            buffer: CircularBuffer::new(period)?,
            period,
        })
    }

    pub fn from_params(params: &SmaParams) -> Result<Self> {
        Self::new(params.period)
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn sum(&self) -> Option<f64> {
        self.sum
    }

    pub fn buffer(&self) -> &CircularBuffer {
        &self.buffer
    }

    pub(crate) fn set_sum(&mut self, sum: f64) {
        self.sum = if sum.is_finite() { Some(sum) } else { None };
        self.value = sum / self.buffer.len() as f64;
    }
}

impl Reference for Sma {
    fn maturity(&self) -> u32 {
        self.period
    }

    fn mature(&self) -> bool {
        self.buffer.is_full()
    }

    fn update(&mut self, price: f64) -> Result<()> {
        let last = self.buffer.insert(price)?;
        let sum = match self.sum {
            Some(sum) => sum - last + price,
            None => self.buffer.sum()?,
        };
        self.set_sum(sum);
        Ok(())
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn buffers_mut(&mut self) -> Vec<&mut CircularBuffer> {
        vec![&mut self.buffer]
    }
}
