use super::Reference;
use crate::{
    buffer::CircularBuffer,
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct EmaParams {
    pub period: u32,
    #[serde(default)]
    pub alpha: Option<f64>,
}

/// Exponential moving average seeded with the simple average of its first
/// `period` samples.
pub struct Ema {
    pub value: f64,
    pub(crate) a: f64,
    pub(crate) n: u64,
    pub(crate) buffer: CircularBuffer,
    period: u32,
}

impl Ema {
    pub fn new(period: u32) -> Result<Self> {
        Self::with_smoothing(period, 2.0 / (f64::from(period) + 1.0))
    }

    pub fn with_smoothing(period: u32, a: f64) -> Result<Self> {
        let buffer = CircularBuffer::new(period)?;
        if !(a > 0.0 && a <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "alpha",
                reason: format!("{} is outside (0, 1]", a),
            });
        }
        Ok(Self {
            value: f64::NAN,
            a,
            n: 0,
            buffer,
            period,
        })
    }

    pub fn from_params(params: &EmaParams) -> Result<Self> {
        match params.alpha {
            Some(a) => Self::with_smoothing(params.period, a),
            None => Self::new(params.period),
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn alpha(&self) -> f64 {
        self.a
    }

    pub fn samples(&self) -> u64 {
        self.n
    }

    pub fn buffer(&self) -> &CircularBuffer {
        &self.buffer
    }

    pub fn warming_up(&self) -> bool {
        self.n < u64::from(self.period)
    }
}

impl Reference for Ema {
    fn maturity(&self) -> u32 {
        self.period
    }

    fn mature(&self) -> bool {
        self.n >= u64::from(self.period)
    }

    fn update(&mut self, price: f64) -> Result<()> {
        let warming_up = self.warming_up();
        self.buffer.insert(price)?;
        self.value = if warming_up {
            self.buffer.sum()? / self.buffer.len() as f64
        } else {
            price * self.a + self.value * (1.0 - self.a)
        };
        self.n += 1;
        Ok(())
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn buffers_mut(&mut self) -> Vec<&mut CircularBuffer> {
        vec![&mut self.buffer]
    }
}
