mod ema;
mod rsi;
mod sma;
mod smma;

pub use ema::{Ema, EmaParams};
pub use rsi::{Rsi, RsiParams};
pub use sma::{Sma, SmaParams};
pub use smma::{Smma, SmmaParams};

pub(crate) use rsi::split;

use crate::{
    accel::Residency,
    buffer::CircularBuffer,
    error::Result,
};
use serde::{Deserialize, Serialize};

/// Host-only reference update. This is the canonical behavior of every
/// indicator; accelerated paths must agree with it.
pub trait Reference: Send + Sync {
    fn maturity(&self) -> u32;
    fn mature(&self) -> bool;
    fn update(&mut self, price: f64) -> Result<()>;
    fn value(&self) -> f64;
    /// Every sample buffer owned by the indicator, including those of nested
    /// indicators.
    fn buffers_mut(&mut self) -> Vec<&mut CircularBuffer>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Sma,
    Ema,
    Rsi,
    Other,
}

pub enum Indicator {
    Sma(Sma),
    Ema(Ema),
    Rsi(Rsi),
    Other(Box<dyn Reference>),
}

impl Indicator {
    pub fn sma(period: u32) -> Result<Self> {
        Sma::new(period).map(Indicator::Sma)
    }

    pub fn ema(period: u32) -> Result<Self> {
        Ema::new(period).map(Indicator::Ema)
    }

    pub fn rsi(period: u32) -> Result<Self> {
        Rsi::new(period).map(Indicator::Rsi)
    }

    pub fn other<T: Reference + 'static>(indicator: T) -> Self {
        Indicator::Other(Box::new(indicator))
    }

    pub fn from_params(params: &IndicatorParams) -> Result<Self> {
        match params {
            IndicatorParams::Sma(params) => Sma::from_params(params).map(Indicator::Sma),
            IndicatorParams::Ema(params) => Ema::from_params(params).map(Indicator::Ema),
            IndicatorParams::Rsi(params) => Rsi::from_params(params).map(Indicator::Rsi),
            IndicatorParams::Smma(params) => Smma::from_params(params).map(Indicator::other),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Indicator::Sma(_) => Kind::Sma,
            Indicator::Ema(_) => Kind::Ema,
            Indicator::Rsi(_) => Kind::Rsi,
            Indicator::Other(_) => Kind::Other,
        }
    }

    pub fn has_fast_path(&self) -> bool {
        self.kind() != Kind::Other
    }

    /// `None` for an indicator without buffers or with buffers split across
    /// residencies.
    pub fn residency(&mut self) -> Option<Residency> {
        let mut residencies = self.buffers_mut().into_iter().map(|b| b.residency());
        let first = residencies.next()?;
        residencies.all(|r| r == first).then(|| first)
    }

    fn as_reference(&self) -> &dyn Reference {
        match self {
            Indicator::Sma(indicator) => indicator,
            Indicator::Ema(indicator) => indicator,
            Indicator::Rsi(indicator) => indicator,
            Indicator::Other(indicator) => &**indicator,
        }
    }

    fn as_reference_mut(&mut self) -> &mut dyn Reference {
        match self {
            Indicator::Sma(indicator) => indicator,
            Indicator::Ema(indicator) => indicator,
            Indicator::Rsi(indicator) => indicator,
            Indicator::Other(indicator) => &mut **indicator,
        }
    }
}

impl Reference for Indicator {
    fn maturity(&self) -> u32 {
        self.as_reference().maturity()
    }

    fn mature(&self) -> bool {
        self.as_reference().mature()
    }

    fn update(&mut self, price: f64) -> Result<()> {
        self.as_reference_mut().update(price)
    }

    fn value(&self) -> f64 {
        self.as_reference().value()
    }

    fn buffers_mut(&mut self) -> Vec<&mut CircularBuffer> {
        self.as_reference_mut().buffers_mut()
    }
}

impl From<Sma> for Indicator {
    fn from(indicator: Sma) -> Self {
        Indicator::Sma(indicator)
    }
}

impl From<Ema> for Indicator {
    fn from(indicator: Ema) -> Self {
        Indicator::Ema(indicator)
    }
}

impl From<Rsi> for Indicator {
    fn from(indicator: Rsi) -> Self {
        Indicator::Rsi(indicator)
    }
}

impl std::fmt::Debug for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indicator")
            .field("kind", &self.kind())
            .field("value", &self.value())
            .field("mature", &self.mature())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndicatorParams {
    Sma(SmaParams),
    Ema(EmaParams),
    Rsi(RsiParams),
    Smma(SmmaParams),
}
