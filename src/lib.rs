//! Streaming technical indicators whose sample windows can live in host or
//! accelerator memory.
//!
//! [`Engine::update`] feeds one sample at a time. Indicators with an
//! accelerated path (SMA, EMA, RSI) are updated on the device when the
//! accelerator is functional and their state allows it, moving a single
//! scalar back per step; everything else goes through the host reference
//! implementation.
//!
//! ```
//! use resident_ta::{accel::EmulatedDevice, Capability, Engine, Indicator, Residency};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(Capability::new(Arc::new(EmulatedDevice::new("emu"))));
//! let mut sma = Indicator::sma(3)?;
//! engine.place(&mut sma, Residency::Device)?;
//! for price in [1.0, 2.0, 3.0] {
//!     engine.update(&mut sma, price)?;
//! }
//! assert_eq!(engine.update(&mut sma, 4.0)?, 3.0);
//! # Ok::<(), resident_ta::Error>(())
//! ```

pub mod accel;
pub mod buffer;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod sample;

pub use crate::{
    accel::Residency,
    buffer::CircularBuffer,
    capability::Capability,
    config::EngineConfig,
    engine::{Engine, EngineStats},
    error::{Error, Result},
    indicators::{Indicator, IndicatorParams, Kind, Reference},
    sample::Sample,
};
