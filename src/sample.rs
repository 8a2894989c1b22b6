//! Coercion of caller input into the engine's working scalar.

use crate::{
    accel::DeviceScalar,
    error::{Error, Result},
};

/// A raw sample as handed to [`Engine::update`](crate::Engine::update).
#[derive(Debug)]
pub enum Sample<'a> {
    F64(f64),
    F32(f32),
    I64(i64),
    U64(u64),
    Device(&'a DeviceScalar),
}

impl Sample<'_> {
    /// Converts to `f64` on the host. Integers that `f64` cannot hold exactly
    /// are rejected rather than rounded.
    pub fn to_f64(&self) -> Result<f64> {
        match *self {
            Sample::F64(value) => Ok(value),
            Sample::F32(value) => Ok(f64::from(value)),
            Sample::I64(value) => exact(value as f64, i128::from(value), "i64"),
            Sample::U64(value) => exact(value as f64, i128::from(value), "u64"),
            Sample::Device(scalar) => Ok(scalar.get()?),
        }
    }
}

fn exact(converted: f64, original: i128, from: &'static str) -> Result<f64> {
    if converted as i128 == original {
        Ok(converted)
    } else {
        Err(Error::TypeMismatch {
            from,
            value: original.to_string(),
        })
    }
}

impl From<f64> for Sample<'_> {
    fn from(value: f64) -> Self {
        Sample::F64(value)
    }
}

impl From<f32> for Sample<'_> {
    fn from(value: f32) -> Self {
        Sample::F32(value)
    }
}

impl From<i32> for Sample<'_> {
    fn from(value: i32) -> Self {
        Sample::I64(i64::from(value))
    }
}

impl From<u32> for Sample<'_> {
    fn from(value: u32) -> Self {
        Sample::U64(u64::from(value))
    }
}

impl From<i64> for Sample<'_> {
    fn from(value: i64) -> Self {
        Sample::I64(value)
    }
}

impl From<u64> for Sample<'_> {
    fn from(value: u64) -> Self {
        Sample::U64(value)
    }
}

impl<'a> From<&'a DeviceScalar> for Sample<'a> {
    fn from(value: &'a DeviceScalar) -> Self {
        Sample::Device(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::{Accelerator, EmulatedDevice};
    use std::sync::Arc;

    #[test]
    fn test_floats_pass_through() {
        assert_eq!(Sample::from(1.5f64).to_f64().unwrap(), 1.5);
        assert_eq!(Sample::from(0.25f32).to_f64().unwrap(), 0.25);
        assert!(Sample::from(f64::NAN).to_f64().unwrap().is_nan());
    }

    #[test]
    fn test_exact_integers() {
        assert_eq!(Sample::from(-42i32).to_f64().unwrap(), -42.0);
        assert_eq!(Sample::from(7u32).to_f64().unwrap(), 7.0);
        assert_eq!(
            Sample::from(1i64 << 53).to_f64().unwrap(),
            9_007_199_254_740_992.0
        );
        // Large powers of two are exact.
        assert_eq!(Sample::from(1u64 << 63).to_f64().unwrap(), 2f64.powi(63));
    }

    #[test]
    fn test_lossy_integers_rejected() {
        let err = Sample::from((1i64 << 53) + 1).to_f64().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { from: "i64", .. }));
        let err = Sample::from(u64::MAX).to_f64().unwrap_err();
        assert_eq!(
            err.to_string(),
            "type mismatch: cannot represent 18446744073709551615 (u64) as f64 without loss"
        );
    }

    #[test]
    fn test_device_scalar_is_downloaded() {
        let emulated = Arc::new(EmulatedDevice::new("test"));
        let device: Arc<dyn Accelerator> = emulated.clone();
        let scalar = DeviceScalar::new(&device, 3.25).unwrap();
        assert_eq!(Sample::from(&scalar).to_f64().unwrap(), 3.25);
        assert_eq!(emulated.stats().downloads, 1);
    }
}
