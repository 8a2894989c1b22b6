use crate::accel::DeviceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid period {period}: {reason}")]
    InvalidPeriod { period: u32, reason: &'static str },
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("type mismatch: cannot represent {value} ({from}) as f64 without loss")]
    TypeMismatch { from: &'static str, value: String },
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl Error {
    pub(crate) fn invalid_period(period: u32, reason: &'static str) -> Self {
        Error::InvalidPeriod { period, reason }
    }
}
