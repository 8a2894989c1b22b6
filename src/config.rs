use crate::{accel::Residency, error::Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// When false every update takes the host path, whatever the device
    /// reports.
    pub accelerate: bool,
    pub memoize_unavailable: bool,
    /// Where `Engine::place_default` puts indicator buffers.
    pub placement: Residency,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accelerate: true,
            memoize_unavailable: false,
            placement: Residency::Device,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
