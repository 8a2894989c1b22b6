//! Host/device residency bridge.
//!
//! An [`Accelerator`] exposes a functional check, raw host<->device copies and
//! a single-work-item kernel launch. Device memory is handed out as
//! [`DeviceArray`] handles which stay bound to the device that allocated them
//! and release their memory on drop.

mod emulated;
pub mod kernels;

pub use emulated::{EmulatedDevice, Fault, TransferStats};
pub use kernels::Kernel;

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

pub type ArrayId = u64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("device is not functional")]
    Unavailable,
    #[error("unknown device array {id}")]
    InvalidHandle { id: ArrayId },
    #[error("length mismatch on array {id}: device {device}, host {host}")]
    LengthMismatch { id: ArrayId, device: usize, host: usize },
    #[error("host to device copy failed: {0}")]
    Upload(String),
    #[error("device to host copy failed: {0}")]
    Download(String),
    #[error("kernel {kernel} launch failed: {reason}")]
    Launch { kernel: &'static str, reason: String },
    #[error("launch config too large: grid={grid} block={block}, kernel {kernel} is single-invocation")]
    LaunchConfigTooLarge {
        kernel: &'static str,
        grid: u32,
        block: u32,
    },
    #[error("kernel {kernel} argument {index}: expected {expected}")]
    ArgumentMismatch {
        kernel: &'static str,
        index: usize,
        expected: &'static str,
    },
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Residency {
    Host,
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: u32,
    pub block: u32,
}

impl LaunchConfig {
    /// One block of one thread. Every kernel the engine launches is a
    /// single-invocation kernel.
    pub const fn single() -> Self {
        Self { grid: 1, block: 1 }
    }

    pub fn work_items(&self) -> u64 {
        u64::from(self.grid) * u64::from(self.block)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KernelArg {
    Array(ArrayId),
    Scalar(f64),
    Index(usize),
    Flag(bool),
}

impl KernelArg {
    pub fn kind(&self) -> &'static str {
        match self {
            KernelArg::Array(_) => "array",
            KernelArg::Scalar(_) => "scalar",
            KernelArg::Index(_) => "index",
            KernelArg::Flag(_) => "flag",
        }
    }
}

/// Accelerator runtime. Implementations must be usable from any thread; the
/// engine shares one instance behind an `Arc` and queries it on every update.
pub trait Accelerator: Send + Sync {
    fn name(&self) -> &str;

    fn is_functional(&self) -> bool;

    fn upload(&self, host: &[f64]) -> Result<ArrayId, DeviceError>;

    fn download(&self, id: ArrayId, host: &mut [f64]) -> Result<(), DeviceError>;

    fn free(&self, id: ArrayId);

    /// Blocks until the kernel has completed.
    fn launch(
        &self,
        kernel: Kernel,
        config: LaunchConfig,
        args: &[KernelArg],
    ) -> Result<(), DeviceError>;
}

impl fmt::Debug for dyn Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accelerator")
            .field("name", &self.name())
            .field("functional", &self.is_functional())
            .finish()
    }
}

pub fn same_device(a: &Arc<dyn Accelerator>, b: &Arc<dyn Accelerator>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Device-resident `f64` array.
pub struct DeviceArray {
    id: ArrayId,
    len: usize,
    device: Arc<dyn Accelerator>,
}

impl DeviceArray {
    pub fn from_host(device: &Arc<dyn Accelerator>, host: &[f64]) -> Result<Self, DeviceError> {
        let id = device.upload(host)?;
        Ok(Self {
            id,
            len: host.len(),
            device: Arc::clone(device),
        })
    }

    pub fn zeroed(device: &Arc<dyn Accelerator>, len: usize) -> Result<Self, DeviceError> {
        Self::from_host(device, &vec![0.0; len])
    }

    pub fn id(&self) -> ArrayId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device(&self) -> &Arc<dyn Accelerator> {
        &self.device
    }

    pub fn copy_to(&self, host: &mut [f64]) -> Result<(), DeviceError> {
        if host.len() != self.len {
            return Err(DeviceError::LengthMismatch {
                id: self.id,
                device: self.len,
                host: host.len(),
            });
        }
        self.device.download(self.id, host)
    }

    pub fn to_host_vec(&self) -> Result<Vec<f64>, DeviceError> {
        let mut host = vec![0.0; self.len];
        self.copy_to(&mut host)?;
        Ok(host)
    }
}

impl Drop for DeviceArray {
    fn drop(&mut self) {
        self.device.free(self.id);
    }
}

impl fmt::Debug for DeviceArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceArray")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("device", &self.device.name())
            .finish()
    }
}

/// Single device-resident value, e.g. the output of an upstream kernel that
/// is fed into an indicator without a round trip through the caller.
#[derive(Debug)]
pub struct DeviceScalar(DeviceArray);

impl DeviceScalar {
    pub fn new(device: &Arc<dyn Accelerator>, value: f64) -> Result<Self, DeviceError> {
        DeviceArray::from_host(device, &[value]).map(DeviceScalar)
    }

    pub fn get(&self) -> Result<f64, DeviceError> {
        let mut out = [0.0];
        self.0.copy_to(&mut out)?;
        Ok(out[0])
    }

    pub fn array(&self) -> &DeviceArray {
        &self.0
    }
}
