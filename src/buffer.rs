use crate::{
    accel::{
        kernels, Accelerator, DeviceArray, Kernel, KernelArg, LaunchConfig, Residency,
    },
    error::{Error, Result},
};
use std::sync::Arc;
use tracing::debug;

enum Storage {
    Host(Vec<f64>),
    Device {
        data: DeviceArray,
        // Receives the evicted value from each insert.
        slot: DeviceArray,
    },
}

/// Fixed-capacity ring of the most recent samples.
///
/// Cursor and count are always tracked on the host, whichever side holds the
/// storage. Inserting is the only mutation; relocating between host and
/// device moves the contents without touching the metadata.
pub struct CircularBuffer {
    storage: Storage,
    capacity: usize,
    cursor: usize,
    count: usize,
}

impl CircularBuffer {
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_period(
                capacity,
                "buffer capacity must be greater than zero",
            ));
        }
        Ok(Self {
            storage: Storage::Host(vec![0.0; capacity as usize]),
            capacity: capacity as usize,
            cursor: 0,
            count: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn residency(&self) -> Residency {
        match self.storage {
            Storage::Host(_) => Residency::Host,
            Storage::Device { .. } => Residency::Device,
        }
    }

    pub fn device(&self) -> Option<&Arc<dyn Accelerator>> {
        match &self.storage {
            Storage::Host(_) => None,
            Storage::Device { data, .. } => Some(data.device()),
        }
    }

    /// Writes `value` over the oldest entry. Returns the overwritten entry if
    /// the buffer was full, `0.0` otherwise.
    pub fn insert(&mut self, value: f64) -> Result<f64> {
        let full = self.is_full();
        let evicted = match &mut self.storage {
            Storage::Host(data) => {
                let mut out = [0.0];
                kernels::ring_insert(data, &mut out, self.cursor, full, value);
                out[0]
            }
            Storage::Device { data, slot } => {
                data.device().launch(
                    Kernel::RingInsert,
                    LaunchConfig::single(),
                    &[
                        KernelArg::Array(data.id()),
                        KernelArg::Array(slot.id()),
                        KernelArg::Index(self.cursor),
                        KernelArg::Flag(full),
                        KernelArg::Scalar(value),
                    ],
                )?;
                let mut out = [0.0];
                slot.copy_to(&mut out)?;
                out[0]
            }
        };
        self.cursor = (self.cursor + 1) % self.capacity;
        if !full {
            self.count += 1;
        }
        Ok(evicted)
    }

    /// Valid entries, oldest first.
    pub fn snapshot(&self) -> Result<Vec<f64>> {
        let raw = match &self.storage {
            Storage::Host(data) => data.clone(),
            Storage::Device { data, .. } => data.to_host_vec()?,
        };
        if self.is_full() {
            Ok(raw[self.cursor..]
                .iter()
                .chain(&raw[..self.cursor])
                .copied()
                .collect())
        } else {
            Ok(raw[..self.count].to_vec())
        }
    }

    /// Sum of the valid entries, recomputed from storage.
    pub fn sum(&self) -> Result<f64> {
        Ok(self.snapshot()?.iter().sum())
    }

    /// Moves the storage to the host. Returns the device it was resident on,
    /// if any.
    pub fn to_host(&mut self) -> Result<Option<Arc<dyn Accelerator>>> {
        let host = match &self.storage {
            Storage::Host(_) => return Ok(None),
            Storage::Device { data, .. } => data.to_host_vec()?,
        };
        let previous = std::mem::replace(&mut self.storage, Storage::Host(host));
        match previous {
            Storage::Device { data, .. } => {
                debug!(
                    device = data.device().name(),
                    capacity = self.capacity,
                    "relocated buffer to host"
                );
                Ok(Some(Arc::clone(data.device())))
            }
            Storage::Host(_) => Ok(None),
        }
    }

    /// Moves the storage onto `device`. A buffer already resident on another
    /// device is pulled to the host first.
    pub fn to_device(&mut self, device: &Arc<dyn Accelerator>) -> Result<()> {
        if let Some(current) = self.device() {
            if crate::accel::same_device(current, device) {
                return Ok(());
            }
            self.to_host()?;
        }
        let data = match &self.storage {
            Storage::Host(host) => DeviceArray::from_host(device, host)?,
            Storage::Device { .. } => return Ok(()),
        };
        let slot = DeviceArray::zeroed(device, 1)?;
        self.storage = Storage::Device { data, slot };
        debug!(
            device = device.name(),
            capacity = self.capacity,
            "relocated buffer to device"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("residency", &self.residency())
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("count", &self.count)
            .finish()
    }
}
