use super::{kernels, Accelerator, ArrayId, DeviceError, Kernel, KernelArg, LaunchConfig};
use std::{
    collections::HashMap,
    mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub uploads: u64,
    pub downloads: u64,
    pub h2d_bytes: u64,
    pub d2h_bytes: u64,
    pub launches: u64,
}

/// One-shot failure armed with [`EmulatedDevice::inject`]. It fires on the
/// next operation of the matching kind and is then consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Upload,
    Download,
    Launch,
}

/// In-process accelerator. Device memory lives in an arena owned by the
/// device and is only reachable through copies and kernel launches.
///
/// Disabling the device turns off kernel execution and makes
/// `is_functional` report false; memory already allocated stays readable and
/// writable so resident buffers can still be relocated to the host.
pub struct EmulatedDevice {
    name: String,
    functional: AtomicBool,
    next_id: AtomicU64,
    memory: Mutex<HashMap<ArrayId, Vec<f64>>>,
    stats: Mutex<TransferStats>,
    faults: Mutex<Vec<Fault>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EmulatedDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            functional: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            memory: Mutex::new(HashMap::new()),
            stats: Mutex::new(TransferStats::default()),
            faults: Mutex::new(Vec::new()),
        }
    }

    pub fn disable(&self) {
        self.functional.store(false, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.functional.store(true, Ordering::SeqCst);
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.faults).push(fault);
    }

    pub fn stats(&self) -> TransferStats {
        *lock(&self.stats)
    }

    pub fn reset_stats(&self) {
        *lock(&self.stats) = TransferStats::default();
    }

    pub fn live_arrays(&self) -> usize {
        lock(&self.memory).len()
    }

    fn take_fault(&self, kind: Fault) -> bool {
        let mut faults = lock(&self.faults);
        match faults.iter().position(|&f| f == kind) {
            Some(i) => {
                faults.remove(i);
                true
            }
            None => false,
        }
    }

    fn run(
        &self,
        kernel: Kernel,
        memory: &mut HashMap<ArrayId, Vec<f64>>,
        args: &[KernelArg],
    ) -> Result<(), DeviceError> {
        let launch_err = |reason: String| DeviceError::Launch {
            kernel: kernel.symbol(),
            reason,
        };
        match (kernel, args) {
            (
                Kernel::RingInsert,
                &[KernelArg::Array(storage_id), KernelArg::Array(out_id), KernelArg::Index(cursor), KernelArg::Flag(full), KernelArg::Scalar(value)],
            ) => {
                if storage_id == out_id {
                    return Err(launch_err("storage and output alias".to_owned()));
                }
                let mut storage = memory
                    .remove(&storage_id)
                    .ok_or(DeviceError::InvalidHandle { id: storage_id })?;
                let result = match memory.get_mut(&out_id) {
                    None => Err(DeviceError::InvalidHandle { id: out_id }),
                    Some(out) if out.is_empty() => Err(launch_err("empty output slot".to_owned())),
                    Some(_) if cursor >= storage.len() => Err(launch_err(format!(
                        "cursor {} out of bounds for length {}",
                        cursor,
                        storage.len()
                    ))),
                    Some(out) => {
                        kernels::ring_insert(&mut storage, out, cursor, full, value);
                        Ok(())
                    }
                };
                memory.insert(storage_id, storage);
                result
            }
            (
                Kernel::EmaStep,
                &[KernelArg::Array(out_id), KernelArg::Scalar(price), KernelArg::Scalar(prev), KernelArg::Scalar(alpha)],
            ) => {
                let out = scalar_slot(memory, out_id, &launch_err)?;
                kernels::ema_step(out, price, prev, alpha);
                Ok(())
            }
            (
                Kernel::RsiRatio,
                &[KernelArg::Array(out_id), KernelArg::Scalar(avg_gain), KernelArg::Scalar(avg_loss)],
            ) => {
                let out = scalar_slot(memory, out_id, &launch_err)?;
                kernels::rsi_ratio(out, avg_gain, avg_loss);
                Ok(())
            }
            _ => Err(signature_mismatch(kernel, args)),
        }
    }
}

fn scalar_slot<'a>(
    memory: &'a mut HashMap<ArrayId, Vec<f64>>,
    id: ArrayId,
    launch_err: &dyn Fn(String) -> DeviceError,
) -> Result<&'a mut [f64], DeviceError> {
    match memory.get_mut(&id) {
        None => Err(DeviceError::InvalidHandle { id }),
        Some(out) if out.is_empty() => Err(launch_err("empty output slot".to_owned())),
        Some(out) => Ok(out.as_mut_slice()),
    }
}

fn signature_mismatch(kernel: Kernel, args: &[KernelArg]) -> DeviceError {
    let expected = kernel.signature();
    let index = expected
        .iter()
        .zip(args)
        .position(|(want, got)| *want != got.kind())
        .unwrap_or_else(|| expected.len().min(args.len()));
    DeviceError::ArgumentMismatch {
        kernel: kernel.symbol(),
        index,
        expected: expected.get(index).copied().unwrap_or("no argument"),
    }
}

impl Accelerator for EmulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_functional(&self) -> bool {
        self.functional.load(Ordering::SeqCst)
    }

    fn upload(&self, host: &[f64]) -> Result<ArrayId, DeviceError> {
        if self.take_fault(Fault::Upload) {
            return Err(DeviceError::Upload("injected fault".to_owned()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.memory).insert(id, host.to_vec());
        let mut stats = lock(&self.stats);
        stats.uploads += 1;
        stats.h2d_bytes += (host.len() * mem::size_of::<f64>()) as u64;
        Ok(id)
    }

    fn download(&self, id: ArrayId, host: &mut [f64]) -> Result<(), DeviceError> {
        if self.take_fault(Fault::Download) {
            return Err(DeviceError::Download("injected fault".to_owned()));
        }
        let memory = lock(&self.memory);
        let data = memory.get(&id).ok_or(DeviceError::InvalidHandle { id })?;
        if data.len() != host.len() {
            return Err(DeviceError::LengthMismatch {
                id,
                device: data.len(),
                host: host.len(),
            });
        }
        host.copy_from_slice(data);
        let mut stats = lock(&self.stats);
        stats.downloads += 1;
        stats.d2h_bytes += (host.len() * mem::size_of::<f64>()) as u64;
        Ok(())
    }

    fn free(&self, id: ArrayId) {
        lock(&self.memory).remove(&id);
    }

    fn launch(
        &self,
        kernel: Kernel,
        config: LaunchConfig,
        args: &[KernelArg],
    ) -> Result<(), DeviceError> {
        if !self.is_functional() {
            return Err(DeviceError::Unavailable);
        }
        if config.work_items() != 1 {
            return Err(DeviceError::LaunchConfigTooLarge {
                kernel: kernel.symbol(),
                grid: config.grid,
                block: config.block,
            });
        }
        if self.take_fault(Fault::Launch) {
            return Err(DeviceError::Launch {
                kernel: kernel.symbol(),
                reason: "injected fault".to_owned(),
            });
        }
        self.run(kernel, &mut lock(&self.memory), args)?;
        lock(&self.stats).launches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_download_counts_bytes() {
        let device = EmulatedDevice::new("emu");
        let id = device.upload(&[1.0, 2.0]).unwrap();
        let mut host = [0.0; 2];
        device.download(id, &mut host).unwrap();
        assert_eq!(host, [1.0, 2.0]);
        let stats = device.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.downloads, 1);
        assert_eq!(stats.h2d_bytes, 16);
        assert_eq!(stats.d2h_bytes, 16);
    }

    #[test]
    fn test_ring_insert_launch() {
        let device = EmulatedDevice::new("emu");
        let storage = device.upload(&[1.0, 2.0, 3.0]).unwrap();
        let out = device.upload(&[0.0]).unwrap();
        device
            .launch(
                Kernel::RingInsert,
                LaunchConfig::single(),
                &[
                    KernelArg::Array(storage),
                    KernelArg::Array(out),
                    KernelArg::Index(2),
                    KernelArg::Flag(true),
                    KernelArg::Scalar(9.0),
                ],
            )
            .unwrap();
        let mut evicted = [0.0];
        device.download(out, &mut evicted).unwrap();
        assert_eq!(evicted[0], 3.0);
        let mut data = [0.0; 3];
        device.download(storage, &mut data).unwrap();
        assert_eq!(data, [1.0, 2.0, 9.0]);
        assert_eq!(device.stats().launches, 1);
    }

    #[test]
    fn test_launch_rejects_wrong_arguments() {
        let device = EmulatedDevice::new("emu");
        let out = device.upload(&[0.0]).unwrap();
        let err = device
            .launch(
                Kernel::EmaStep,
                LaunchConfig::single(),
                &[KernelArg::Array(out), KernelArg::Index(1)],
            )
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::ArgumentMismatch {
                kernel: "ema_step_f64",
                index: 1,
                expected: "scalar",
            }
        );
    }

    #[test]
    fn test_launch_rejects_out_of_bounds_cursor() {
        let device = EmulatedDevice::new("emu");
        let storage = device.upload(&[0.0; 2]).unwrap();
        let out = device.upload(&[0.0]).unwrap();
        let err = device
            .launch(
                Kernel::RingInsert,
                LaunchConfig::single(),
                &[
                    KernelArg::Array(storage),
                    KernelArg::Array(out),
                    KernelArg::Index(2),
                    KernelArg::Flag(false),
                    KernelArg::Scalar(1.0),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, DeviceError::Launch { .. }));
        // Storage survives a failed launch.
        assert_eq!(device.live_arrays(), 2);
    }

    #[test]
    fn test_launch_rejects_multi_item_config() {
        let device = EmulatedDevice::new("emu");
        let out = device.upload(&[0.0]).unwrap();
        let err = device
            .launch(
                Kernel::RsiRatio,
                LaunchConfig { grid: 2, block: 32 },
                &[
                    KernelArg::Array(out),
                    KernelArg::Scalar(1.0),
                    KernelArg::Scalar(1.0),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, DeviceError::LaunchConfigTooLarge { .. }));
    }

    #[test]
    fn test_disabled_device_refuses_launch_but_keeps_memory() {
        let device = EmulatedDevice::new("emu");
        let out = device.upload(&[5.0]).unwrap();
        device.disable();
        assert!(!device.is_functional());
        let err = device
            .launch(
                Kernel::RsiRatio,
                LaunchConfig::single(),
                &[
                    KernelArg::Array(out),
                    KernelArg::Scalar(1.0),
                    KernelArg::Scalar(1.0),
                ],
            )
            .unwrap_err();
        assert_eq!(err, DeviceError::Unavailable);
        let mut host = [0.0];
        device.download(out, &mut host).unwrap();
        assert_eq!(host[0], 5.0);
        device.enable();
        assert!(device.is_functional());
    }

    #[test]
    fn test_injected_fault_fires_once() {
        let device = EmulatedDevice::new("emu");
        let id = device.upload(&[1.0]).unwrap();
        device.inject(Fault::Download);
        let mut host = [0.0];
        assert!(matches!(
            device.download(id, &mut host),
            Err(DeviceError::Download(_))
        ));
        device.download(id, &mut host).unwrap();
        assert_eq!(host[0], 1.0);
    }
}
