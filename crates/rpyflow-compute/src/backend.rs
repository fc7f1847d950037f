//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so
//! that the kernel code in `rpyflow-core` stays independent of the
//! threading model. The external spectral and near-field work in a
//! simulation driver is parallelised through a thread count; here that
//! count lives in the backend.

use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Device error: {0}")]
    DeviceError(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
}

/// A per-row work function producing one 3-vector.
pub type RowFn<'a> = dyn Fn(usize) -> [f64; 3] + Send + Sync + 'a;

/// Abstraction over compute backends.
///
/// Every hot loop in the solvers is "for each target point, accumulate a
/// 3-vector", so the backend exposes exactly that shape of work.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Evaluate `row_fn` for every row index in `0..rows` and collect the
    /// results in order.
    ///
    /// Rows are independent; implementations are free to evaluate them
    /// concurrently.
    fn parallel_rows(&self, rows: usize, row_fn: &RowFn<'_>) -> Result<Vec<[f64; 3]>, ComputeError>;

    /// Number of worker threads the backend schedules onto.
    fn num_threads(&self) -> usize {
        self.device_info().compute_units.unwrap_or(1)
    }
}
