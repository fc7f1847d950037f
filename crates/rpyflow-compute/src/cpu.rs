//! CPU compute backend using Rayon for shared-memory parallelism.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, RowFn};

/// CPU backend that parallelises work across threads via Rayon.
///
/// [`CpuBackend::new`] runs on the global Rayon pool. [`CpuBackend::with_threads`]
/// owns a dedicated pool so the thread count requested by the caller is the
/// one actually used.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a specified thread count.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let num_threads = num_threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ComputeError::DeviceError(e.to_string()))?;
        Ok(Self {
            num_threads,
            pool: Some(pool),
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_rows(&self, rows: usize, row_fn: &RowFn<'_>) -> Result<Vec<[f64; 3]>, ComputeError> {
        let run = || (0..rows).into_par_iter().map(row_fn).collect::<Vec<_>>();
        Ok(match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_returned_in_order() {
        let backend = CpuBackend::with_threads(3).unwrap();
        let rows = backend
            .parallel_rows(100, &|i| [i as f64, 2.0 * i as f64, 0.0])
            .unwrap();
        assert_eq!(rows.len(), 100);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[0], i as f64);
            assert_eq!(row[1], 2.0 * i as f64);
        }
    }

    #[test]
    fn test_thread_count_is_reported() {
        let backend = CpuBackend::with_threads(2).unwrap();
        assert_eq!(backend.num_threads(), 2);
        assert_eq!(backend.device_info().backend_type, BackendType::Cpu);
    }

    #[test]
    fn test_zero_threads_clamps_to_one() {
        let backend = CpuBackend::with_threads(0).unwrap();
        assert_eq!(backend.num_threads(), 1);
    }
}
