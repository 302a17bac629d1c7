use std::{fmt::Debug, ops::Range};

use rayon::prelude::*;
use reacdiff_solvers::SparseError;

/// Evaluates a contiguous range of assembly tasks into a dense buffer.
pub type LocalAssembly<'a> = dyn Fn(Range<usize>) -> Result<Vec<f64>, SparseError> + Sync + 'a;

/// Strategy for running element-local assembly.
///
/// A backend splits the task list into parts, evaluates each part with
/// `local`, and returns the part buffers in task order. The caller sums
/// them, so every backend produces the same global system up to rounding.
pub trait AssemblyBackend: Debug + Send + Sync {
    /// Runs `local` over `0..num_tasks`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `local`.
    fn assemble_local(
        &self,
        num_tasks: usize,
        local: &LocalAssembly<'_>,
    ) -> Result<Vec<Vec<f64>>, SparseError>;
}

/// Assembles every task on the calling thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Serial;

impl AssemblyBackend for Serial {
    fn assemble_local(
        &self,
        num_tasks: usize,
        local: &LocalAssembly<'_>,
    ) -> Result<Vec<Vec<f64>>, SparseError> {
        Ok(vec![local(0..num_tasks)?])
    }
}

/// Splits the tasks into contiguous partitions assembled in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioned {
    partitions: usize,
}

impl Partitioned {
    /// Uses `partitions` parts, at least one.
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }

    /// One partition per rayon worker thread.
    #[must_use]
    pub fn per_thread() -> Self {
        Self::new(rayon::current_num_threads())
    }

    #[must_use]
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    fn ranges(&self, num_tasks: usize) -> Vec<Range<usize>> {
        let chunk = num_tasks.div_ceil(self.partitions).max(1);
        (0..num_tasks)
            .step_by(chunk)
            .map(|start| start..(start + chunk).min(num_tasks))
            .collect()
    }
}

impl Default for Partitioned {
    fn default() -> Self {
        Self::per_thread()
    }
}

impl AssemblyBackend for Partitioned {
    fn assemble_local(
        &self,
        num_tasks: usize,
        local: &LocalAssembly<'_>,
    ) -> Result<Vec<Vec<f64>>, SparseError> {
        // collect keeps partition order, so the reduction is deterministic.
        self.ranges(num_tasks)
            .into_par_iter()
            .map(|range| local(range))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(range: Range<usize>) -> Result<Vec<f64>, SparseError> {
        let mut buffer = vec![0.0; 3];
        for task in range {
            buffer[task % 3] += 1.0;
        }
        Ok(buffer)
    }

    #[test]
    fn partitions_cover_every_task_once() {
        let backend = Partitioned::new(4);
        let ranges = backend.ranges(10);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(10));
        assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));

        assert!(backend.ranges(0).is_empty());
        assert_eq!(Partitioned::new(0).partitions(), 1);
    }

    #[test]
    fn backends_agree_after_reduction() {
        let sum = |parts: Vec<Vec<f64>>| {
            parts.into_iter().fold(vec![0.0; 3], |mut acc, part| {
                acc.iter_mut().zip(part).for_each(|(a, p)| *a += p);
                acc
            })
        };
        let serial = sum(Serial.assemble_local(11, &count).unwrap());
        let parallel = sum(Partitioned::new(3).assemble_local(11, &count).unwrap());
        assert_eq!(serial, parallel);
        assert_eq!(serial, vec![4.0, 4.0, 3.0]);
    }

    #[test]
    fn errors_propagate() {
        let failing = |range: Range<usize>| -> Result<Vec<f64>, SparseError> {
            if range.contains(&5) {
                Err(SparseError::NotInPattern { row: 5, col: 0 })
            } else {
                Ok(vec![0.0])
            }
        };
        assert!(Partitioned::new(4).assemble_local(8, &failing).is_err());
        assert!(Serial.assemble_local(8, &failing).is_err());
    }
}
