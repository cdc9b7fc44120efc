use std::hint::black_box;
use std::io;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

/// Bytes touched by the default measurement pass.
pub const WORKLOAD_BYTES: usize = 1 << 20;

#[derive(Debug, Error, PartialEq)]
pub enum WorkloadError {
    /// The workload buffer could not be allocated. Nothing was touched.
    #[error("Cannot alloc memory, {} MiB: {reason}", .bytes >> 20)]
    AllocationFailed { bytes: usize, reason: String },
}

/// A bounded operation run while the counters are recording.
pub trait Workload {
    fn run(&mut self, bytes: usize) -> Result<(), WorkloadError>;
}

/// Increments bytes at uniformly random offsets of a freshly allocated
/// buffer, once per byte of the buffer.
///
/// The access pattern defeats prefetching, so once the buffer outgrows a
/// cache level nearly every touch misses it.
#[derive(Debug)]
pub struct RandomTouch {
    rng: StdRng,
}

impl RandomTouch {
    pub fn new() -> Self {
        RandomTouch {
            rng: StdRng::from_entropy(),
        }
    }

    /// A workload with a reproducible sequence of offsets.
    pub fn with_seed(seed: u64) -> Self {
        RandomTouch {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomTouch {
    fn default() -> Self {
        Self::new()
    }
}

impl Workload for RandomTouch {
    fn run(&mut self, bytes: usize) -> Result<(), WorkloadError> {
        if bytes == 0 {
            return Ok(());
        }

        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(bytes).map_err(|e| {
            debug!(bytes, error = %e, "workload allocation failed");
            WorkloadError::AllocationFailed {
                bytes,
                reason: io::Error::from_raw_os_error(libc::ENOMEM).to_string(),
            }
        })?;
        buf.resize(bytes, 0);

        for _ in 0..bytes {
            let i = self.rng.gen_range(0..bytes);
            buf[i] = buf[i].wrapping_add(1);
        }

        black_box(&buf);
        Ok(())
    }
}
