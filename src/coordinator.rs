//! The process group this process measures with.
//!
//! A [`Coordinator`] answers who this process is within the group, provides a
//! barrier, and hands out an [`AbortHandle`] that tears down every member.
//! Without the `mpi` feature the group is just the calling process.

use std::process;

#[cfg(feature = "mpi")]
use crate::error::{new_error, ErrorKind};
use crate::error::Error;

/// This process's place in the group. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// 0-based position within the group.
    pub rank: u32,
    /// Number of processes in the group.
    pub size: u32,
}

impl Identity {
    /// Rank 0 prints the banners and usage errors for the whole group.
    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }
}

/// Membership of, and control over, the process group.
pub trait Coordinator {
    /// This process's rank and the group size.
    fn identity(&self) -> Identity;

    /// Block until every member of the group has called `barrier`.
    fn barrier(&self);

    /// A handle that aborts every member of the group.
    fn abort_handle(&self) -> AbortHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Substrate {
    Local,
    #[cfg(feature = "mpi")]
    Mpi,
}

/// Terminates the whole process group.
///
/// The handle is `Copy + Send`, so the watchdog thread and the fatal error
/// path share the same abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortHandle {
    substrate: Substrate,
}

impl AbortHandle {
    /// Abort every process in the group with exit `code`.
    pub fn abort(self, code: i32) -> ! {
        match self.substrate {
            Substrate::Local => {}
            #[cfg(feature = "mpi")]
            Substrate::Mpi => unsafe {
                mpi::ffi::MPI_Abort(mpi::ffi::RSMPI_COMM_WORLD, code);
            },
        }
        process::exit(code)
    }
}

/// A group of one: the calling process.
#[derive(Debug, Default)]
pub struct LocalGroup;

impl LocalGroup {
    /// Always succeeds.
    pub fn init() -> Result<Self, Error> {
        Ok(LocalGroup)
    }
}

impl Coordinator for LocalGroup {
    fn identity(&self) -> Identity {
        Identity { rank: 0, size: 1 }
    }

    fn barrier(&self) {}

    fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            substrate: Substrate::Local,
        }
    }
}

/// One rank of an MPI job.
///
/// MPI is finalised when the group is dropped.
#[cfg(feature = "mpi")]
pub struct MpiGroup {
    // Declared first so the communicator is dropped before MPI is finalised.
    world: mpi::topology::SimpleCommunicator,
    _universe: mpi::environment::Universe,
    identity: Identity,
}

#[cfg(feature = "mpi")]
impl MpiGroup {
    /// Initialise MPI. Must be called once, before anything else touches MPI.
    pub fn init() -> Result<Self, Error> {
        use mpi::traits::Communicator;

        // The watchdog aborts the job from its own thread.
        let (universe, provided) = mpi::initialize_with_threading(mpi::Threading::Multiple)
            .ok_or_else(|| {
                new_error(ErrorKind::Coordination(
                    "MPI_Init failed.  MPI is required.".to_string(),
                ))
            })?;
        check_threading(provided)?;
        let world = universe.world();

        let rank = world.rank();
        let size = world.size();
        if rank < 0 || size < 1 {
            return Err(new_error(ErrorKind::Coordination(format!(
                "unable to get MPI rank/size (rank {}, size {})",
                rank, size
            ))));
        }

        Ok(MpiGroup {
            world,
            _universe: universe,
            identity: Identity {
                rank: rank as u32,
                size: size as u32,
            },
        })
    }
}

/// Refuse an MPI library that cannot be called from the watchdog thread.
#[cfg(feature = "mpi")]
fn check_threading(provided: mpi::Threading) -> Result<(), Error> {
    let name = match provided {
        mpi::Threading::Multiple => return Ok(()),
        mpi::Threading::Serialized => "MPI_THREAD_SERIALIZED",
        mpi::Threading::Funneled => "MPI_THREAD_FUNNELED",
        mpi::Threading::Single => "MPI_THREAD_SINGLE",
    };
    Err(new_error(ErrorKind::Coordination(format!(
        "MPI provides {}, MPI_THREAD_MULTIPLE is required",
        name
    ))))
}

#[cfg(feature = "mpi")]
impl Coordinator for MpiGroup {
    fn identity(&self) -> Identity {
        self.identity
    }

    fn barrier(&self) {
        use mpi::traits::CommunicatorCollectives;

        self.world.barrier();
    }

    fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            substrate: Substrate::Mpi,
        }
    }
}

/// The coordinator the binary runs under.
#[cfg(feature = "mpi")]
pub type Native = MpiGroup;
#[cfg(not(feature = "mpi"))]
pub type Native = LocalGroup;
