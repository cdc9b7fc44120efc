#![warn(missing_docs)]

//! `memprobe` checks how the memory subsystem of an unfamiliar machine or
//! cluster behaves before real workloads are run on it.
//!
//! Every process of a group (a single local process, or each rank of an MPI
//! job with the `mpi` feature) counts hardware cache events around a bounded
//! workload that touches a buffer at random offsets, then reports its counts.
//! A watchdog aborts the entire group if the pass does not finish in time.
//!
//! Counters are read through [`perf_event_open(2)`] on Linux and [`libpmc`]
//! on [`FreeBSD`]. Events are named either with PAPI-style presets
//! (`PAPI_L1_DCM`) or their `perf` spelling (`L1-dcache-load-misses`), see
//! [`Preset`].
//!
//! ```no_run
//! use memprobe::{Measurement, RandomTouch, RunConfiguration, Identity};
//!
//! let config = RunConfiguration::default();
//! let me = Identity { rank: 0, size: 1 };
//! let native = memprobe::subsystem::Native::new();
//!
//! let samples = Measurement::new(&config, me, native, RandomTouch::new())
//!     .run(&mut std::io::stdout(), &mut std::io::stderr())?;
//! #
//! # Ok::<(), memprobe::Error>(())
//! ```
//!
//! [`perf_event_open(2)`]: https://man7.org/linux/man-pages/man2/perf_event_open.2.html
//! [`FreeBSD`]: https://www.freebsd.org/
//! [`libpmc`]: https://www.freebsd.org/cgi/man.cgi?query=pmc
//!

#[macro_use]
extern crate lazy_static;

pub mod error;
pub use self::error::{Error, ErrorKind};

mod preset;
pub use self::preset::Preset;

mod events;
pub use self::events::{EventHandle, EventSpec, Registry, DEFAULT_EVENTS, MAX_EVENTS};

#[allow(missing_docs)]
pub mod subsystem;
pub use self::subsystem::CounterSubsystem;

mod eventset;
pub use self::eventset::{CounterSample, EventSet, Running, State};

#[allow(missing_docs)]
pub mod workload;
pub use self::workload::{RandomTouch, Workload, WorkloadError, WORKLOAD_BYTES};

pub mod coordinator;
pub use self::coordinator::{AbortHandle, Coordinator, Identity, LocalGroup};

pub mod watchdog;
pub use self::watchdog::Watchdog;

mod config;
pub use self::config::{parse_args, Invocation, RunConfiguration, DEFAULT_TIMEOUT_SECS};

pub mod report;

mod measure;
pub use self::measure::Measurement;
