//! Native hardware counter interfaces.
//!
//! Each platform back-end drives a single counter group on behalf of the
//! calling thread. The back-ends only translate calls into the native API and
//! return the native error; ordering rules are enforced by [`EventSet`].
//!
//! [`EventSet`]: crate::EventSet

use std::io;

use crate::events::EventHandle;

#[cfg(target_os = "linux")]
mod perf;
#[cfg(target_os = "linux")]
pub use self::perf::PerfEvents as Native;

#[cfg(target_os = "freebsd")]
mod pmc;
#[cfg(target_os = "freebsd")]
pub use self::pmc::Pmc as Native;

#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
mod stubs;
#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
pub use self::stubs::Unsupported as Native;

/// A hardware performance counter subsystem holding at most one counter group.
pub trait CounterSubsystem {
    /// A short description of the native interface, used in diagnostics.
    fn describe(&self) -> &'static str;

    /// Map an event name to a handle, or `None` if the name is not
    /// recognised on this platform.
    fn lookup(&self, name: &str) -> Option<EventHandle>;

    /// Allocate an empty counter group.
    fn create_group(&mut self) -> io::Result<()>;

    /// Add every handle to the group in one batch, in order.
    fn add_events(&mut self, handles: &[EventHandle]) -> io::Result<()>;

    /// Begin counting.
    fn start(&mut self) -> io::Result<()>;

    /// Zero all counters without stopping them.
    fn reset(&mut self) -> io::Result<()>;

    /// Copy the current counter values into `values`, one per added event.
    fn read(&mut self, values: &mut [i64]) -> io::Result<()>;

    /// Stop counting and release every native resource held by the group.
    fn release(&mut self) -> io::Result<()>;
}

impl<T: CounterSubsystem + ?Sized> CounterSubsystem for Box<T> {
    fn describe(&self) -> &'static str {
        (**self).describe()
    }

    fn lookup(&self, name: &str) -> Option<EventHandle> {
        (**self).lookup(name)
    }

    fn create_group(&mut self) -> io::Result<()> {
        (**self).create_group()
    }

    fn add_events(&mut self, handles: &[EventHandle]) -> io::Result<()> {
        (**self).add_events(handles)
    }

    fn start(&mut self) -> io::Result<()> {
        (**self).start()
    }

    fn reset(&mut self) -> io::Result<()> {
        (**self).reset()
    }

    fn read(&mut self, values: &mut [i64]) -> io::Result<()> {
        (**self).read(values)
    }

    fn release(&mut self) -> io::Result<()> {
        (**self).release()
    }
}
