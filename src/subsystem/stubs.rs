use std::io;

use super::CounterSubsystem;
use crate::events::EventHandle;
use crate::preset::Preset;

/// Stand-in for platforms without a supported counter interface.
///
/// Event names still resolve so the command line is validated the same way
/// everywhere, but no counter group can be created.
#[derive(Debug, Default)]
pub struct Unsupported;

impl Unsupported {
    pub fn new() -> Self {
        Unsupported
    }
}

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "hardware counters are only implemented on Linux and FreeBSD",
    )
}

impl CounterSubsystem for Unsupported {
    fn describe(&self) -> &'static str {
        "unsupported"
    }

    fn lookup(&self, name: &str) -> Option<EventHandle> {
        Preset::from_name(name).map(|p| EventHandle::new(p.index()))
    }

    fn create_group(&mut self) -> io::Result<()> {
        Err(unsupported())
    }

    fn add_events(&mut self, _handles: &[EventHandle]) -> io::Result<()> {
        Err(unsupported())
    }

    fn start(&mut self) -> io::Result<()> {
        Err(unsupported())
    }

    fn reset(&mut self) -> io::Result<()> {
        Err(unsupported())
    }

    fn read(&mut self, _values: &mut [i64]) -> io::Result<()> {
        Err(unsupported())
    }

    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }
}
