#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use memprobe::{CounterSubsystem, EventHandle, Workload, WorkloadError};

/// An in-memory counter subsystem.
///
/// Recognises the names in `known`, records every call in `calls`, and makes
/// the operation named in `fail` return `EACCES`. Each counter reads as
/// `(code + 1) * 100` plus the number of resets so far.
#[derive(Default)]
pub struct FakeCounters {
    pub calls: Rc<RefCell<Vec<&'static str>>>,
    pub known: Vec<&'static str>,
    pub fail: Option<&'static str>,
    added: Vec<EventHandle>,
    resets: i64,
}

impl FakeCounters {
    pub fn new(known: &[&'static str]) -> Self {
        FakeCounters {
            known: known.to_vec(),
            ..FakeCounters::default()
        }
    }

    pub fn failing(known: &[&'static str], op: &'static str) -> Self {
        FakeCounters {
            fail: Some(op),
            ..FakeCounters::new(known)
        }
    }

    fn call(&mut self, op: &'static str) -> io::Result<()> {
        self.calls.borrow_mut().push(op);
        if self.fail == Some(op) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, op));
        }
        Ok(())
    }
}

impl CounterSubsystem for FakeCounters {
    fn describe(&self) -> &'static str {
        "fake"
    }

    fn lookup(&self, name: &str) -> Option<EventHandle> {
        self.known
            .iter()
            .position(|k| *k == name)
            .map(|i| EventHandle::new(i as u32))
    }

    fn create_group(&mut self) -> io::Result<()> {
        self.call("create")
    }

    fn add_events(&mut self, handles: &[EventHandle]) -> io::Result<()> {
        self.call("add")?;
        self.added = handles.to_vec();
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        self.call("start")
    }

    fn reset(&mut self) -> io::Result<()> {
        self.call("reset")?;
        self.resets += 1;
        Ok(())
    }

    fn read(&mut self, values: &mut [i64]) -> io::Result<()> {
        self.call("read")?;
        for (v, h) in values.iter_mut().zip(&self.added) {
            *v = (i64::from(h.code()) + 1) * 100 + self.resets;
        }
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        self.call("release")
    }
}

/// A workload that always fails to allocate, and counts its invocations.
#[derive(Default)]
pub struct NoMemory {
    pub runs: Rc<RefCell<usize>>,
}

impl Workload for NoMemory {
    fn run(&mut self, bytes: usize) -> Result<(), WorkloadError> {
        *self.runs.borrow_mut() += 1;
        Err(WorkloadError::AllocationFailed {
            bytes,
            reason: "Cannot allocate memory".to_string(),
        })
    }
}

/// A workload that does nothing.
pub struct Idle;

impl Workload for Idle {
    fn run(&mut self, _bytes: usize) -> Result<(), WorkloadError> {
        Ok(())
    }
}

/// A workload that blocks for a fixed time.
pub struct Stall(pub Duration);

impl Workload for Stall {
    fn run(&mut self, _bytes: usize) -> Result<(), WorkloadError> {
        thread::sleep(self.0);
        Ok(())
    }
}

/// A writer whose every write fails.
pub struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
