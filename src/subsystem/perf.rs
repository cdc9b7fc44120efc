use std::fs::File;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::Path;

use perf_event_open_sys::bindings::{
    perf_event_attr, PERF_COUNT_HW_BRANCH_INSTRUCTIONS, PERF_COUNT_HW_BRANCH_MISSES,
    PERF_COUNT_HW_CACHE_DTLB, PERF_COUNT_HW_CACHE_L1D, PERF_COUNT_HW_CACHE_MISSES,
    PERF_COUNT_HW_CACHE_OP_READ, PERF_COUNT_HW_CACHE_REFERENCES,
    PERF_COUNT_HW_CACHE_RESULT_ACCESS, PERF_COUNT_HW_CACHE_RESULT_MISS,
    PERF_COUNT_HW_CPU_CYCLES, PERF_COUNT_HW_INSTRUCTIONS, PERF_FLAG_FD_CLOEXEC,
    PERF_FORMAT_GROUP, PERF_IOC_FLAG_GROUP, PERF_TYPE_HARDWARE, PERF_TYPE_HW_CACHE,
};
use perf_event_open_sys::{ioctls, perf_event_open};

use super::CounterSubsystem;
use crate::events::EventHandle;
use crate::preset::Preset;

// Present whenever the running kernel was built with perf events.
const PERF_PARANOID: &str = "/proc/sys/kernel/perf_event_paranoid";

type GroupIoctl = unsafe fn(libc::c_int, libc::c_uint) -> libc::c_int;

/// Counters backed by `perf_event_open(2)`.
///
/// The group is a leader plus members opened against it, so the kernel
/// schedules all of them onto the PMU together. Only user-space events of the
/// calling thread are counted, on whichever CPU it runs.
#[derive(Debug, Default)]
pub struct PerfEvents {
    // Leader first. `None` until a group is created.
    group: Option<Vec<File>>,
}

impl PerfEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self) -> io::Result<&Vec<File>> {
        self.group.as_ref().ok_or_else(einval)
    }

    fn leader(&self) -> io::Result<&File> {
        self.group()?.first().ok_or_else(einval)
    }

    fn group_ioctl(&self, op: GroupIoctl) -> io::Result<()> {
        let fd = self.leader()?.as_raw_fd();
        if unsafe { op(fd, PERF_IOC_FLAG_GROUP as libc::c_uint) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl CounterSubsystem for PerfEvents {
    fn describe(&self) -> &'static str {
        "perf_event"
    }

    fn lookup(&self, name: &str) -> Option<EventHandle> {
        Preset::from_name(name).map(|p| EventHandle::new(p.index()))
    }

    fn create_group(&mut self) -> io::Result<()> {
        if !Path::new(PERF_PARANOID).exists() {
            return Err(io::Error::from_raw_os_error(libc::ENOSYS));
        }
        if self.group.is_some() {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }

        self.group = Some(Vec::new());
        Ok(())
    }

    fn add_events(&mut self, handles: &[EventHandle]) -> io::Result<()> {
        if !self.group()?.is_empty() {
            return Err(einval());
        }

        // Any descriptors opened before a failure are closed when `files`
        // goes out of scope, leaving the group empty.
        let mut files: Vec<File> = Vec::with_capacity(handles.len());
        for handle in handles {
            let preset = Preset::from_index(handle.code()).ok_or_else(einval)?;
            let (type_, config) = encode(preset);
            let file = open_counter(type_, config, files.first())?;
            files.push(file);
        }

        self.group = Some(files);
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        self.group_ioctl(ioctls::ENABLE)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.group_ioctl(ioctls::RESET)
    }

    fn read(&mut self, values: &mut [i64]) -> io::Result<()> {
        let n = self.group()?.len();
        if values.len() != n {
            return Err(einval());
        }

        // PERF_FORMAT_GROUP layout: { u64 nr; u64 values[nr]; }
        let mut buf = vec![0u64; n + 1];
        let want = buf.len() * mem::size_of::<u64>();
        let fd = self.leader()?.as_raw_fd();
        let got = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, want) };
        if got < 0 {
            return Err(io::Error::last_os_error());
        }
        if got as usize != want || buf[0] as usize != n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from counter group",
            ));
        }

        for (dst, src) in values.iter_mut().zip(&buf[1..]) {
            *dst = *src as i64;
        }
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        let files = match self.group.take() {
            Some(files) => files,
            None => return Ok(()),
        };

        let mut res = Ok(());
        if let Some(leader) = files.first() {
            let flags = PERF_IOC_FLAG_GROUP as libc::c_uint;
            if unsafe { ioctls::DISABLE(leader.as_raw_fd(), flags) } < 0 {
                res = Err(io::Error::last_os_error());
            }
        }

        // Closing the descriptors frees the PMU slots.
        drop(files);
        res
    }
}

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

fn hw_cache(cache: u32, op: u32, result: u32) -> u64 {
    u64::from(cache) | (u64::from(op) << 8) | (u64::from(result) << 16)
}

/// Map a preset onto a perf event `(type, config)` pair.
fn encode(preset: Preset) -> (u32, u64) {
    let hw = PERF_TYPE_HARDWARE as u32;
    let cache = PERF_TYPE_HW_CACHE as u32;
    let read = PERF_COUNT_HW_CACHE_OP_READ as u32;
    let access = PERF_COUNT_HW_CACHE_RESULT_ACCESS as u32;
    let miss = PERF_COUNT_HW_CACHE_RESULT_MISS as u32;

    match preset {
        Preset::TotalInstructions => (hw, PERF_COUNT_HW_INSTRUCTIONS as u64),
        Preset::TotalCycles => (hw, PERF_COUNT_HW_CPU_CYCLES as u64),
        Preset::BranchInstructions => (hw, PERF_COUNT_HW_BRANCH_INSTRUCTIONS as u64),
        Preset::BranchMispredictions => (hw, PERF_COUNT_HW_BRANCH_MISSES as u64),
        Preset::L1DataAccesses => (cache, hw_cache(PERF_COUNT_HW_CACHE_L1D as u32, read, access)),
        Preset::L1DataMisses => (cache, hw_cache(PERF_COUNT_HW_CACHE_L1D as u32, read, miss)),
        Preset::LastLevelAccesses => (hw, PERF_COUNT_HW_CACHE_REFERENCES as u64),
        Preset::LastLevelMisses => (hw, PERF_COUNT_HW_CACHE_MISSES as u64),
        Preset::DataTlbMisses => (cache, hw_cache(PERF_COUNT_HW_CACHE_DTLB as u32, read, miss)),
    }
}

/// Open one counter for the calling thread on any CPU.
///
/// Without a `leader` the counter becomes a new, disabled group leader that
/// reads back every member at once; otherwise it joins the leader's group and
/// follows its enabled state.
fn open_counter(type_: u32, config: u64, leader: Option<&File>) -> io::Result<File> {
    let mut attrs = perf_event_attr {
        size: mem::size_of::<perf_event_attr>() as u32,
        type_,
        config,
        ..perf_event_attr::default()
    };
    attrs.set_exclude_kernel(1);
    attrs.set_exclude_hv(1);

    let group_fd = match leader {
        Some(f) => f.as_raw_fd(),
        None => {
            attrs.set_disabled(1);
            attrs.read_format = PERF_FORMAT_GROUP as u64;
            -1
        }
    };

    let fd = unsafe {
        perf_event_open(
            &mut attrs,
            0,
            -1,
            group_fd,
            PERF_FLAG_FD_CLOEXEC as libc::c_ulong,
        )
    };
    match fd {
        -1 => Err(io::Error::last_os_error()),
        fd if fd < 0 => Err(io::Error::from_raw_os_error(-fd)),
        fd => Ok(unsafe { File::from_raw_fd(fd) }),
    }
}
