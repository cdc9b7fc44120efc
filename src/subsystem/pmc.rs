use std::cell::RefCell;
use std::ffi::CString;
use std::io;
use std::sync::{Mutex, Once};

use pmc_sys::{
    pmc_allocate, pmc_attach, pmc_id_t, pmc_init, pmc_mode_PMC_MODE_TC, pmc_read, pmc_release,
    pmc_rw, pmc_start, pmc_stop, PMC_CPU_ANY,
};

use super::CounterSubsystem;
use crate::events::EventHandle;
use crate::preset::Preset;

static PMC_INIT: Once = Once::new();

// Handles at or above this code name a native libpmc event spec rather than a
// preset.
const NATIVE_BASE: u32 = 0x1000;

lazy_static! {
    static ref BIG_FAT_LOCK: Mutex<u32> = Mutex::new(42);
}

/// Counters backed by FreeBSD's `libpmc` and the `hwpmc` kernel module.
///
/// Every event is a separate process-scoped counting PMC attached to the
/// calling process. The group is started, reset and read one PMC at a time.
///
/// Presets are mapped to `hwpmc` event names. Any other name is passed to
/// `pmc_allocate` as a native event spec (`LOCK.FAILED`, `instructions`), so
/// a name the CPU does not support fails when the events are added.
#[derive(Debug, Default)]
pub struct Pmc {
    ids: Option<Vec<pmc_id_t>>,
    running: bool,
    native: RefCell<Vec<CString>>,
}

impl Pmc {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> io::Result<&[pmc_id_t]> {
        self.ids
            .as_deref()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }

    fn native(&self, name: &str) -> Option<EventHandle> {
        let spec = CString::new(name).ok()?;
        let mut native = self.native.borrow_mut();
        let idx = match native.iter().position(|s| *s == spec) {
            Some(idx) => idx,
            None => {
                native.push(spec);
                native.len() - 1
            }
        };
        Some(EventHandle::new(NATIVE_BASE + idx as u32))
    }

    /// The `pmc_allocate` spec for a handle returned by `lookup`.
    fn spec(&self, handle: EventHandle) -> Option<CString> {
        let code = handle.code();
        if code >= NATIVE_BASE {
            return self.native.borrow().get((code - NATIVE_BASE) as usize).cloned();
        }
        Preset::from_index(code)
            .map(pmc_name)
            .and_then(|s| CString::new(s).ok())
    }
}

/// The `libpmc` event name for a preset.
///
/// Generic `hwpmc` aliases where one exists, otherwise the architectural
/// Intel event.
fn pmc_name(preset: Preset) -> &'static str {
    match preset {
        Preset::TotalInstructions => "instructions",
        Preset::TotalCycles => "unhalted-cycles",
        Preset::BranchInstructions => "branches",
        Preset::BranchMispredictions => "branch-mispredicts",
        Preset::L1DataAccesses => "MEM_INST_RETIRED.ALL_LOADS",
        Preset::L1DataMisses => "dc-misses",
        Preset::LastLevelAccesses => "LONGEST_LAT_CACHE.REFERENCE",
        Preset::LastLevelMisses => "LONGEST_LAT_CACHE.MISS",
        Preset::DataTlbMisses => "DTLB_LOAD_MISSES.MISS_CAUSES_A_WALK",
    }
}

fn check(rv: libc::c_int) -> io::Result<()> {
    if rv != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl CounterSubsystem for Pmc {
    fn describe(&self) -> &'static str {
        "hwpmc"
    }

    fn lookup(&self, name: &str) -> Option<EventHandle> {
        match Preset::from_name(name) {
            Some(p) => Some(EventHandle::new(p.index())),
            None => self.native(name),
        }
    }

    fn create_group(&mut self) -> io::Result<()> {
        init_pmc_once()?;
        if self.ids.is_some() {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        self.ids = Some(Vec::new());
        Ok(())
    }

    fn add_events(&mut self, handles: &[EventHandle]) -> io::Result<()> {
        if !self.ids()?.is_empty() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        // It appears pmc_allocate isn't thread safe, so take a lock while
        // calling it.
        let _guard = BIG_FAT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut ids = Vec::with_capacity(handles.len());
        for handle in handles {
            let spec = match self.spec(*handle) {
                Some(spec) => spec,
                None => {
                    release_all(&ids);
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }
            };

            let mut id = 0;
            let res = check(unsafe {
                pmc_allocate(spec.as_ptr(), pmc_mode_PMC_MODE_TC, 0, PMC_CPU_ANY, &mut id, 0)
            });
            if let Err(e) = res {
                release_all(&ids);
                return Err(e);
            }
            ids.push(id);

            // PID 0 attaches to the calling process.
            if let Err(e) = check(unsafe { pmc_attach(id, 0) }) {
                release_all(&ids);
                return Err(e);
            }
        }

        self.ids = Some(ids);
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        for id in self.ids()? {
            check(unsafe { pmc_start(*id) })?;
        }
        self.running = true;
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        // hwpmc refuses to write a running PMC (EBUSY).
        for id in self.ids()? {
            let mut old = 0;
            check(unsafe { pmc_stop(*id) })?;
            check(unsafe { pmc_rw(*id, 0, &mut old) })?;
            check(unsafe { pmc_start(*id) })?;
        }
        Ok(())
    }

    fn read(&mut self, values: &mut [i64]) -> io::Result<()> {
        let ids = self.ids()?;
        if ids.len() != values.len() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        for (id, dst) in ids.iter().zip(values.iter_mut()) {
            let mut value: u64 = 0;
            check(unsafe { pmc_read(*id, &mut value) })?;
            *dst = value as i64;
        }
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        let ids = match self.ids.take() {
            Some(ids) => ids,
            None => return Ok(()),
        };

        let _guard = BIG_FAT_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        // BUG: do not attempt to detach from pid 0 or risk live-locking the
        // machine.
        //
        //      https://bugs.freebsd.org/bugzilla/show_bug.cgi?id=227041
        //
        // Releasing the PMC detaches it.
        let mut res = Ok(());
        for id in ids {
            if self.running {
                unsafe { pmc_stop(id) };
            }
            if unsafe { pmc_release(id) } != 0 && res.is_ok() {
                res = Err(io::Error::last_os_error());
            }
        }
        self.running = false;
        res
    }
}

fn release_all(ids: &[pmc_id_t]) {
    for id in ids {
        unsafe { pmc_release(*id) };
    }
}

fn init_pmc_once() -> io::Result<()> {
    let mut maybe_err = Ok(());
    PMC_INIT.call_once(|| {
        maybe_err = check(unsafe { pmc_init() });
    });
    maybe_err
}
