use std::io::Write;

use tracing::{debug, warn};

use crate::config::RunConfiguration;
use crate::coordinator::Identity;
use crate::error::{new_os_error, Error, ErrorKind};
use crate::events::{EventHandle, Registry};
use crate::eventset::{CounterSample, EventSet};
use crate::report;
use crate::subsystem::CounterSubsystem;
use crate::workload::Workload;

/// A single measurement run: resolve the events, build and start one counter
/// group, then for each pass reset the counters, run the workload, read the
/// counters back and report them.
///
/// The counter group is always shut down before [`run`](Measurement::run)
/// returns, whether or not the run succeeded.
pub struct Measurement<'a, S, W> {
    config: &'a RunConfiguration,
    identity: Identity,
    subsystem: S,
    workload: W,
}

impl<'a, S, W> Measurement<'a, S, W>
where
    S: CounterSubsystem,
    W: Workload,
{
    /// Prepare a run of `workload` on `subsystem`.
    pub fn new(config: &'a RunConfiguration, identity: Identity, subsystem: S, workload: W) -> Self {
        Measurement {
            config,
            identity,
            subsystem,
            workload,
        }
    }

    /// Run every pass, writing reports to `out` and workload diagnostics to
    /// `diag`. Returns one sample per pass.
    ///
    /// A workload failure is reported to `diag` and the pass carries on; any
    /// counter failure ends the run with an error.
    pub fn run<O, D>(self, out: &mut O, diag: &mut D) -> Result<Vec<CounterSample>, Error>
    where
        O: Write,
        D: Write,
    {
        let Measurement {
            config,
            identity,
            subsystem,
            mut workload,
        } = self;

        let handles = Registry::new(&subsystem).resolve(config.events())?;

        let mut set = EventSet::create(subsystem)?;
        let res = drive(
            &mut set,
            &handles,
            config,
            identity,
            &mut workload,
            out,
            diag,
        );
        set.shutdown();

        res
    }
}

fn drive<S, W, O, D>(
    set: &mut EventSet<S>,
    handles: &[EventHandle],
    config: &RunConfiguration,
    identity: Identity,
    workload: &mut W,
    out: &mut O,
    diag: &mut D,
) -> Result<Vec<CounterSample>, Error>
where
    S: CounterSubsystem,
    W: Workload,
    O: Write,
    D: Write,
{
    set.populate(handles)?;
    let mut running = set.start()?;

    let bytes = config.workload_bytes();
    let mut samples = Vec::with_capacity(config.passes());

    for pass in 0..config.passes() {
        running.reset()?;

        let written = match workload.run(bytes) {
            Ok(()) => writeln!(diag, "{} MiB: OK", bytes >> 20),
            Err(e) => {
                warn!(pass, error = %e, "workload failed, reading counters anyway");
                writeln!(diag, "{}", e)
            }
        };
        if let Err(e) = written {
            warn!(pass, error = %e, "failed to write workload status");
        }

        let sample = running.read()?;
        debug!(pass, values = ?sample.values(), "read counters");

        report::write_report(out, identity, config.events(), &sample)
            .map_err(|e| new_os_error(ErrorKind::Output, e))?;
        samples.push(sample);
    }

    Ok(samples)
}
