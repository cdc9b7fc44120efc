//! `memprobe` command line.
//!
//! ```text
//! usage: memprobe [-t sec] [EVENT...]
//! ```
//!
//! Run it directly for a single local measurement, or, when built with the
//! `mpi` feature, under `mpirun` to measure every rank:
//!
//! ```text
//! mpirun -n 4 memprobe -t 30 PAPI_L1_DCM PAPI_L3_TCM
//! ```
//!
//! Set `RUST_LOG=memprobe=debug` to trace the counter lifecycle.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process;

use memprobe::coordinator::{self, Coordinator};
use memprobe::{
    parse_args, report, subsystem, watchdog, AbortHandle, Error, Identity, Invocation,
    Measurement, RandomTouch, Watchdog,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memprobe=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<OsString> = env::args_os().collect();
    let program = args
        .first()
        .and_then(|a| Path::new(a).file_name())
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_else(|| "memprobe".to_string());

    // The group substrate comes up before anything else, argument parsing
    // included, so that every rank can be torn down on a usage error.
    let group = match coordinator::Native::init() {
        Ok(group) => group,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            process::exit(1);
        }
    };
    let id = group.identity();
    let abort = group.abort_handle();

    let config = match parse_args(&args) {
        Ok(Invocation::Measure(config)) => config,
        Ok(Invocation::Info(text)) => {
            if id.is_leader() {
                print!("{}", text);
            }
            return;
        }
        Err(e) => fatal(&program, id, abort, &e),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if id.is_leader() {
        let banner = report::write_events(&mut out, config.events())
            .and_then(|_| report::write_options(&mut out, id, &config));
        if let Err(e) = banner {
            fatal(&program, id, abort, &Error::from(e));
        }
    }

    let timeout = config.timeout();
    let dog_program = program.clone();
    let mut dog = match Watchdog::arm(timeout, move || {
        watchdog::expire(&mut io::stderr(), &dog_program, timeout, id, abort)
    }) {
        Ok(dog) => dog,
        Err(e) => fatal(&program, id, abort, &e),
    };

    let measurement = Measurement::new(&config, id, subsystem::Native::new(), RandomTouch::new());
    if let Err(e) = measurement.run(&mut out, &mut io::stderr()) {
        fatal(&program, id, abort, &e);
    }

    group.barrier();
    dog.disarm();
}

/// Report `err` and tear down the whole group.
///
/// Usage errors are identical on every rank, so only rank 0 prints them.
fn fatal(program: &str, id: Identity, abort: AbortHandle, err: &Error) -> ! {
    if !err.is_usage() || id.is_leader() {
        eprintln!("{}: {}", program, err);
    }
    abort.abort(1)
}
