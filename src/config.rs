use std::ffi::OsString;
use std::time::Duration;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser};

use crate::error::{new_error, Error, ErrorKind};
use crate::events::EventSpec;
use crate::workload::WORKLOAD_BYTES;

/// Watchdog timeout used when `-t` is not given.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Parser, Debug)]
#[command(name = "memprobe", version)]
#[command(about = "Measure cache behaviour of a memory workload on every rank of a process group")]
struct Cli {
    /// Timeout (alarm), in seconds. 0 disables the watchdog.
    #[arg(
        short = 't',
        value_name = "sec",
        default_value_t = DEFAULT_TIMEOUT_SECS as i64,
        allow_negative_numbers = true
    )]
    timeout: i64,

    /// Hardware events to count, in report order (default: PAPI_L1_DCM
    /// PAPI_L1_DCA PAPI_L3_TCM PAPI_L3_TCA)
    #[arg(value_name = "EVENT")]
    events: Vec<String>,
}

/// Everything a measurement run needs, fixed once the command line is parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    timeout: Duration,
    events: EventSpec,
    workload_bytes: usize,
    passes: usize,
}

impl RunConfiguration {
    /// A single-pass configuration touching [`WORKLOAD_BYTES`].
    pub fn new(timeout: Duration, events: EventSpec) -> Self {
        RunConfiguration {
            timeout,
            events,
            workload_bytes: WORKLOAD_BYTES,
            passes: 1,
        }
    }

    /// Override the workload size. Used to stress a different cache level.
    pub fn with_workload_bytes(self, workload_bytes: usize) -> Self {
        Self {
            workload_bytes,
            ..self
        }
    }

    /// Run `passes` reset/run/read cycles instead of one.
    pub fn with_passes(self, passes: usize) -> Self {
        Self {
            passes: passes.max(1),
            ..self
        }
    }

    /// The watchdog timeout. Zero disables the watchdog.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The events to count, in report order.
    pub fn events(&self) -> &EventSpec {
        &self.events
    }

    /// Bytes touched by the workload in each pass.
    pub fn workload_bytes(&self) -> usize {
        self.workload_bytes
    }

    /// Number of reset/run/read cycles.
    pub fn passes(&self) -> usize {
        self.passes
    }
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            EventSpec::default(),
        )
    }
}

/// What the command line asked for.
#[derive(Debug, PartialEq)]
pub enum Invocation {
    /// Run a measurement pass.
    Measure(RunConfiguration),
    /// Print the text (help or version) and exit successfully.
    Info(String),
}

/// Parse a command line, including the program name in `args[0]`.
pub fn parse_args<I, T>(args: I) -> Result<Invocation, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                return Ok(Invocation::Info(e.render().to_string()));
            }
            _ => {
                return Err(new_error(ErrorKind::Usage(
                    e.render().to_string().trim_end().to_string(),
                )))
            }
        },
    };

    if cli.timeout < 0 {
        return Err(usage("bad timeout"));
    }

    let events = if cli.events.is_empty() {
        EventSpec::default()
    } else {
        EventSpec::new(cli.events)?
    };

    Ok(Invocation::Measure(RunConfiguration::new(
        Duration::from_secs(cli.timeout as u64),
        events,
    )))
}

fn usage(msg: &str) -> Error {
    let usage = Cli::command().render_usage();
    new_error(ErrorKind::Usage(format!("{}\n{}", msg, usage)))
}
