//! Human-readable output. Banners are written by rank 0 only; every rank
//! writes its own counter report.

use std::io::{self, Write};

use crate::config::RunConfiguration;
use crate::coordinator::Identity;
use crate::eventset::CounterSample;
use crate::events::EventSpec;

/// The list of monitored events.
pub fn write_events<W: Write>(out: &mut W, events: &EventSpec) -> io::Result<()> {
    writeln!(out, "== Events:")?;
    for name in events.iter() {
        writeln!(out, " > {}", name)?;
    }
    Ok(())
}

/// The run configuration, followed by a blank line.
pub fn write_options<W: Write>(
    out: &mut W,
    id: Identity,
    config: &RunConfiguration,
) -> io::Result<()> {
    writeln!(out, "== Program options:")?;
    writeln!(out, " > rank       = {}", id.rank)?;
    writeln!(out, " > size       = {}", id.size)?;
    writeln!(out, " > timeout    = {} secs", config.timeout().as_secs())?;
    writeln!(out)
}

/// One `name: value` line per event, in event order.
///
/// The block is rendered first and written with a single call so reports
/// from different ranks sharing a terminal do not interleave.
pub fn write_report<W: Write>(
    out: &mut W,
    id: Identity,
    events: &EventSpec,
    sample: &CounterSample,
) -> io::Result<()> {
    let mut block = format!("== Counters (rank {}):\n", id.rank);
    for (name, value) in events.iter().zip(sample.values()) {
        block.push_str(&format!("{}: {}\n", name, value));
    }
    out.write_all(block.as_bytes())?;
    out.flush()
}
