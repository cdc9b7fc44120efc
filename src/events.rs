use std::ops::Deref;

use tracing::debug;

use crate::error::{new_error, Error, ErrorKind};
use crate::subsystem::CounterSubsystem;

/// The maximum number of events a single run may monitor.
pub const MAX_EVENTS: usize = 16;

/// Events monitored when none are named on the command line: L1 data cache
/// misses and accesses, then last-level cache misses and accesses.
pub const DEFAULT_EVENTS: [&str; 4] = ["PAPI_L1_DCM", "PAPI_L1_DCA", "PAPI_L3_TCM", "PAPI_L3_TCA"];

/// An ordered, bounded list of event names.
///
/// The order is significant: counter values are reported in the same order,
/// and value `i` of a [`CounterSample`] always belongs to name `i`.
///
/// [`CounterSample`]: crate::CounterSample
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec(Vec<String>);

impl EventSpec {
    /// Validate a list of 1 to [`MAX_EVENTS`] non-empty event names.
    pub fn new<I, S>(names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(new_error(ErrorKind::InvalidEventSpec(
                "no events given".to_string(),
            )));
        }
        if names.len() > MAX_EVENTS {
            return Err(new_error(ErrorKind::InvalidEventSpec(format!(
                "{} events given, at most {} supported",
                names.len(),
                MAX_EVENTS
            ))));
        }
        for name in &names {
            if name.is_empty() {
                return Err(new_error(ErrorKind::InvalidEventSpec(
                    "empty event name".to_string(),
                )));
            }
            if name.contains('\0') {
                return Err(new_error(ErrorKind::InvalidEventSpec(format!(
                    "event name {:?} contains a NUL byte",
                    name
                ))));
            }
        }

        Ok(EventSpec(names))
    }

    /// The event names, in monitoring order.
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl Default for EventSpec {
    fn default() -> Self {
        EventSpec(DEFAULT_EVENTS.iter().map(|s| s.to_string()).collect())
    }
}

impl Deref for EventSpec {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

/// An opaque, subsystem-specific identifier for a named event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u32);

impl EventHandle {
    /// Wrap a raw subsystem event code.
    pub fn new(code: u32) -> Self {
        EventHandle(code)
    }

    /// The raw subsystem event code.
    pub fn code(self) -> u32 {
        self.0
    }
}

/// Translates event names into handles understood by a counter subsystem.
pub struct Registry<'a, S: ?Sized> {
    subsystem: &'a S,
}

impl<'a, S: CounterSubsystem + ?Sized> Registry<'a, S> {
    /// A registry resolving names against `subsystem`.
    pub fn new(subsystem: &'a S) -> Self {
        Registry { subsystem }
    }

    /// Resolve every name in `spec`, preserving order.
    ///
    /// Fails with [`ErrorKind::UnknownEvent`] naming the first event the
    /// subsystem does not recognise. A partially resolved set is never
    /// returned.
    pub fn resolve(&self, spec: &EventSpec) -> Result<Vec<EventHandle>, Error> {
        spec.iter()
            .map(|name| match self.subsystem.lookup(name) {
                Some(handle) => {
                    debug!(event = %name, code = handle.code(), "resolved event");
                    Ok(handle)
                }
                None => Err(new_error(ErrorKind::UnknownEvent(name.clone()))),
            })
            .collect()
    }
}
