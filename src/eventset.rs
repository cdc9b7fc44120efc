use std::fmt;

use tracing::{debug, warn};

use crate::error::{new_error, new_os_error, Error, ErrorKind};
use crate::events::EventHandle;
use crate::subsystem::CounterSubsystem;

/// The lifecycle position of an [`EventSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Allocated, no events added yet.
    Created,
    /// Events added, not yet counting.
    Populated,
    /// Counting.
    Started,
    /// Native resources released. Terminal.
    ShutDown,
}

impl State {
    fn as_str(self) -> &'static str {
        match self {
            State::Created => "empty",
            State::Populated => "not started",
            State::Started => "already started",
            State::ShutDown => "shut down",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading of every counter in an [`EventSet`].
///
/// Value `i` is the count for handle `i` passed to [`EventSet::populate`],
/// accumulated since the last reset (or since the set was started).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSample(Vec<i64>);

impl CounterSample {
    /// The counter values, in event order.
    pub fn values(&self) -> &[i64] {
        &self.0
    }

    /// The number of counters read.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no counters were read.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<i64>> for CounterSample {
    fn from(values: Vec<i64>) -> Self {
        CounterSample(values)
    }
}

/// The single counter group owned by this process.
///
/// An `EventSet` moves through `create` → [`populate`] → [`start`] → any
/// number of [`reset`]/[`read`] cycles → [`shutdown`]. Counting operations
/// are only reachable through the [`Running`] handle returned by `start`, so
/// a set cannot be read or reset before it is started, nor populated once it
/// is running.
///
/// Dropping the set shuts it down.
///
/// ```no_run
/// # use memprobe::{EventSet, EventSpec, Registry, subsystem::Native};
/// let native = Native::new();
/// let handles = Registry::new(&native).resolve(&EventSpec::default())?;
///
/// let mut set = EventSet::create(native)?;
/// set.populate(&handles)?;
///
/// let mut running = set.start()?;
/// running.reset()?;
/// let sample = running.read()?;
/// assert_eq!(sample.len(), handles.len());
/// #
/// # Ok::<(), memprobe::Error>(())
/// ```
///
/// [`populate`]: EventSet::populate
/// [`start`]: EventSet::start
/// [`reset`]: Running::reset
/// [`read`]: Running::read
/// [`shutdown`]: EventSet::shutdown
pub struct EventSet<S: CounterSubsystem> {
    subsystem: S,
    state: State,
    len: usize,
}

impl<S: CounterSubsystem> EventSet<S> {
    /// Allocate an empty counter group on `subsystem`.
    pub fn create(mut subsystem: S) -> Result<Self, Error> {
        subsystem
            .create_group()
            .map_err(|e| new_os_error(ErrorKind::GroupCreateFailed, e))?;

        debug!(subsystem = subsystem.describe(), "created event set");
        Ok(EventSet {
            subsystem,
            state: State::Created,
            len: 0,
        })
    }

    /// The current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The number of events added by [`populate`](EventSet::populate).
    pub fn len(&self) -> usize {
        self.len
    }

    /// True until events have been added.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The native subsystem backing this set.
    pub fn subsystem(&self) -> &S {
        &self.subsystem
    }

    fn expect(&self, op: &'static str, want: State) -> Result<(), Error> {
        if self.state != want {
            return Err(new_error(ErrorKind::InvalidState {
                op,
                state: self.state.as_str(),
            }));
        }
        Ok(())
    }

    /// Add every handle to the group in one batch.
    pub fn populate(&mut self, handles: &[EventHandle]) -> Result<(), Error> {
        self.expect("populate", State::Created)?;
        if handles.is_empty() {
            return Err(new_error(ErrorKind::InvalidEventSpec(
                "no events given".to_string(),
            )));
        }

        self.subsystem
            .add_events(handles)
            .map_err(|e| new_os_error(ErrorKind::AddEventsFailed, e))?;

        self.len = handles.len();
        self.state = State::Populated;
        debug!(events = self.len, "populated event set");
        Ok(())
    }

    /// Start counting.
    ///
    /// Counting continues until the set is shut down; dropping the returned
    /// handle does not stop it.
    #[must_use = "counters can only be read through the returned handle"]
    pub fn start(&mut self) -> Result<Running<'_, S>, Error> {
        self.expect("start", State::Populated)?;

        self.subsystem
            .start()
            .map_err(|e| new_os_error(ErrorKind::StartFailed, e))?;

        self.state = State::Started;
        debug!("started event set");
        Ok(Running { set: self })
    }

    /// Release every native resource held by the group.
    ///
    /// Safe to call in any state and more than once. A failure to release is
    /// logged and otherwise ignored.
    pub fn shutdown(&mut self) {
        if self.state == State::ShutDown {
            return;
        }

        if let Err(e) = self.subsystem.release() {
            warn!(
                error = %e,
                subsystem = self.subsystem.describe(),
                "failed to release counters"
            );
        }
        self.state = State::ShutDown;
        debug!("shut down event set");
    }
}

impl<S: CounterSubsystem> fmt::Debug for EventSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSet")
            .field("subsystem", &self.subsystem.describe())
            .field("state", &self.state)
            .field("len", &self.len)
            .finish()
    }
}

impl<S: CounterSubsystem> Drop for EventSet<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A handle to a started [`EventSet`].
pub struct Running<'a, S: CounterSubsystem> {
    set: &'a mut EventSet<S>,
}

impl<'a, S: CounterSubsystem> Running<'a, S> {
    /// Zero every counter without stopping them.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.set
            .subsystem
            .reset()
            .map_err(|e| new_os_error(ErrorKind::ResetFailed, e))
    }

    /// Read every counter, in the order the events were added.
    pub fn read(&mut self) -> Result<CounterSample, Error> {
        let mut values = vec![0; self.set.len];
        self.set
            .subsystem
            .read(&mut values)
            .map_err(|e| new_os_error(ErrorKind::ReadFailed, e))?;

        Ok(CounterSample(values))
    }
}
