#![allow(missing_docs)]

use std::{error, fmt, io};

use thiserror::Error as ThisError;

/// A fatal error. Every `Error` terminates the whole process group.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    cause: Option<Box<dyn error::Error + Send + Sync>>,
}

#[derive(Debug, PartialEq, ThisError)]
pub enum ErrorKind {
    /// The command line could not be parsed.
    #[error("{0}")]
    Usage(String),

    /// The event list is empty, too long, or contains a malformed name.
    #[error("invalid event list: {0}")]
    InvalidEventSpec(String),

    /// The counter subsystem does not recognise the named event.
    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    /// The process group substrate failed to initialise or answer a query.
    #[error("{0}")]
    Coordination(String),

    /// A counter group could not be allocated.
    ///
    /// Usually the platform has no usable performance counters, or the
    /// caller lacks the permissions to use them.
    #[error("create event set")]
    GroupCreateFailed,

    /// The subsystem rejected the batch of events, typically because the
    /// combination is unsupported or the hardware ran out of counter slots.
    #[error("add events")]
    AddEventsFailed,

    #[error("start")]
    StartFailed,

    #[error("reset")]
    ResetFailed,

    #[error("read")]
    ReadFailed,

    /// An event set operation was invoked out of order.
    #[error("cannot {op} an event set that is {state}")]
    InvalidState {
        op: &'static str,
        state: &'static str,
    },

    /// Writing the report failed.
    #[error("write report")]
    Output,
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|b| b.as_ref() as &(dyn error::Error + 'static))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.cause {
            Some(ref cause) => write!(f, "{}: {}", self.kind, cause),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[doc(hidden)]
impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        self.kind == other.kind
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// True for errors caused by the command line rather than the
    /// environment. Only rank 0 reports these.
    pub fn is_usage(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Usage(_) | ErrorKind::InvalidEventSpec(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        new_os_error(ErrorKind::Output, e)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        new_error(kind)
    }
}

/// Wrap a native subsystem error with the operation that produced it.
pub(crate) fn new_os_error(kind: ErrorKind, cause: io::Error) -> Error {
    Error {
        kind,
        cause: Some(Box::new(cause)),
    }
}

pub(crate) fn new_error(kind: ErrorKind) -> Error {
    Error { kind, cause: None }
}
