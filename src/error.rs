// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The error taxonomy used throughout the crate.
//!
//! Every fallible routine in the original sources returns a small int
//! (`0 = failure`) or a tagged pointer; here that collapses to a single
//! [`Result`] alias over [`Error`], with one variant per row of the error
//! taxonomy table.

use std::fmt;
use std::io;

/// Kind of failure, independent of the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// VG/LV/PV with given name or uuid absent.
    NotFound,
    /// On-disk MDA copies disagree, or a CRC check failed.
    Inconsistent,
    /// A required PV is absent.
    MissingPv,
    /// `stat`/`read`/`write`/`ioctl` failed.
    Io,
    /// Parse error in metadata.
    Format,
    /// Caller-supplied values violate a documented precondition.
    InvalidArgument,
    /// The VG lock could not be acquired.
    Locked,
    /// The LV is active, or a dependent resource is in use.
    Busy,
    /// Allocation could not satisfy the request.
    OutOfSpace,
    /// The format or segment type lacks the requested capability.
    UnsupportedFeature,
    /// An impossible state was reached.
    Internal,
}

/// The crate's error type.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    io: Option<io::Error>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, msg: S) -> Error {
        Error {
            kind,
            msg: msg.into(),
            io: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Mirrors the `INTERNAL_ERROR` prefix the sources apply to impossible
    /// states.
    pub fn internal<S: Into<String>>(msg: S) -> Error {
        Error::new(ErrorKind::Internal, format!("INTERNAL_ERROR: {}", msg.into()))
    }

    /// Attaches a `(file, line)` breadcrumb the way the `stack;` macro does
    /// in the C sources, via the `log` crate rather than stderr.
    #[track_caller]
    pub fn stack(self) -> Error {
        let loc = std::panic::Location::caller();
        log::trace!("{}:{}: {}", loc.file(), loc.line(), self.msg);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.io.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error {
            kind: ErrorKind::Io,
            msg: err.to_string(),
            io: Some(err),
        }
    }
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Error {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

/// Shorthand for constructing an [`Error`] with a given kind, the way
/// `log_error` plus a `return 0` reads at each call site in the sources.
macro_rules! err {
    ($kind:expr, $($arg:tt)*) => {
        $crate::error::Error::new($kind, format!($($arg)*))
    };
}
pub(crate) use err;
