use serde::Serialize;
use std::fmt;
use std::panic::Location;

/// Source location in client code that issued an allocation or free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const UNKNOWN: CallSite = CallSite { file: "?", line: 0 };

    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The location of whoever called the `#[track_caller]` function this is
    /// invoked from.
    #[track_caller]
    #[inline]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
