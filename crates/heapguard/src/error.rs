use thiserror::Error;

use crate::location::CallSite;

/// Why an allocation request produced no memory. Always recoverable: the
/// failure is counted and the caller decides what to do next.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("size overflow: {requested} bytes plus bookkeeping does not fit")]
    SizeOverflow { requested: usize },
    #[error("array size overflow: {count} * {size} does not fit")]
    ArrayOverflow { count: usize, size: usize },
    #[error("base allocator exhausted: {requested} bytes requested")]
    Exhausted { requested: usize },
}

/// A live block that strictly contains a pointer handed to `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Containing {
    pub site: CallSite,
    pub payload: usize,
    pub offset: usize,
    pub size: usize,
}

/// Heap corruption found while validating a free. Never recoverable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    #[error("not in heap")]
    NotInHeap,
    #[error("not allocated")]
    NotAllocated { containing: Option<Containing> },
    #[error("double free")]
    DoubleFree,
    #[error("wild write")]
    WildWrite,
}

/// A rejected free together with where it happened.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{site}: invalid free of pointer {ptr:#x}, {reason}")]
pub struct InvalidFree {
    pub site: CallSite,
    pub ptr: usize,
    #[source]
    pub reason: FreeError,
}

impl InvalidFree {
    /// Follow-up line pointing at the block the pointer landed inside.
    pub fn hint(&self) -> Option<String> {
        match self.reason {
            FreeError::NotAllocated {
                containing: Some(c),
            } => Some(format!(
                "  {}: {:#x} is {} bytes inside a {} byte region allocated here",
                c.site, self.ptr, c.offset, c.size
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_free_message() {
        let err = InvalidFree {
            site: CallSite::new("test.rs", 12),
            ptr: 0x1234,
            reason: FreeError::WildWrite,
        };
        assert_eq!(
            err.to_string(),
            "test.rs:12: invalid free of pointer 0x1234, wild write"
        );
        assert_eq!(err.hint(), None);
    }

    #[test]
    fn test_containing_hint() {
        let err = InvalidFree {
            site: CallSite::new("test.rs", 20),
            ptr: 0x1010,
            reason: FreeError::NotAllocated {
                containing: Some(Containing {
                    site: CallSite::new("test.rs", 10),
                    payload: 0x1000,
                    offset: 16,
                    size: 64,
                }),
            },
        };
        assert_eq!(
            err.to_string(),
            "test.rs:20: invalid free of pointer 0x1010, not allocated"
        );
        assert_eq!(
            err.hint().unwrap(),
            "  test.rs:10: 0x1010 is 16 bytes inside a 64 byte region allocated here"
        );
    }
}
