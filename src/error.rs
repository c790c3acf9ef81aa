//! Custom error types
//!
//! [`LookupError`] is the terminal outcome of an unsuccessful lookup; it is
//! the only failure that reaches a caller of the routing interface. Every
//! other failure is folded into membership updates on the node that
//! observed it.
//!
//! [`LookupError`]: enum.LookupError.html

use std::error::Error;
use std::fmt;

/// Terminal outcome of an unsuccessful lookup
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No peer reported responsibility for the key.
    KeyNotFound,
    /// The lookup did not complete within its deadline.
    Timeout,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::KeyNotFound => write!(f, "no responsible peer found for key"),
            LookupError::Timeout => write!(f, "lookup timed out"),
        }
    }
}

impl Error for LookupError {}
