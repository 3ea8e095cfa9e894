use std::error::Error;
use std::fmt;

/// Errors raised while a host program is constructing the registry. All are fatal: they abort
/// before any action runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// `name` was already registered, either as a file output or a phony alias.
    DuplicateTarget { name: String },
    /// A registration call was given a structurally invalid argument (e.g. no outputs, or a
    /// target declaring the same output twice in one call).
    BadArgument { message: String },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::DuplicateTarget { name } => {
                write!(f, "target {name:?} is already registered")
            }
            RegistrationError::BadArgument { message } => {
                write!(f, "bad argument: {message}")
            }
        }
    }
}

impl Error for RegistrationError {}
