use {gchost::{Condition, SexpType}, thiserror::Error};

/// Failure of an operation on host objects.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error
{
    #[error("Invalid input type, expected '{expected}' actual '{actual}'")]
    TypeMismatch{expected: SexpType, actual: SexpType},

    #[error("Expected single {expected} value, got length {length}")]
    NotScalar{expected: SexpType, length: usize},

    #[error("index {index} out of range for vector of length {length}")]
    OutOfRange{index: isize, length: usize},

    /// The host signaled an error during a wrapped call.
    #[error("{0}")]
    HostCondition(String),

    /// Returned by the `try_` constructors instead of aborting.
    #[error("protection registry exhausted")]
    ProtectionRegistryExhausted,
}

impl From<Condition> for Error
{
    fn from(other: Condition) -> Self
    {
        Self::HostCondition(other.message().to_owned())
    }
}

/// Result of an operation on host objects.
pub type Result<T> = std::result::Result<T, Error>;
