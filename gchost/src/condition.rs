use thiserror::Error;

/// Error value of the host runtime.
///
/// This is what host code observes when a call fails,
/// whether the failure originated in the host or was
/// re-encoded from a native failure at the boundary.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{message}")]
pub struct Condition
{
    message: String,
}

impl Condition
{
    /// Create a condition with the given message.
    pub fn new(message: impl Into<String>) -> Self
    {
        Self{message: message.into()}
    }

    /// The condition message.
    pub fn message(&self) -> &str
    {
        &self.message
    }
}

/// Unwind payload of a non-local error transfer.
///
/// [`Host::error`][`crate::Host::error`] unwinds with this payload
/// toward the innermost landing context.
/// Whoever catches it must call [`Context::land`][`crate::Context::land`].
#[derive(Debug)]
pub struct Jump
{
    condition: Condition,
}

impl Jump
{
    pub (crate) fn new(condition: Condition) -> Self
    {
        Self{condition}
    }

    /// The condition being signaled.
    pub fn condition(&self) -> &Condition
    {
        &self.condition
    }

    /// Take the condition being signaled.
    pub fn into_condition(self) -> Condition
    {
        self.condition
    }
}

/// Unwind payload of a fatal host condition under [`FatalPolicy::Unwind`].
///
/// [`FatalPolicy::Unwind`]: `crate::FatalPolicy::Unwind`
#[derive(Debug)]
pub struct Fatal
{
    message: String,
}

impl Fatal
{
    pub (crate) fn new(message: String) -> Self
    {
        Self{message}
    }

    /// Description of what went wrong.
    pub fn message(&self) -> &str
    {
        &self.message
    }
}
