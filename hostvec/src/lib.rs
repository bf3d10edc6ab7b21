//! Typed, protected access to objects of a garbage-collected host.
//!
//! Every reference held by native code is a [`Handle`],
//! which keeps its object alive until dropped.
//! Host operations that may signal an error run through
//! [`unwind_protect`], which turns the error into an [`Error`].
//! On top of that sit typed [`VectorView`]s and growable
//! [`WritableVector`]s.

pub use self::{
    convert::*,
    error::*,
    protect::*,
    string::*,
    unwind::*,
    vector::*,
};

pub mod boundary;

mod convert;
mod error;
mod protect;
mod string;
mod unwind;
mod vector;

#[cfg(test)]
mod testing
{
    use gchost::{FatalPolicy, HostConfig};

    /// Fatal conditions unwind, so tests can observe them.
    pub fn unwinding() -> HostConfig
    {
        HostConfig{fatal: FatalPolicy::Unwind, ..HostConfig::default()}
    }

    /// Collect before every allocation.
    pub fn torture() -> HostConfig
    {
        HostConfig{gc_torture: true, ..unwinding()}
    }
}
