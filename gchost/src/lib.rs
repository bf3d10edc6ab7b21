//! Simulated garbage-collected host runtime.
//!
//! The host owns a heap of typed objects, reclaims whatever is not
//! reachable from its roots, and signals errors by transferring control
//! non-locally to the innermost landing context.
//! It is the collaborator against which the `hostvec` layer is built:
//! anything that holds on to a [`Sexp`] across an allocation
//! must protect it first.

pub use self::{
    altrep::*,
    condition::*,
    config::*,
    context::*,
    host::*,
    registry::{PreserveKey, StackSlot},
    scalar::*,
    sexp::Sexp,
};

mod altrep;
mod condition;
mod config;
mod context;
mod gc;
mod host;
mod object;
mod registry;
mod scalar;
mod sexp;
