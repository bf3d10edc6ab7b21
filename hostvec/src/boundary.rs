//! Entry points called by the host.
//!
//! Native code called from the host must not let a Rust failure
//! unwind into host frames. [`call`] runs the native code,
//! lets its frames unwind completely, and only then re-signals
//! any failure as a host error.

use {
    crate::{IntoSexp, Result},
    gchost::{Fatal, Host, Jump, Sexp},
    std::{any::Any, panic::{self, AssertUnwindSafe}},
    tracing::debug,
};

/// Run a native entry point on behalf of the host.
///
/// On success the result is converted into a host object.
/// An [`Err`] or a panic is converted into a host error
/// after every local value has been dropped.
/// Host errors and fatal conditions continue to unwind as they are.
pub fn call<'h, F, R>(host: &'h Host<'h>, f: F) -> Sexp<'h>
    where F: FnOnce() -> Result<R>
        , R: IntoSexp<'h>
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        f().and_then(|value| value.into_sexp(host))
    }));

    let message = match outcome {
        Ok(Ok(sexp)) => return sexp,
        Ok(Err(err)) => err.to_string(),
        Err(payload) if payload.is::<Jump>() || payload.is::<Fatal>() =>
            panic::resume_unwind(payload),
        Err(payload) => format!("Rust panic: {}", panic_message(&*payload)),
    };

    debug!(%message, "re-signaling native failure as host error");
    host.error(&message)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str
{
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message;
    }
    "unknown payload"
}
