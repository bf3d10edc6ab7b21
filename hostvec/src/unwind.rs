use {
    crate::Result,
    gchost::{Host, Jump},
    std::panic::{self, AssertUnwindSafe},
    tracing::trace,
};

/// Call a function that may signal a host error.
///
/// A normal return is forwarded as [`Ok`].
/// A host error is intercepted at the landing context opened for this call
/// and returned as [`Error::HostCondition`][`crate::Error::HostCondition`],
/// after the frames between here and the error site have been unwound.
/// Protect stack entries left behind by those frames are popped.
///
/// Any other unwind, including a fatal host condition
/// or a panic in `f` itself, passes through untouched.
/// Nested calls each intercept only the errors signaled inside them.
pub fn unwind_protect<'h, F, R>(host: &'h Host<'h>, f: F) -> Result<R>
    where F: FnOnce() -> R
{
    let context = host.enter_context();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<Jump>() {
            Ok(jump) => {
                context.land();
                let condition = jump.into_condition();
                trace!(message = condition.message(), "intercepted host error");
                Err(condition.into())
            },
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::{Error, testing::unwinding}, gchost::{Fatal, SexpType}};

    #[test]
    fn forwards_normal_return()
    {
        Host::with_config(unwinding(), |host| {
            assert_eq!(unwind_protect(host, || 42), Ok(42));
            assert_eq!(host.context_depth(), 0);
        });
    }

    #[test]
    fn converts_host_error()
    {
        Host::with_config(unwinding(), |host| {
            let depth = host.protect_depth();
            let result = unwind_protect(host, || {
                let _slot = host.protect(host.nil());
                host.alloc_vector(SexpType::Nil, 1)
            });
            assert_eq!(
                result.unwrap_err(),
                Error::HostCondition(
                    "invalid type/length (NULL/1) in vector allocation".to_owned(),
                ),
            );
            assert_eq!(host.protect_depth(), depth);
        });
    }

    #[test]
    fn nested_calls_intercept_once()
    {
        Host::with_config(unwinding(), |host| {
            let outer = unwind_protect(host, || {
                let inner = unwind_protect(host, || host.error("inner"));
                assert_eq!(inner, Err(Error::HostCondition("inner".to_owned())));
                7
            });
            assert_eq!(outer, Ok(7));
        });
    }

    #[test]
    fn local_panics_pass_through()
    {
        Host::with_config(unwinding(), |host| {
            let payload = panic::catch_unwind(AssertUnwindSafe(|| {
                unwind_protect(host, || panic::resume_unwind(Box::new("local")))
            })).unwrap_err();
            assert_eq!(payload.downcast_ref::<&str>(), Some(&"local"));
            assert_eq!(host.context_depth(), 0);
        });
    }

    #[test]
    fn fatal_passes_through()
    {
        Host::with_config(unwinding(), |host| {
            let payload = panic::catch_unwind(AssertUnwindSafe(|| {
                unwind_protect(host, || host.fatal("gone"))
            })).unwrap_err();
            assert!(payload.is::<Fatal>());
        });
    }
}
