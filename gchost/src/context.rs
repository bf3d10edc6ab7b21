//! Landing contexts for non-local error transfer.

use {
    crate::{Condition, Host, Jump},
    std::panic::{self, AssertUnwindSafe},
};

/// Active landing context.
///
/// A context records the protect stack depth at the time it was entered.
/// An error signaled while the context is innermost unwinds toward it;
/// whoever intercepts the [`Jump`] calls [`land`][`Self::land`],
/// which pops the protect stack entries that unwinding skipped.
/// Contexts nest strictly and are closed when dropped.
pub struct Context<'h>
{
    host: &'h Host<'h>,
    index: usize,
    depth: usize,
}

impl<'h> Host<'h>
{
    /// Open a landing context.
    pub fn enter_context(&'h self) -> Context<'h>
    {
        let depth = self.protect_depth();
        let mut contexts = self.contexts.borrow_mut();
        let index = contexts.len();
        contexts.push(depth);
        Context{host: self, index, depth}
    }

    /// Number of open landing contexts.
    pub fn context_depth(&self) -> usize
    {
        self.contexts.borrow().len()
    }

    /// Call `f` in a fresh context, catching any error it signals.
    ///
    /// Unwinds that are not error transfers are resumed.
    pub fn toplevel<F, R>(&'h self, f: F) -> Result<R, Condition>
        where F: FnOnce() -> R
    {
        let context = self.enter_context();
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) => match payload.downcast::<Jump>() {
                Ok(jump) => {
                    context.land();
                    Err(jump.into_condition())
                },
                Err(payload) => panic::resume_unwind(payload),
            },
        }
    }
}

impl<'h> Context<'h>
{
    /// Protect stack depth saved when the context was entered.
    pub fn depth(&self) -> usize
    {
        self.depth
    }

    /// Restore the protect stack to the saved depth.
    pub fn land(&self)
    {
        self.host.truncate_stack(self.depth);
    }
}

impl<'h> Drop for Context<'h>
{
    fn drop(&mut self)
    {
        let innermost = {
            let mut contexts = self.host.contexts.borrow_mut();
            let innermost = contexts.len() == self.index + 1;
            if innermost {
                contexts.pop();
            }
            innermost
        };
        if !innermost {
            self.host.fatal("context stack imbalance");
        }
    }
}
