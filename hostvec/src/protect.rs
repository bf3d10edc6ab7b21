//! Protected references to host objects.
//!
//! A [`Sexp`] by itself does not keep its object alive.
//! A [`Handle`] does: it owns an entry in one of the host's
//! protection registries and releases it when dropped,
//! including when dropped during unwinding.

use {
    crate::{Error, Result},
    gchost::{Host, PreserveKey, Sexp, StackSlot},
    std::{fmt, mem},
    tracing::trace,
};

/// Which protection registry a handle uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flavor
{
    /// The precious set, which can be released in any order.
    Preserve,

    /// The protect stack, which must be released in reverse order.
    ///
    /// Stacked handles must be dropped in the scope they were created in,
    /// and must not escape the closure of an
    /// [`unwind_protect`][`crate::unwind_protect`] call.
    Stack,
}

enum Token
{
    Stack(StackSlot),
    Preserve(PreserveKey),
}

/// Trait for obtaining a [`Sexp`] from a handle-holding type.
///
/// The returned reference is protected for as long as `self` is borrowed.
pub trait BorrowSexp<'h>
{
    /// Return a reference to a live object.
    fn borrow_sexp(&self) -> Sexp<'h>;

    /// Obtain the host the referenced object belongs to.
    fn host(&self) -> &'h Host<'h>;

    /// Create a new handle to the object.
    fn protect(&self) -> Handle<'h>
    {
        Handle::new(self.host(), self.borrow_sexp())
    }
}

/// Protected reference to a host object.
///
/// Every handle owns its own protection token, so the object stays live
/// for as long as any handle to it exists. Cloning acquires a fresh token.
/// Moving a handle transfers its token.
///
/// Preserve flavor handles to NULL hold no token, because NULL is a root.
pub struct Handle<'h>
{
    host: &'h Host<'h>,
    sexp: Sexp<'h>,
    flavor: Flavor,

    // INVARIANT: None only for preserve flavor handles to NULL.
    token: Option<Token>,
}

impl<'h> Handle<'h>
{
    /// Protect an object using the precious set.
    ///
    /// Exhausting the precious set is fatal.
    pub fn new(host: &'h Host<'h>, sexp: Sexp<'h>) -> Self
    {
        Self::acquire(host, sexp, Flavor::Preserve)
    }

    /// Protect an object using the protect stack.
    ///
    /// Overflowing the protect stack is fatal.
    pub fn stacked(host: &'h Host<'h>, sexp: Sexp<'h>) -> Self
    {
        Self::acquire(host, sexp, Flavor::Stack)
    }

    /// Like [`new`][`Self::new`], but fail instead of aborting
    /// when the precious set is exhausted.
    pub fn try_new(host: &'h Host<'h>, sexp: Sexp<'h>) -> Result<Self>
    {
        if host.precious_headroom() == 0 && !host.is_nil(sexp) {
            return Err(Error::ProtectionRegistryExhausted);
        }
        Ok(Self::new(host, sexp))
    }

    /// Like [`stacked`][`Self::stacked`], but fail instead of aborting
    /// when the protect stack is full.
    pub fn try_stacked(host: &'h Host<'h>, sexp: Sexp<'h>) -> Result<Self>
    {
        if host.protect_headroom() == 0 {
            return Err(Error::ProtectionRegistryExhausted);
        }
        Ok(Self::stacked(host, sexp))
    }

    /// Handle to NULL.
    pub fn nil(host: &'h Host<'h>) -> Self
    {
        Self{host, sexp: host.nil(), flavor: Flavor::Preserve, token: None}
    }

    fn acquire(host: &'h Host<'h>, sexp: Sexp<'h>, flavor: Flavor) -> Self
    {
        let token = match flavor {
            Flavor::Preserve if host.is_nil(sexp) => None,
            Flavor::Preserve => Some(Token::Preserve(host.preserve(sexp))),
            Flavor::Stack    => Some(Token::Stack(host.protect(sexp))),
        };
        trace!(?sexp, ?flavor, "protected object");
        Self{host, sexp, flavor, token}
    }

    pub fn sexp(&self) -> Sexp<'h>
    {
        self.sexp
    }

    pub fn flavor(&self) -> Flavor
    {
        self.flavor
    }

    pub fn is_nil(&self) -> bool
    {
        self.host.is_nil(self.sexp)
    }

    /// Point the handle at a different object.
    ///
    /// The new object is protected before the old one is released,
    /// so neither is ever unprotected while referenced.
    /// Stacked handles replace their protect stack entry in place.
    pub fn rebind(&mut self, sexp: Sexp<'h>)
    {
        if let Some(Token::Stack(slot)) = &self.token {
            self.host.reprotect(slot, sexp);
            self.sexp = sexp;
            return;
        }
        let fresh = Self::acquire(self.host, sexp, self.flavor);
        drop(mem::replace(self, fresh));
    }

    /// Release the protection and return the bare reference.
    ///
    /// The object may be reclaimed at the next allocation
    /// unless something else protects it.
    pub fn into_sexp(self) -> Sexp<'h>
    {
        self.sexp
    }
}

impl<'h> BorrowSexp<'h> for Handle<'h>
{
    fn borrow_sexp(&self) -> Sexp<'h>
    {
        self.sexp
    }

    fn host(&self) -> &'h Host<'h>
    {
        self.host
    }
}

impl<'h> Clone for Handle<'h>
{
    fn clone(&self) -> Self
    {
        Self::acquire(self.host, self.sexp, self.flavor)
    }
}

impl<'h> Drop for Handle<'h>
{
    fn drop(&mut self)
    {
        match self.token.take() {
            Some(Token::Stack(slot))   => self.host.unprotect(slot),
            Some(Token::Preserve(key)) => self.host.release(key),
            None                       => return,
        }
        trace!(sexp = ?self.sexp, "released object");
    }
}

impl<'h> fmt::Debug for Handle<'h>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Handle")
            .field("sexp", &self.sexp)
            .field("flavor", &self.flavor)
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::testing::{torture, unwinding},
        gchost::{HostConfig, SexpType},
        proptest::proptest,
    };

    #[test]
    fn handle_keeps_object_alive()
    {
        Host::with_config(torture(), |host| {
            let handle = Handle::new(host, host.scalar(3i32));
            host.gc();
            assert_eq!(host.elt::<i32>(handle.sexp(), 0), 3);

            let sexp = handle.into_sexp();
            host.gc();
            assert!(!host.is_live(sexp));
        });
    }

    #[test]
    fn clones_hold_their_own_tokens()
    {
        Host::with_config(unwinding(), |host| {
            let a = Handle::new(host, host.scalar(1u8));
            let b = a.clone();
            assert_eq!(host.protections(a.sexp()), 2);
            assert_eq!(host.precious_len(), 2);
            let sexp = a.sexp();
            drop(a);
            host.gc();
            assert!(host.is_live(sexp));
            drop(b);
            assert_eq!(host.precious_len(), 0);
        });
    }

    #[test]
    fn nil_holds_no_token()
    {
        Host::with_config(unwinding(), |host| {
            let nil = Handle::nil(host);
            let _copy = nil.clone();
            assert!(nil.is_nil());
            assert_eq!(host.precious_len(), 0);
        });
    }

    #[test]
    fn rebind_protects_before_releasing()
    {
        Host::with_config(torture(), |host| {
            let mut handle = Handle::new(host, host.scalar(1i32));
            let old = handle.sexp();
            let grown = host.lengthgets(handle.sexp(), 4);
            handle.rebind(grown);
            assert_eq!(host.precious_len(), 1);
            assert_eq!(host.protections(grown), 1);
            host.gc();
            assert!(!host.is_live(old));
            assert_eq!(host.length(handle.sexp()), 4);
        });
    }

    #[test]
    fn stacked_rebind_keeps_depth()
    {
        Host::with_config(unwinding(), |host| {
            let mut handle = Handle::stacked(host, host.scalar(1i32));
            let _inner = Handle::stacked(host, host.nil());
            handle.rebind(host.scalar(2i32));
            assert_eq!(host.protect_depth(), 2);
            assert_eq!(host.elt::<i32>(handle.sexp(), 0), 2);
        });
    }

    #[test]
    fn try_new_reports_exhaustion()
    {
        let config = HostConfig{precious_limit: 1, ..unwinding()};
        Host::with_config(config, |host| {
            let _first = Handle::try_new(host, host.scalar(1i32)).unwrap();
            let second = Handle::try_new(host, host.scalar(2i32));
            assert_eq!(second.unwrap_err(), Error::ProtectionRegistryExhausted);
            assert!(Handle::try_new(host, host.nil()).is_ok());
        });
    }

    proptest!
    {
        #[test]
        fn nested_stacked_handles_restore_depth(depth in 0usize .. 64)
        {
            Host::with_config(unwinding(), |host| {
                let handles: Vec<_> = (0 .. depth)
                    .map(|_| Handle::stacked(host, host.alloc_vector(SexpType::Raw, 1)))
                    .collect();
                assert_eq!(host.protect_depth(), depth);
                // Vec drops its elements front to back, which is not LIFO.
                handles.into_iter().rev().for_each(drop);
                assert_eq!(host.protect_depth(), 0);
            });
        }
    }
}
