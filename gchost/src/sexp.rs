use std::{fmt, marker::PhantomData};

/// Ensure that `'h` is an invariant lifetime.
pub (crate) type HostId<'h> = PhantomData<fn(&'h ()) -> &'h ()>;

/// Unbranded identity of an object slot.
///
/// The generation is bumped every time the slot is reclaimed,
/// so a stale identity never aliases a newer object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub (crate) struct Id
{
    pub index: u32,
    pub generation: u32,
}

/// Reference to an object owned by a host.
///
/// This is the most basic type of reference to a host object.
/// It provides no liveness guarantees: the collector may reclaim
/// the referenced object at the next allocation unless something
/// protects it. Using a reference to a reclaimed object is detected
/// by the host and treated as a fatal condition.
///
/// The `'h` parameter ties the reference to the host that created it,
/// see [`Host::with`][`crate::Host::with`].
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Sexp<'h>
{
    _host_id: HostId<'h>,
    pub (crate) id: Id,
}

impl<'h> Sexp<'h>
{
    pub (crate) fn new(id: Id) -> Self
    {
        Self{_host_id: PhantomData, id}
    }
}

impl<'h> fmt::Debug for Sexp<'h>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "Sexp(#{}.{})", self.id.index, self.id.generation)
    }
}
