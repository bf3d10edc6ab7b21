//! Typed views and growable vectors over host vector objects.
//!
//! Every element type falls into one of three storage strategies,
//! decided per object when a vector is constructed:
//!
//!  - Scalars with a contiguous buffer are read and written
//!    directly through the data pointer.
//!  - Scalars backed by an altrep class have no buffer.
//!    They are read through the host, in bulk when iterating.
//!  - Strings and list elements are themselves host objects,
//!    and are read and written through host accessor calls.

pub use self::{iter::*, view::*, writable::{Proxy, WritableVector}};

use {
    crate::{BorrowSexp, Error, Handle, RString, Result, unwind_protect},
    gchost::{Host, Logical, Scalar, Sexp, SexpType},
    smallvec::SmallVec,
    std::{cell::Cell, ptr::NonNull},
};

mod iter;
mod view;
pub mod writable;

/// Number of elements decoded at once when iterating abstract storage.
pub const CHUNK_SIZE: usize = 64;

/// Buffer of decoded elements.
pub type Chunk<T> = SmallVec<[T; CHUNK_SIZE]>;

/// How the elements of a vector are accessed.
pub enum Storage<T>
{
    /// Contiguous buffer owned by the host object.
    Direct(NonNull<Cell<T>>),

    /// Elements computed by an altrep class.
    Abstract,

    /// Elements are host objects, accessed through the host.
    Proxied,
}

impl<T> Clone for Storage<T>
{
    fn clone(&self) -> Self
    {
        *self
    }
}

impl<T> Copy for Storage<T>
{
}

/// Type that can be stored in a host vector.
///
/// # Safety
///
/// Implementations of [`get`][`Self::get`] and [`set`][`Self::set`]
/// may rely on their preconditions; callers must uphold them.
pub trait Element<'h>: Clone + Sized
{
    /// The type tag of vectors with elements of this type.
    const TYPE: SexpType;

    /// Determine the storage strategy for an object of type [`Self::TYPE`].
    fn storage(host: &'h Host<'h>, sexp: Sexp<'h>) -> Storage<Self>;

    /// Read an element.
    ///
    /// # Safety
    ///
    /// The object must be live, of type [`Self::TYPE`] and longer than `index`.
    /// The storage must have been obtained from the object
    /// since it was last reallocated.
    unsafe fn get(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        storage: Storage<Self>,
        index: usize,
    ) -> Self;

    /// Write an element.
    ///
    /// # Safety
    ///
    /// Same as for [`get`][`Self::get`].
    unsafe fn set(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        storage: Storage<Self>,
        index: usize,
        value: Self,
    ) -> Result<()>;

    /// Decode up to `len` elements starting at `start` into `buf`,
    /// with a single bulk read where the storage supports one.
    ///
    /// Returns the number of elements decoded.
    /// This may signal a host error.
    fn get_region(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        start: usize,
        len: usize,
        buf: &mut Chunk<Self>,
    ) -> usize;

    /// Convert a single host value into an element.
    fn decode(host: &'h Host<'h>, value: Sexp<'h>) -> Result<Self>;
}

fn check_scalar<'h>(host: &Host<'h>, value: Sexp<'h>, expected: SexpType)
    -> Result<()>
{
    let actual = host.type_of(value);
    if actual != expected {
        return Err(Error::TypeMismatch{expected, actual});
    }
    let length = host.length(value);
    if length != 1 {
        return Err(Error::NotScalar{expected, length});
    }
    Ok(())
}

impl<'h, T> Element<'h> for T
    where T: Scalar
{
    const TYPE: SexpType = T::TYPE;

    fn storage(host: &'h Host<'h>, sexp: Sexp<'h>) -> Storage<T>
    {
        match host.dataptr::<T>(sexp) {
            Some(ptr) => Storage::Direct(ptr),
            None      => Storage::Abstract,
        }
    }

    unsafe fn get(host: &'h Host<'h>, sexp: Sexp<'h>, storage: Storage<T>, index: usize)
        -> T
    {
        match storage {
            // SAFETY: The pointer is valid for the length of the live object.
            Storage::Direct(ptr) => (*ptr.as_ptr().add(index)).get(),
            _ => host.elt(sexp, index),
        }
    }

    unsafe fn set(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        storage: Storage<T>,
        index: usize,
        value: T,
    ) -> Result<()>
    {
        match storage {
            // SAFETY: The pointer is valid for the length of the live object.
            Storage::Direct(ptr) => (*ptr.as_ptr().add(index)).set(value),
            _ => unwind_protect(host, || host.set_elt(sexp, index, value))?,
        }
        Ok(())
    }

    fn get_region(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        start: usize,
        len: usize,
        buf: &mut Chunk<T>,
    ) -> usize
    {
        buf.clear();
        buf.resize(len, T::default());
        let count = host.get_region::<T>(sexp, start, &mut buf[..]);
        buf.truncate(count);
        count
    }

    fn decode(host: &'h Host<'h>, value: Sexp<'h>) -> Result<T>
    {
        check_scalar(host, value, T::TYPE)?;
        Ok(host.elt(value, 0))
    }
}

/// Wrap an element of a character vector.
///
/// The host only stores char objects in character vectors;
/// anything else means its heap is corrupt.
fn string_from_elt<'h>(host: &'h Host<'h>, handle: Handle<'h>) -> RString<'h>
{
    match RString::from_handle(handle) {
        Ok(string) => string,
        Err(err)   => host.fatal(&format!("corrupt character vector: {}", err)),
    }
}

impl<'h> Element<'h> for RString<'h>
{
    const TYPE: SexpType = SexpType::String;

    fn storage(_host: &'h Host<'h>, _sexp: Sexp<'h>) -> Storage<Self>
    {
        Storage::Proxied
    }

    unsafe fn get(host: &'h Host<'h>, sexp: Sexp<'h>, _: Storage<Self>, index: usize)
        -> Self
    {
        string_from_elt(host, Handle::new(host, host.string_elt(sexp, index)))
    }

    unsafe fn set(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        _: Storage<Self>,
        index: usize,
        value: Self,
    ) -> Result<()>
    {
        unwind_protect(host, || {
            host.set_string_elt(sexp, index, value.borrow_sexp());
        })
    }

    fn get_region(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        start: usize,
        len: usize,
        buf: &mut Chunk<Self>,
    ) -> usize
    {
        buf.clear();
        // SAFETY: Callers request only indices within the object.
        buf.extend((start .. start + len).map(|index| unsafe {
            Self::get(host, sexp, Storage::Proxied, index)
        }));
        len
    }

    fn decode(host: &'h Host<'h>, value: Sexp<'h>) -> Result<Self>
    {
        if host.type_of(value) == SexpType::Char {
            return RString::from_handle(Handle::new(host, value));
        }
        check_scalar(host, value, SexpType::String)?;
        RString::from_handle(Handle::new(host, host.string_elt(value, 0)))
    }
}

impl<'h> Element<'h> for Handle<'h>
{
    const TYPE: SexpType = SexpType::List;

    fn storage(_host: &'h Host<'h>, _sexp: Sexp<'h>) -> Storage<Self>
    {
        Storage::Proxied
    }

    unsafe fn get(host: &'h Host<'h>, sexp: Sexp<'h>, _: Storage<Self>, index: usize)
        -> Self
    {
        Handle::new(host, host.vector_elt(sexp, index))
    }

    unsafe fn set(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        _: Storage<Self>,
        index: usize,
        value: Self,
    ) -> Result<()>
    {
        unwind_protect(host, || host.set_vector_elt(sexp, index, value.sexp()))
    }

    fn get_region(
        host: &'h Host<'h>,
        sexp: Sexp<'h>,
        start: usize,
        len: usize,
        buf: &mut Chunk<Self>,
    ) -> usize
    {
        buf.clear();
        buf.extend((start .. start + len).map(|index| {
            Handle::new(host, host.vector_elt(sexp, index))
        }));
        len
    }

    fn decode(host: &'h Host<'h>, value: Sexp<'h>) -> Result<Self>
    {
        Ok(Handle::new(host, value))
    }
}

/// View of a raw vector.
pub type Raws<'h> = VectorView<'h, u8>;

/// View of an integer vector.
pub type Integers<'h> = VectorView<'h, i32>;

/// View of a double vector.
pub type Doubles<'h> = VectorView<'h, f64>;

/// View of a logical vector.
pub type Logicals<'h> = VectorView<'h, Logical>;

/// View of a character vector.
pub type Strings<'h> = VectorView<'h, RString<'h>>;

/// View of a list.
pub type List<'h> = VectorView<'h, Handle<'h>>;

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::testing::unwinding,
        gchost::Fatal,
        std::panic::{self, AssertUnwindSafe},
    };

    #[test]
    fn non_char_string_element_is_fatal()
    {
        Host::with_config(unwinding(), |host| {
            let handle = Handle::new(host, host.scalar(1i32));
            let payload = panic::catch_unwind(AssertUnwindSafe(|| {
                string_from_elt(host, handle);
            })).unwrap_err();
            let fatal = payload.downcast::<Fatal>().unwrap();
            assert_eq!(
                fatal.message(),
                "corrupt character vector: \
                 Invalid input type, expected 'char' actual 'integer'",
            );
        });
    }

    #[test]
    fn char_string_element_is_wrapped()
    {
        Host::with_config(unwinding(), |host| {
            let handle = Handle::new(host, host.mk_char("kept"));
            assert_eq!(string_from_elt(host, handle), "kept");
        });
    }
}
