//! Growable vectors.

use {
    super::{Element, VectorView},
    crate::{BorrowSexp, Error, Handle, NamedArg, RString, Result, unwind_protect},
    gchost::{Host, Logical, Sexp, SexpType},
    std::{fmt, ops::Deref},
    tracing::trace,
};

pub type Raws<'h> = WritableVector<'h, u8>;
pub type Integers<'h> = WritableVector<'h, i32>;
pub type Doubles<'h> = WritableVector<'h, f64>;
pub type Logicals<'h> = WritableVector<'h, Logical>;
pub type Strings<'h> = WritableVector<'h, RString<'h>>;
pub type List<'h> = WritableVector<'h, Handle<'h>>;

/// Growable, writable vector.
///
/// The host object may be longer than the vector;
/// the excess is spare capacity that pushing fills without reallocating.
/// Converting the vector back into a host reference
/// trims the object to the vector's length.
///
/// Before each write the object is copied if anything else
/// holds it, so other references keep seeing the old contents.
/// Read access is available through [`Deref`] to [`VectorView`].
pub struct WritableVector<'h, T>
{
    view: VectorView<'h, T>,

    // INVARIANT: capacity >= view.length, and capacity is the length
    //            of the host object unless the object is NULL.
    capacity: usize,
}

impl<'h, T> WritableVector<'h, T>
    where T: Element<'h>
{
    /// Empty vector. No host object is allocated until one is needed.
    pub fn new(host: &'h Host<'h>) -> Self
    {
        let view = VectorView::empty(host);
        Self{view, capacity: 0}
    }

    /// Allocate a vector with `len` default elements.
    pub fn with_len(host: &'h Host<'h>, len: usize) -> Result<Self>
    {
        let sexp = unwind_protect(host, || host.alloc_vector(T::TYPE, len))?;
        Self::owning(Handle::new(host, sexp))
    }

    /// Allocate a vector with the given elements.
    pub fn from_values<I>(host: &'h Host<'h>, values: I) -> Result<Self>
        where I: IntoIterator<Item=T>
    {
        let values: Vec<T> = values.into_iter().collect();
        let mut vector = Self::with_len(host, values.len())?;
        for (index, value) in values.into_iter().enumerate() {
            vector.store(index, value)?;
        }
        Ok(vector)
    }

    /// Allocate a vector from name/value pairs.
    ///
    /// The names become the `names` attribute.
    /// Each value must decode to a single element.
    pub fn from_named(host: &'h Host<'h>, args: &[NamedArg<'h>]) -> Result<Self>
    {
        let mut vector = Self::with_len(host, args.len())?;
        let names = unwind_protect(host, || {
            host.alloc_vector(SexpType::String, args.len())
        })?;
        let names = Handle::new(host, names);
        let sexp = vector.borrow_sexp();
        unwind_protect(host, || host.set_attrib(sexp, "names", names.sexp()))?;

        for (index, arg) in args.iter().enumerate() {
            let value = T::decode(host, arg.value().sexp())?;
            vector.store(index, value)?;
            unwind_protect(host, || {
                let name = host.mk_char(arg.name());
                host.set_string_elt(names.sexp(), index, name);
            })?;
        }
        Ok(vector)
    }

    /// Wrap an existing object.
    ///
    /// The object is copied before the first write
    /// if it is shared or computed by an altrep class.
    /// A character vector can also be created from a single char object,
    /// which is wrapped in a fresh vector of length one.
    pub fn from_handle(handle: Handle<'h>) -> Result<Self>
    {
        let (host, sexp) = (handle.host(), handle.sexp());
        if T::TYPE == SexpType::String && host.type_of(sexp) == SexpType::Char {
            let wrapped = unwind_protect(host, || {
                let wrapped = host.alloc_vector(SexpType::String, 1);
                host.set_string_elt(wrapped, 0, sexp);
                wrapped
            })?;
            return Self::owning(Handle::new(host, wrapped));
        }
        let view = VectorView::new(handle)?;
        Ok(Self{capacity: view.length, view})
    }

    /// Protect an object and wrap it.
    pub fn from_sexp(host: &'h Host<'h>, sexp: Sexp<'h>) -> Result<Self>
    {
        Self::from_handle(Handle::new(host, sexp))
    }

    fn owning(handle: Handle<'h>) -> Result<Self>
    {
        let view = VectorView::new(handle)?;
        Ok(Self{capacity: view.length, view})
    }

    pub fn capacity(&self) -> usize
    {
        self.capacity
    }

    /// Append an element.
    ///
    /// When the vector is full, the capacity is doubled first.
    pub fn push(&mut self, value: T) -> Result<()>
    {
        let length = self.view.length;
        if length == self.capacity {
            self.reserve(self.capacity.saturating_mul(2).max(1))?;
        }
        self.store(length, value)?;
        self.view.length += 1;
        Ok(())
    }

    /// Append an element with a name.
    ///
    /// Elements pushed without a name get the empty name.
    pub fn push_named(&mut self, arg: &NamedArg<'h>) -> Result<()>
    {
        let host = self.view.handle.host();
        let value = T::decode(host, arg.value().sexp())?;
        self.push(value)?;

        let sexp = self.view.handle.sexp();
        let names = host.attrib(sexp, "names");
        let names = if host.is_nil(names) {
            let names = unwind_protect(host, || {
                host.alloc_vector(SexpType::String, self.capacity)
            })?;
            let names = Handle::new(host, names);
            unwind_protect(host, || host.set_attrib(sexp, "names", names.sexp()))?;
            names
        } else {
            Handle::new(host, names)
        };

        let index = self.view.length - 1;
        unwind_protect(host, || {
            let name = host.mk_char(arg.name());
            host.set_string_elt(names.sexp(), index, name);
        })
    }

    /// Grow the capacity to at least `capacity`.
    ///
    /// Growing reallocates the host object.
    /// The capacity never shrinks.
    pub fn reserve(&mut self, capacity: usize) -> Result<()>
    {
        if capacity <= self.capacity {
            return Ok(());
        }

        let (host, sexp) = (self.view.handle.host(), self.view.handle.sexp());
        let grown = if host.is_nil(sexp) {
            unwind_protect(host, || host.alloc_vector(T::TYPE, capacity))?
        } else {
            unwind_protect(host, || host.lengthgets(sexp, capacity))?
        };
        self.rebind(grown);
        self.capacity = capacity;
        trace!(capacity, "grew vector");
        Ok(())
    }

    /// Write an element.
    ///
    /// # Panics
    ///
    /// If the index is out of range.
    pub fn set(&mut self, index: usize, value: T) -> Result<()>
    {
        self.check_index(index);
        self.store(index, value)
    }

    /// Reference to an element slot.
    ///
    /// # Panics
    ///
    /// If the index is out of range.
    pub fn proxy(&mut self, index: usize) -> Result<Proxy<'_, 'h, T>>
    {
        self.check_index(index);
        self.make_owned()?;
        Ok(Proxy{vector: self, index})
    }

    /// Reference to an element slot, failing if the index is out of range.
    pub fn at_mut(&mut self, index: isize) -> Result<Proxy<'_, 'h, T>>
    {
        let length = self.view.length;
        match usize::try_from(index) {
            Ok(index) if index < length => self.proxy(index),
            _ => Err(Error::OutOfRange{index, length}),
        }
    }

    /// Set an attribute; NULL removes it.
    ///
    /// Names as long as the vector are padded with empty names
    /// to cover the spare capacity.
    pub fn set_attr<V>(&mut self, name: &str, value: &V) -> Result<()>
        where V: BorrowSexp<'h>
    {
        self.make_owned()?;
        let (host, sexp) = (self.view.handle.host(), self.view.handle.sexp());
        if host.is_nil(sexp) {
            // Attributes need an object to live on.
            let empty = unwind_protect(host, || host.alloc_vector(T::TYPE, 0))?;
            self.rebind(empty);
        }
        let sexp = self.view.handle.sexp();
        let value = value.borrow_sexp();

        let padded = name == "names"
            && self.view.length < self.capacity
            && host.type_of(value) == SexpType::String
            && host.length(value) == self.view.length;
        if !padded {
            return unwind_protect(host, || host.set_attrib(sexp, name, value));
        }
        let capacity = self.capacity;
        unwind_protect(host, || {
            let names = host.lengthgets(value, capacity);
            host.set_attrib(sexp, name, names);
        })
    }

    /// Trim the host object to the length of the vector and return it.
    ///
    /// Trimming keeps only the `names` attribute.
    /// An empty vector that never allocated yields a fresh empty object.
    pub fn into_sexp(self) -> Result<Sexp<'h>>
    {
        let (host, sexp) = (self.view.handle.host(), self.view.handle.sexp());
        if host.is_nil(sexp) {
            return unwind_protect(host, || host.alloc_vector(T::TYPE, 0));
        }
        let length = self.view.length;
        if length < self.capacity {
            return unwind_protect(host, || host.lengthgets(sexp, length));
        }
        Ok(sexp)
    }

    fn check_index(&self, index: usize)
    {
        assert!(
            index < self.view.length,
            "index {} out of range for vector of length {}",
            index, self.view.length,
        );
    }

    /// Write an element within the capacity.
    fn store(&mut self, index: usize, value: T) -> Result<()>
    {
        self.make_owned()?;
        let (host, sexp) = (self.view.handle.host(), self.view.handle.sexp());
        // SAFETY: The index is within the capacity, which is the length
        //         of the object after making it owned.
        unsafe { T::set(host, sexp, self.view.storage, index, value) }
    }

    /// Copy the object if writing to it could be observed elsewhere.
    ///
    /// Any other token on the object counts, including those taken
    /// through views obtained from this vector.
    fn make_owned(&mut self) -> Result<()>
    {
        let (host, sexp) = (self.view.handle.host(), self.view.handle.sexp());
        if host.is_nil(sexp) {
            return Ok(());
        }
        if host.is_shared(sexp) || self.view.is_abstract() {
            let copy = unwind_protect(host, || host.duplicate(sexp))?;
            self.rebind(copy);
            trace!(original = ?sexp, ?copy, "copied vector before writing");
        }
        Ok(())
    }

    fn rebind(&mut self, sexp: Sexp<'h>)
    {
        let host = self.view.handle.host();
        self.view.handle.rebind(sexp);
        self.view.storage = T::storage(host, sexp);
    }
}

impl<'h, T> Deref for WritableVector<'h, T>
{
    type Target = VectorView<'h, T>;

    fn deref(&self) -> &Self::Target
    {
        &self.view
    }
}

impl<'h, T> BorrowSexp<'h> for WritableVector<'h, T>
{
    fn borrow_sexp(&self) -> Sexp<'h>
    {
        self.view.borrow_sexp()
    }

    fn host(&self) -> &'h Host<'h>
    {
        self.view.host()
    }
}

/// The copy shares the object until either side writes to it.
impl<'h, T> Clone for WritableVector<'h, T>
{
    fn clone(&self) -> Self
    {
        Self{view: self.view.clone(), capacity: self.capacity}
    }
}

impl<'h, T> fmt::Debug for WritableVector<'h, T>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("WritableVector")
            .field("sexp", &self.view.handle.sexp())
            .field("length", &self.view.length)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Reference to one element slot of a [`WritableVector`].
pub struct Proxy<'a, 'h, T>
{
    vector: &'a mut WritableVector<'h, T>,
    index: usize,
}

impl<'a, 'h, T> Proxy<'a, 'h, T>
    where T: Element<'h>
{
    pub fn index(&self) -> usize
    {
        self.index
    }

    pub fn get(&self) -> T
    {
        self.vector.view.elt(self.index)
    }

    pub fn set(&mut self, value: T) -> Result<()>
    {
        self.vector.store(self.index, value)
    }
}
