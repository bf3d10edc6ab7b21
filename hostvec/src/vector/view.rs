use {
    super::{Element, Iter, Storage, Strings},
    crate::{BorrowSexp, Error, Handle, Result},
    gchost::{Host, Sexp},
    std::fmt,
};

/// Read-only view of a host vector.
///
/// The element type is validated once, at construction.
/// Copying a view is cheap: the copy shares the host object
/// and holds its own protection token.
pub struct VectorView<'h, T>
{
    pub (super) handle: Handle<'h>,
    pub (super) length: usize,

    // INVARIANT: Obtained from the object referenced by handle,
    //            after it was last reallocated.
    pub (super) storage: Storage<T>,
}

impl<'h, T> VectorView<'h, T>
    where T: Element<'h>
{
    /// Create a view of the object referenced by a handle.
    ///
    /// Fails if the object is not a vector of the element type.
    pub fn new(handle: Handle<'h>) -> Result<Self>
    {
        let (host, sexp) = (handle.host(), handle.sexp());
        let actual = host.type_of(sexp);
        if actual != T::TYPE {
            return Err(Error::TypeMismatch{expected: T::TYPE, actual});
        }
        let length = host.length(sexp);
        let storage = T::storage(host, sexp);
        Ok(Self{handle, length, storage})
    }

    /// Protect an object and create a view of it.
    pub fn from_sexp(host: &'h Host<'h>, sexp: Sexp<'h>) -> Result<Self>
    {
        Self::new(Handle::new(host, sexp))
    }

    /// View of NULL, with no elements.
    pub (super) fn empty(host: &'h Host<'h>) -> Self
    {
        // The storage is never consulted, because there are no elements.
        Self{handle: Handle::nil(host), length: 0, storage: Storage::Proxied}
    }

    pub fn len(&self) -> usize
    {
        self.length
    }

    pub fn is_empty(&self) -> bool
    {
        self.length == 0
    }

    /// Whether the elements are computed by an altrep class.
    pub fn is_abstract(&self) -> bool
    {
        matches!(self.storage, Storage::Abstract)
    }

    /// Read an element.
    ///
    /// # Panics
    ///
    /// If the index is out of range.
    pub fn elt(&self, index: usize) -> T
    {
        assert!(
            index < self.length,
            "index {} out of range for vector of length {}",
            index, self.length,
        );
        // SAFETY: Index was checked.
        unsafe { self.elt_unchecked(index) }
    }

    /// Read an element without checking the index.
    ///
    /// # Safety
    ///
    /// The index must be less than [`len`][`Self::len`].
    pub unsafe fn elt_unchecked(&self, index: usize) -> T
    {
        let (host, sexp) = (self.handle.host(), self.handle.sexp());
        T::get(host, sexp, self.storage, index)
    }

    /// Read an element, failing if the index is out of range.
    pub fn at(&self, index: isize) -> Result<T>
    {
        match usize::try_from(index) {
            Ok(index) if index < self.length => Ok(self.elt(index)),
            _ => Err(Error::OutOfRange{index, length: self.length}),
        }
    }

    pub fn iter(&self) -> Iter<'_, 'h, T>
    {
        Iter::new(self)
    }

    /// Read all elements.
    pub fn to_vec(&self) -> Result<Vec<T>>
    {
        self.iter().collect()
    }

    /// The `names` attribute, if any.
    pub fn names(&self) -> Option<Strings<'h>>
    {
        let host = self.handle.host();
        let names = host.attrib(self.handle.sexp(), "names");
        if host.is_nil(names) {
            return None;
        }
        let mut names = Strings::from_sexp(host, names).ok()?;
        // A growable vector may have allocated beyond its length.
        names.length = names.length.min(self.length);
        Some(names)
    }

    /// Look up an attribute; NULL if absent.
    pub fn attr(&self, name: &str) -> Handle<'h>
    {
        let host = self.handle.host();
        Handle::new(host, host.attrib(self.handle.sexp(), name))
    }

    pub fn handle(&self) -> &Handle<'h>
    {
        &self.handle
    }
}

impl<'h, T> BorrowSexp<'h> for VectorView<'h, T>
{
    fn borrow_sexp(&self) -> Sexp<'h>
    {
        self.handle.sexp()
    }

    fn host(&self) -> &'h Host<'h>
    {
        self.handle.host()
    }
}

impl<'h, T> Clone for VectorView<'h, T>
{
    fn clone(&self) -> Self
    {
        Self{
            handle: self.handle.clone(),
            length: self.length,
            storage: self.storage,
        }
    }
}

impl<'a, 'h, T> IntoIterator for &'a VectorView<'h, T>
    where T: Element<'h>
{
    type Item = Result<T>;
    type IntoIter = Iter<'a, 'h, T>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.iter()
    }
}

impl<'h, T> fmt::Debug for VectorView<'h, T>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("VectorView")
            .field("sexp", &self.handle.sexp())
            .field("length", &self.length)
            .finish()
    }
}
