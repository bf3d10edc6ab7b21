//! In-heap representation of host objects.

use {
    crate::{Altrep, Logical, SexpType, sexp::Id},
    bitflags::bitflags,
    smallvec::SmallVec,
    std::{cell::Cell, rc::Rc},
};

bitflags!
{
    /// Per-object header bits.
    pub struct Flags: u8
    {
        /// Set by the collector during marking, cleared during sweeping.
        const MARK  = 0b01;

        /// The object is reachable from host code (a variable or an argument),
        /// so it must be duplicated before it is modified.
        const NAMED = 0b10;
    }
}

/// Payload of an object.
///
/// Scalar payloads live in boxed slices of cells.
/// The slice never moves while the object is live,
/// which is what makes handing out data pointers possible.
pub enum Data
{
    Nil,
    /// Interned string; [`None`] is the missing string.
    Char(Option<Box<str>>),
    Logical(Box<[Cell<Logical>]>),
    Integer(Box<[Cell<i32>]>),
    Real(Box<[Cell<f64>]>),
    Raw(Box<[Cell<u8>]>),
    AltLogical(Rc<dyn Altrep<Logical>>),
    AltInteger(Rc<dyn Altrep<i32>>),
    AltReal(Rc<dyn Altrep<f64>>),
    AltRaw(Rc<dyn Altrep<u8>>),
    /// Elements are references to char objects.
    String(Vec<Id>),
    List(Vec<Id>),
}

/// Projections between scalar types and object payloads.
///
/// Implemented by the `scalar!` macro for every [`Scalar`][`crate::Scalar`].
pub trait Storage: Sized
{
    fn direct(data: &Data) -> Option<&[Cell<Self>]>;
    fn abstract_class(data: &Data) -> Option<&Rc<dyn Altrep<Self>>>;
    fn direct_data(cells: Box<[Cell<Self>]>) -> Data;
    fn abstract_data(class: Rc<dyn Altrep<Self>>) -> Data;
}

/// Attribute list; almost every object has at most one attribute.
pub type Attributes = SmallVec<[(Box<str>, Id); 1]>;

pub struct Object
{
    pub r#type: SexpType,
    pub flags: Flags,

    /// Number of live protection tokens referencing this object,
    /// counting both the protect stack and the precious set.
    pub protections: u32,

    pub attributes: Attributes,
    pub data: Data,
}

impl Object
{
    pub fn new(r#type: SexpType, data: Data) -> Self
    {
        Self{
            r#type,
            flags: Flags::empty(),
            protections: 0,
            attributes: Attributes::new(),
            data,
        }
    }

    pub fn len(&self) -> usize
    {
        match &self.data {
            Data::Nil             => 0,
            Data::Char(string)    => string.as_deref().map_or(2, str::len),
            Data::Logical(cells)  => cells.len(),
            Data::Integer(cells)  => cells.len(),
            Data::Real(cells)     => cells.len(),
            Data::Raw(cells)      => cells.len(),
            Data::AltLogical(alt) => alt.length(),
            Data::AltInteger(alt) => alt.length(),
            Data::AltReal(alt)    => alt.length(),
            Data::AltRaw(alt)     => alt.length(),
            Data::String(ids)     => ids.len(),
            Data::List(ids)       => ids.len(),
        }
    }

    pub fn is_altrep(&self) -> bool
    {
        matches!(
            self.data,
            Data::AltLogical(..) | Data::AltInteger(..)
                | Data::AltReal(..) | Data::AltRaw(..)
        )
    }

    pub fn attribute(&self, name: &str) -> Option<Id>
    {
        self.attributes.iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, id)| *id)
    }

    /// Call `f` on every object this object references.
    pub fn for_each_child(&self, mut f: impl FnMut(Id))
    {
        for (_, id) in &self.attributes {
            f(*id);
        }
        if let Data::String(ids) | Data::List(ids) = &self.data {
            ids.iter().copied().for_each(f);
        }
    }
}

impl Data
{
    /// Copy the payload, materializing abstract payloads.
    ///
    /// Materializing calls into the altrep class,
    /// which may fail; the message is returned for the host to raise.
    pub fn materialize(&self) -> Result<Self, String>
    {
        Ok(match self {
            Self::Nil             => Self::Nil,
            Self::Char(string)    => Self::Char(string.clone()),
            Self::Logical(cells)  => Self::Logical(copy_cells(cells)),
            Self::Integer(cells)  => Self::Integer(copy_cells(cells)),
            Self::Real(cells)     => Self::Real(copy_cells(cells)),
            Self::Raw(cells)      => Self::Raw(copy_cells(cells)),
            Self::AltLogical(alt) => Self::Logical(expand(&**alt)?),
            Self::AltInteger(alt) => Self::Integer(expand(&**alt)?),
            Self::AltReal(alt)    => Self::Real(expand(&**alt)?),
            Self::AltRaw(alt)     => Self::Raw(expand(&**alt)?),
            Self::String(ids)     => Self::String(ids.clone()),
            Self::List(ids)       => Self::List(ids.clone()),
        })
    }

    /// Resize a materialized payload, padding with defaults.
    ///
    /// Returns [`None`] for payloads that are not vectors.
    pub fn resized(self, len: usize, blank: Id, nil: Id) -> Option<Self>
    {
        Some(match self {
            Self::Logical(cells) => Self::Logical(resize_cells(cells, len)),
            Self::Integer(cells) => Self::Integer(resize_cells(cells, len)),
            Self::Real(cells)    => Self::Real(resize_cells(cells, len)),
            Self::Raw(cells)     => Self::Raw(resize_cells(cells, len)),
            Self::String(mut ids) => { ids.resize(len, blank); Self::String(ids) },
            Self::List(mut ids)   => { ids.resize(len, nil);   Self::List(ids) },
            _ => return None,
        })
    }
}

pub fn default_cells<T>(len: usize) -> Box<[Cell<T>]>
    where T: Default
{
    (0 .. len).map(|_| Cell::default()).collect()
}

fn copy_cells<T>(cells: &[Cell<T>]) -> Box<[Cell<T>]>
    where T: Copy
{
    cells.iter().map(|cell| Cell::new(cell.get())).collect()
}

fn resize_cells<T>(cells: Box<[Cell<T>]>, len: usize) -> Box<[Cell<T>]>
    where T: Copy + Default
{
    let mut cells = cells.into_vec();
    cells.resize_with(len, Cell::default);
    cells.into_boxed_slice()
}

fn expand<T>(alt: &dyn Altrep<T>) -> Result<Box<[Cell<T>]>, String>
    where T: Copy + Default
{
    let mut buf = vec![T::default(); alt.length()];
    let copied = alt.get_region(0, &mut buf)?;
    if copied != buf.len() {
        return Err(format!(
            "{} class materialized {} of {} elements",
            alt.class_name(), copied, buf.len(),
        ));
    }
    Ok(buf.into_iter().map(Cell::new).collect())
}
