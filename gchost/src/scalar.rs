//! Type tags and scalar element types.

use {
    crate::{altrep::Altrep, object::{Data, Storage}},
    std::{cell::Cell, fmt, rc::Rc},
};

/// Runtime type tag of a host object.
///
/// The discriminants are the classic small-integer codes,
/// so they can be compared against codes from other tooling.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum SexpType
{
    Nil     = 0,
    Char    = 9,
    Logical = 10,
    Integer = 13,
    Real    = 14,
    String  = 16,
    List    = 19,
    Raw     = 24,
}

impl SexpType
{
    /// Every type tag known to the host.
    pub const ALL: [Self; 8] = [
        Self::Nil, Self::Char, Self::Logical, Self::Integer,
        Self::Real, Self::String, Self::List, Self::Raw,
    ];

    /// The small-integer code of the tag.
    pub fn code(self) -> u8
    {
        self as u8
    }

    /// Human-readable name of the tag, as used in error messages.
    pub fn name(self) -> &'static str
    {
        match self {
            Self::Nil     => "NULL",
            Self::Char    => "char",
            Self::Logical => "logical",
            Self::Integer => "integer",
            Self::Real    => "double",
            Self::String  => "character",
            Self::List    => "list",
            Self::Raw     => "raw",
        }
    }

    /// Whether objects of this type are vectors that can be allocated
    /// with [`Host::alloc_vector`][`crate::Host::alloc_vector`].
    pub fn is_vector(self) -> bool
    {
        !matches!(self, Self::Nil | Self::Char)
    }
}

impl fmt::Display for SexpType
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Three-valued logical, stored as a 32-bit integer.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Logical(i32);

impl Logical
{
    /// Logical false.
    pub const FALSE: Self = Self(0);

    /// Logical true.
    pub const TRUE: Self = Self(1);

    /// Missing logical.
    pub const NA: Self = Self(i32::MIN);

    /// Interpret a raw integer the way the host does:
    /// zero is false, the NA sentinel is NA, anything else is true.
    pub fn from_raw(raw: i32) -> Self
    {
        match raw {
            0        => Self::FALSE,
            i32::MIN => Self::NA,
            _        => Self::TRUE,
        }
    }

    /// The raw integer representation.
    pub fn raw(self) -> i32
    {
        self.0
    }

    /// Whether this is the missing value.
    pub fn is_na(self) -> bool
    {
        self == Self::NA
    }

    /// Convert to a Boolean, or [`None`] for NA.
    pub fn to_bool(self) -> Option<bool>
    {
        match self {
            Self::NA => None,
            other    => Some(other != Self::FALSE),
        }
    }
}

impl From<bool> for Logical
{
    fn from(other: bool) -> Self
    {
        if other { Self::TRUE } else { Self::FALSE }
    }
}

impl fmt::Debug for Logical
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self.to_bool() {
            Some(true)  => f.write_str("TRUE"),
            Some(false) => f.write_str("FALSE"),
            None        => f.write_str("NA"),
        }
    }
}

/// Element type of a vector with inline storage.
///
/// Objects of these types store their elements in a contiguous buffer,
/// unless they are backed by an [`Altrep`] class.
/// This trait is sealed; the host knows exactly four scalar types.
pub trait Scalar
    : Copy + Default + PartialEq + fmt::Debug + Storage + 'static
{
    /// The type tag of vectors of this scalar type.
    const TYPE: SexpType;
}

macro_rules! scalar
{
    { $($ty:ty => $tag:ident, $direct:ident, $abstract:ident;)* } => {
        $(
            impl Scalar for $ty
            {
                const TYPE: SexpType = SexpType::$tag;
            }

            impl Storage for $ty
            {
                fn direct(data: &Data) -> Option<&[Cell<Self>]>
                {
                    match data {
                        Data::$direct(cells) => Some(cells),
                        _ => None,
                    }
                }

                fn abstract_class(data: &Data) -> Option<&Rc<dyn Altrep<Self>>>
                {
                    match data {
                        Data::$abstract(class) => Some(class),
                        _ => None,
                    }
                }

                fn direct_data(cells: Box<[Cell<Self>]>) -> Data
                {
                    Data::$direct(cells)
                }

                fn abstract_data(class: Rc<dyn Altrep<Self>>) -> Data
                {
                    Data::$abstract(class)
                }
            }
        )*
    };
}

scalar!
{
    Logical => Logical, Logical, AltLogical;
    i32     => Integer, Integer, AltInteger;
    f64     => Real,    Real,    AltReal;
    u8      => Raw,     Raw,     AltRaw;
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn logical_from_raw()
    {
        assert_eq!(Logical::from_raw(0), Logical::FALSE);
        assert_eq!(Logical::from_raw(7), Logical::TRUE);
        assert_eq!(Logical::from_raw(-1), Logical::TRUE);
        assert_eq!(Logical::from_raw(i32::MIN), Logical::NA);
        assert_eq!(Logical::NA.to_bool(), None);
        assert_eq!(format!("{:?}", Logical::from(true)), "TRUE");
    }

    #[test]
    fn type_codes_are_distinct()
    {
        for (i, a) in SexpType::ALL.iter().enumerate() {
            for b in &SexpType::ALL[i + 1 ..] {
                assert_ne!(a.code(), b.code());
                assert_ne!(a.name(), b.name());
            }
        }
    }
}
