//! Conversion of native values into host objects.

use {
    crate::{BorrowSexp, Element, Handle, RString, Result, VectorView, WritableVector, unwind_protect},
    gchost::{Host, Logical, Sexp, SexpType},
};

/// Conversion into a host object.
///
/// The returned reference is unprotected.
pub trait IntoSexp<'h>
{
    fn into_sexp(self, host: &'h Host<'h>) -> Result<Sexp<'h>>;
}

macro_rules! scalar_into_sexp
{
    { $($ty:ty),* } => {
        $(
            impl<'h> IntoSexp<'h> for $ty
            {
                fn into_sexp(self, host: &'h Host<'h>) -> Result<Sexp<'h>>
                {
                    unwind_protect(host, || host.scalar(self))
                }
            }
        )*
    };
}

scalar_into_sexp!(u8, i32, f64, Logical);

impl<'h> IntoSexp<'h> for bool
{
    fn into_sexp(self, host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        Logical::from(self).into_sexp(host)
    }
}

/// Character vector of length one.
impl<'h, 'a> IntoSexp<'h> for &'a str
{
    fn into_sexp(self, host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        let string = RString::new(host, self)?;
        string.into_sexp(host)
    }
}

/// Character vector of length one.
impl<'h> IntoSexp<'h> for RString<'h>
{
    fn into_sexp(self, host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        unwind_protect(host, || {
            let vector = host.alloc_vector(SexpType::String, 1);
            host.set_string_elt(vector, 0, self.borrow_sexp());
            vector
        })
    }
}

impl<'h> IntoSexp<'h> for Sexp<'h>
{
    fn into_sexp(self, _host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        Ok(self)
    }
}

impl<'h> IntoSexp<'h> for Handle<'h>
{
    fn into_sexp(self, _host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        Ok(Handle::into_sexp(self))
    }
}

impl<'h, T> IntoSexp<'h> for VectorView<'h, T>
    where T: Element<'h>
{
    fn into_sexp(self, _host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        Ok(self.borrow_sexp())
    }
}

impl<'h, T> IntoSexp<'h> for WritableVector<'h, T>
    where T: Element<'h>
{
    fn into_sexp(self, _host: &'h Host<'h>) -> Result<Sexp<'h>>
    {
        WritableVector::into_sexp(self)
    }
}

/// Name/value pair for constructing named vectors.
///
/// The value is converted and protected when the pair is created.
#[derive(Clone, Debug)]
pub struct NamedArg<'h>
{
    name: String,
    value: Handle<'h>,
}

impl<'h> NamedArg<'h>
{
    pub fn new<V>(host: &'h Host<'h>, name: impl Into<String>, value: V)
        -> Result<Self>
        where V: IntoSexp<'h>
    {
        let value = Handle::new(host, value.into_sexp(host)?);
        Ok(Self{name: name.into(), value})
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn value(&self) -> &Handle<'h>
    {
        &self.value
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::{Strings, testing::torture}};

    #[test]
    fn str_becomes_character_vector()
    {
        Host::with_config(torture(), |host| {
            let sexp = "hi".into_sexp(host).unwrap();
            let strings = Strings::from_sexp(host, sexp).unwrap();
            assert_eq!(strings.to_vec().unwrap(), ["hi"]);
        });
    }

    #[test]
    fn bool_becomes_logical()
    {
        Host::with_config(torture(), |host| {
            let sexp = true.into_sexp(host).unwrap();
            assert_eq!(host.type_of(sexp), SexpType::Logical);
            assert_eq!(host.elt::<Logical>(sexp, 0), Logical::TRUE);
        });
    }

    #[test]
    fn named_arg_protects_value()
    {
        Host::with_config(torture(), |host| {
            let arg = NamedArg::new(host, "x", 2.5).unwrap();
            host.gc();
            assert_eq!(arg.name(), "x");
            assert_eq!(host.elt::<f64>(arg.value().sexp(), 0), 2.5);
        });
    }
}
