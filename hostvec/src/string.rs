use {
    crate::{BorrowSexp, Error, Handle, Result, unwind_protect},
    gchost::{Host, Sexp, SexpType},
    std::fmt,
};

/// Handle to an interned host string.
///
/// Host strings are immutable and may be missing (NA).
#[derive(Clone)]
pub struct RString<'h>
{
    handle: Handle<'h>,
}

impl<'h> RString<'h>
{
    /// Intern a string.
    ///
    /// Fails if the string contains a nul byte.
    pub fn new(host: &'h Host<'h>, string: &str) -> Result<Self>
    {
        let sexp = unwind_protect(host, || host.mk_char(string))?;
        Ok(Self{handle: Handle::new(host, sexp)})
    }

    /// The missing string.
    pub fn na(host: &'h Host<'h>) -> Self
    {
        Self{handle: Handle::new(host, host.na_string())}
    }

    /// Wrap a char object.
    pub fn from_handle(handle: Handle<'h>) -> Result<Self>
    {
        let actual = handle.host().type_of(handle.sexp());
        if actual != SexpType::Char {
            return Err(Error::TypeMismatch{expected: SexpType::Char, actual});
        }
        Ok(Self{handle})
    }

    pub fn is_na(&self) -> bool
    {
        self.handle.sexp() == self.handle.host().na_string()
    }

    /// The contents of the string, or [`None`] if it is missing.
    pub fn value(&self) -> Option<String>
    {
        self.handle.host().char_string(self.handle.sexp())
    }

    pub fn handle(&self) -> &Handle<'h>
    {
        &self.handle
    }
}

impl<'h> BorrowSexp<'h> for RString<'h>
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

/// Interned strings are equal exactly when their references are.
impl<'h> PartialEq for RString<'h>
{
    fn eq(&self, other: &Self) -> bool
    {
        self.handle.sexp() == other.handle.sexp()
    }
}

impl<'h> PartialEq<str> for RString<'h>
{
    fn eq(&self, other: &str) -> bool
    {
        self.value().as_deref() == Some(other)
    }
}

impl<'h, 'a> PartialEq<&'a str> for RString<'h>
{
    fn eq(&self, other: &&'a str) -> bool
    {
        *self == **other
    }
}

impl<'h> fmt::Display for RString<'h>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self.value() {
            Some(value) => f.write_str(&value),
            None        => f.write_str("NA"),
        }
    }
}

impl<'h> fmt::Debug for RString<'h>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self.value() {
            Some(value) => write!(f, "{:?}", value),
            None        => f.write_str("NA"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::testing::torture};

    #[test]
    fn strings_compare_by_contents()
    {
        Host::with_config(torture(), |host| {
            let a = RString::new(host, "ab").unwrap();
            let b = RString::new(host, "ab").unwrap();
            assert_eq!(a, b);
            assert_eq!(a, "ab");
            assert_eq!(a.to_string(), "ab");
            assert!(!a.is_na());
        });
    }

    #[test]
    fn na_is_distinct_from_literal()
    {
        Host::with_config(torture(), |host| {
            let na = RString::na(host);
            let literal = RString::new(host, "NA").unwrap();
            assert!(na.is_na());
            assert_ne!(na, literal);
            assert_eq!(na.value(), None);
            assert_eq!(format!("{:?}", na), "NA");
            assert_eq!(format!("{:?}", literal), "\"NA\"");
        });
    }

    #[test]
    fn nul_is_rejected()
    {
        Host::with_config(torture(), |host| {
            let err = RString::new(host, "\0").unwrap_err();
            assert_eq!(err, Error::HostCondition(
                "embedded nul in string: '\\u{0}'".to_owned(),
            ));
        });
    }

    #[test]
    fn from_handle_checks_type()
    {
        Host::with_config(torture(), |host| {
            let handle = Handle::new(host, host.scalar(1i32));
            assert_eq!(
                RString::from_handle(handle).unwrap_err(),
                Error::TypeMismatch{
                    expected: SexpType::Char,
                    actual: SexpType::Integer,
                },
            );
        });
    }
}
