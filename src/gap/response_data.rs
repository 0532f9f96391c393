//! Parser for the length-type-value response data format used in Advertising
//! Data (AD) and Scan Response Data (SRD) payloads:
//!
//! * [Vol 3] Part C, Section 11
//! * [Core Specification Supplement] Part A, Section 1
//! * [Assigned Numbers] Section 2.3

use std::iter::FusedIterator;

use super::ResponseDataType;

/// Read-only view of a captured advertising or scan response payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct ResponseData<'a>(&'a [u8]);

impl<'a> ResponseData<'a> {
    /// Wraps raw response data bytes.
    #[inline(always)]
    #[must_use]
    pub const fn new(b: &'a [u8]) -> Self {
        Self(b)
    }

    /// Returns an iterator over `(type, data)` fields. Iteration stops at the
    /// first zero-length field (early termination padding) or at a field that
    /// extends past the end of the payload.
    #[inline]
    #[must_use]
    pub const fn iter(&self) -> Fields<'a> {
        Fields(self.0)
    }

    /// Returns the data of the first field of type `typ`.
    #[must_use]
    pub fn get(&self, typ: ResponseDataType) -> Option<&'a [u8]> {
        let typ = u8::from(typ);
        self.iter().find_map(|(t, v)| (t == typ).then_some(v))
    }

    /// Returns the complete local name, falling back to the shortened one
    /// (\[CSS\] Part A, Section 1.2).
    #[must_use]
    pub fn local_name(&self) -> Option<&'a str> {
        (self.get(ResponseDataType::CompleteLocalName))
            .or_else(|| self.get(ResponseDataType::ShortLocalName))
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

impl<'a> IntoIterator for ResponseData<'a> {
    type Item = (u8, &'a [u8]);
    type IntoIter = Fields<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over response data fields.
#[derive(Clone, Debug)]
pub struct Fields<'a>(&'a [u8]);

impl<'a> Iterator for Fields<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&n, rest) = self.0.split_first()?;
        let n = usize::from(n);
        if n == 0 || rest.len() < n {
            self.0 = &[];
            return None;
        }
        let (field, tail) = rest.split_at(n);
        self.0 = tail;
        field.split_first().map(|(&typ, v)| (typ, v))
    }
}

impl FusedIterator for Fields<'_> {}
