//! LE-specific types.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// 48-bit Bluetooth device address ([Vol 6] Part B, Section 1.3) stored in
/// little-endian byte order.
///
/// The text form is six colon-separated octets, most significant first. Parsing
/// is case-insensitive and formatting is always lower-case, so the text form
/// can be used as a canonical lookup key.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Addr([u8; 6]);

impl Addr {
    /// Creates an address from little-endian bytes.
    #[inline(always)]
    #[must_use]
    pub const fn from_le_bytes(v: [u8; 6]) -> Self {
        Self(v)
    }

    /// Returns the little-endian address bytes.
    #[inline(always)]
    #[must_use]
    pub const fn as_le_bytes(self) -> [u8; 6] {
        self.0
    }

    /// Returns the lower-case address without separators (`aabbccddeeff`).
    #[must_use]
    pub fn compact(self) -> String {
        let v = self.0;
        format!(
            "{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            v[5], v[4], v[3], v[2], v[1], v[0]
        )
    }
}

impl From<[u8; 6]> for Addr {
    #[inline]
    fn from(v: [u8; 6]) -> Self {
        Self(v)
    }
}

impl Debug for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // [Vol 3] Part C, Section 3.2.1.3
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl Display for Addr {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl FromStr for Addr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAddrError(s.to_owned());
        let mut v = [0_u8; 6];
        let mut octets = s.split(':');
        for b in v.iter_mut().rev() {
            let o = octets.next().ok_or_else(err)?;
            if o.len() != 2 || !o.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(err());
            }
            *b = u8::from_str_radix(o, 16).map_err(|_| err())?;
        }
        match octets.next() {
            None => Ok(Self(v)),
            Some(_) => Err(err()),
        }
    }
}

impl Serialize for Addr {
    #[inline]
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Addr {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Error returned when a device address string is malformed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid device address {0:?} (expected six colon-separated hex octets)")]
pub struct ParseAddrError(String);
