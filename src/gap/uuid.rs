use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU128;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`.
const BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;
/// Position of an assigned number within the base UUID.
const POS: u32 = 96;

/// 16-, 32-, or 128-bit UUID ([Vol 3] Part B, Section 2.5.1).
///
/// All forms are stored as 128-bit values, so a SIG UUID written in its short
/// form compares equal to the same UUID written out against the base UUID.
/// The text form is lower-case hex without dashes: 4 digits for assigned
/// 16-bit UUIDs, 8 digits for assigned 32-bit UUIDs, and 32 digits otherwise.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(NonZeroU128);

/// Shortest form of a UUID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UuidForm {
    Sig16(u16),
    Sig32(u32),
    Full(u128),
}

impl Uuid {
    /// Creates a UUID from a `u128`.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the UUID of an assigned 16-bit SIG number.
    ///
    /// # Panics
    ///
    /// Panics if `v` is zero.
    #[inline]
    #[must_use]
    pub const fn sig(v: u16) -> Self {
        assert!(v != 0, "zero SIG UUID");
        Self::from_sig(v as u32)
    }

    /// Returns the shortest form of the UUID.
    #[must_use]
    pub fn form(self) -> UuidForm {
        let v = self.0.get();
        if v & !(u128::from(u32::MAX) << POS) != BASE {
            return UuidForm::Full(v);
        }
        #[allow(clippy::cast_possible_truncation)]
        let n = (v >> POS) as u32;
        match u16::try_from(n) {
            Ok(0) => UuidForm::Full(v),
            Ok(n) => UuidForm::Sig16(n),
            Err(_) => UuidForm::Sig32(n),
        }
    }

    /// Returns the assigned 16-bit SIG number, if this is one.
    #[inline]
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        match self.form() {
            UuidForm::Sig16(v) => Some(v),
            _ => None,
        }
    }

    const fn from_sig(v: u32) -> Self {
        match Self::new((v as u128) << POS | BASE) {
            Some(u) => u,
            None => unreachable!(),
        }
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.form() {
            UuidForm::Sig16(v) => write!(f, "{v:#06X}"),
            UuidForm::Sig32(v) => write!(f, "{v:#010X}"),
            UuidForm::Full(v) => {
                let b = v.to_be_bytes();
                for (i, c) in b.iter().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_str("-")?;
                    }
                    write!(f, "{c:02X}")?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.form() {
            UuidForm::Sig16(v) => write!(f, "{v:04x}"),
            UuidForm::Sig32(v) => write!(f, "{v:08x}"),
            UuidForm::Full(v) => write!(f, "{v:032x}"),
        }
    }
}

impl FromStr for Uuid {
    type Err = ParseUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseUuidError(s.to_owned());
        let hex = if s.len() == 36 {
            // 8-4-4-4-12 form
            let b = s.as_bytes();
            if [8, 13, 18, 23].iter().any(|&i| b[i] != b'-') {
                return Err(err());
            }
            s.replace('-', "")
        } else {
            s.to_owned()
        };
        if !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        let u = match hex.len() {
            4 | 8 => (u32::from_str_radix(&hex, 16).ok())
                .filter(|&v| v != 0)
                .map(Self::from_sig),
            32 => u128::from_str_radix(&hex, 16).ok().and_then(Self::new),
            _ => None,
        };
        u.ok_or_else(err)
    }
}

impl Serialize for Uuid {
    #[inline]
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Error returned when a UUID string is malformed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid UUID {0:?}")]
pub struct ParseUuidError(String);

/// Implements [`Uuid`] conversion and comparison for `repr(u16)` enums of
/// assigned numbers.
macro_rules! uuid16_enum {
    ($($t:ty)*) => {$(
        impl $t {
            /// Returns the UUID of the assigned number.
            #[inline]
            #[must_use]
            pub const fn uuid(self) -> $crate::gap::Uuid {
                $crate::gap::Uuid::sig(self as u16)
            }
        }

        impl ::core::cmp::PartialEq<$crate::gap::Uuid> for $t {
            #[inline(always)]
            fn eq(&self, rhs: &$crate::gap::Uuid) -> bool {
                self.uuid() == *rhs
            }
        }

        impl ::core::cmp::PartialEq<$t> for $crate::gap::Uuid {
            #[inline(always)]
            fn eq(&self, rhs: &$t) -> bool {
                *self == rhs.uuid()
            }
        }

        impl ::core::convert::From<$t> for $crate::gap::Uuid {
            #[inline]
            fn from(v: $t) -> Self {
                v.uuid()
            }
        }
    )*}
}
pub(crate) use uuid16_enum;
