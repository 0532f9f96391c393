use std::fmt;

use serde::ser::SerializeSeq;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

bitflags::bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    ///
    /// Descriptions store these as a list of capability tags, see
    /// [`Props::tag`].
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Props: u8 {
        /// Permits broadcasts of the Characteristic Value using Server
        /// Characteristic Configuration Descriptor.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permit writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

/// Tag names in bit order.
const TAGS: [&str; 8] = [
    "broadcast",
    "read",
    "writeWithoutResponse",
    "write",
    "notify",
    "indicate",
    "authenticatedSignedWrites",
    "extendedProperties",
];

impl Props {
    /// Returns the capability tag of a single-bit property.
    #[must_use]
    pub fn tag(self) -> Option<&'static str> {
        (self.bits().count_ones() == 1).then(|| TAGS[self.bits().trailing_zeros() as usize])
    }

    /// Returns the property named by a capability tag.
    #[must_use]
    pub fn from_tag(s: &str) -> Option<Self> {
        #[allow(clippy::cast_possible_truncation)]
        let i = TAGS.iter().position(|&t| t == s)? as u32;
        Self::from_bits(1 << i)
    }

    /// Returns whether clients may read the value.
    #[inline(always)]
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns whether clients may write the value, with or without response.
    #[inline(always)]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITE.union(Self::WRITE_WITHOUT_RESPONSE))
    }

    /// Returns whether clients may subscribe to notifications or indications.
    #[inline(always)]
    #[must_use]
    pub const fn is_notifiable(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }
}

impl Serialize for Props {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(self.bits().count_ones() as usize))?;
        for p in self.iter() {
            if let Some(t) = p.tag() {
                seq.serialize_element(t)?;
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Props {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct Tags;
        impl<'de> de::Visitor<'de> for Tags {
            type Value = Props;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of characteristic property tags")
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Props, A::Error> {
                let mut p = Props::empty();
                while let Some(t) = seq.next_element::<String>()? {
                    p |= Props::from_tag(&t).ok_or_else(|| de::Error::unknown_variant(&t, &TAGS))?;
                }
                Ok(p)
            }
        }
        d.deserialize_seq(Tags)
    }
}
