//! Portable description of a profiled peripheral.
//!
//! A [`Device`] is produced once by the [`crate::profiler`], written to disk as
//! JSON, and consumed read-only by the [`crate::mock`] emulator.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::gap::{ResponseData, Service as Svc, Uuid};
use crate::gatt::Props;
use crate::le::Addr;

/// Captured advertising payloads and GATT layout of a peripheral.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Device {
    /// Device address.
    pub address: Addr,
    /// Device name, if one was discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw advertising data from the first advertising report.
    #[serde(rename = "ad_records", with = "hex")]
    pub adv_data: Vec<u8>,
    /// Raw scan response data, if any was captured.
    #[serde(rename = "scan_data", default, with = "hex_opt")]
    pub scan_data: Option<Vec<u8>>,
    /// Primary services in discovery order.
    pub services: Vec<Service>,
}

impl Device {
    /// Returns the service with the specified UUID.
    #[must_use]
    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid == uuid)
    }

    /// Returns the device name or the local name from the advertising data or
    /// scan response.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        (self.name.as_deref())
            .or_else(|| ResponseData::new(&self.adv_data).local_name())
            .or_else(|| ResponseData::new(self.scan_data.as_deref()?).local_name())
    }

    /// Checks structural invariants: unique service UUIDs, unique
    /// characteristic UUIDs within each service, and no implicit services.
    pub fn validate(&self) -> Result<(), Invalid> {
        let mut svcs = HashSet::with_capacity(self.services.len());
        for s in &self.services {
            if s.uuid == Svc::GenericAccess || s.uuid == Svc::GenericAttribute {
                return Err(Invalid::ImplicitService(s.uuid));
            }
            if !svcs.insert(s.uuid) {
                return Err(Invalid::DuplicateService(s.uuid));
            }
            let mut chars = HashSet::with_capacity(s.characteristics.len());
            for c in &s.characteristics {
                if !chars.insert(c.uuid) {
                    return Err(Invalid::DuplicateCharacteristic(s.uuid, c.uuid));
                }
            }
        }
        Ok(())
    }
}

/// Captured primary service.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    /// Creates a service without characteristics.
    #[inline]
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// Returns the characteristic with the specified UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Captured characteristic.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Props,
    /// Descriptor UUIDs in discovery order.
    pub descriptors: Vec<Uuid>,
}

/// Structural error in a device description.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Invalid {
    #[error("duplicate service {0}")]
    DuplicateService(Uuid),
    #[error("duplicate characteristic {1} in service {0}")]
    DuplicateCharacteristic(Uuid, Uuid),
    #[error("implicit service {0} must not be described")]
    ImplicitService(Uuid),
}

/// Optional hex byte string that is `null` when absent.
mod hex_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => hex::serialize(v, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
