use super::uuid16_enum;

/// Response data types used in advertising and scan response payloads
/// ([Assigned Numbers] Section 2.3).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ResponseDataType {
    Flags = 0x01,
    IncompleteServiceClass16 = 0x02,
    CompleteServiceClass16 = 0x03,
    IncompleteServiceClass32 = 0x04,
    CompleteServiceClass32 = 0x05,
    IncompleteServiceClass128 = 0x06,
    CompleteServiceClass128 = 0x07,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPower = 0x0A,
    Appearance = 0x19,
    ManufacturerData = 0xFF,
}

/// GATT services referenced by the profiler and emulator
/// ([Assigned Numbers] Section 3.4).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
#[repr(u16)]
pub enum Service {
    GenericAccess = 0x1800,
    GenericAttribute = 0x1801,
    ImmediateAlert = 0x1802,
    LinkLoss = 0x1803,
    TxPower = 0x1804,
    DeviceInformation = 0x180A,
    Battery = 0x180F,
}

/// GATT characteristics referenced by the emulator
/// ([Assigned Numbers] Section 3.8).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
#[repr(u16)]
pub enum Characteristic {
    DeviceName = 0x2A00,
    Appearance = 0x2A01,
    ServiceChanged = 0x2A05,
    AlertLevel = 0x2A06,
    BatteryLevel = 0x2A19,
}

/// GATT characteristic descriptors ([Assigned Numbers] Section 3.7).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = 0x2900,
    CharacteristicUserDescription = 0x2901,
    ClientCharacteristicConfiguration = 0x2902,
    ServerCharacteristicConfiguration = 0x2903,
    CharacteristicPresentationFormat = 0x2904,
}

uuid16_enum! { Service Characteristic Descriptor }
