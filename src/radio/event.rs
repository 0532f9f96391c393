use crate::gap::Uuid;
use crate::gatt::Props;
use crate::le::Addr;

/// Central role event.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ScanEvent {
    PoweredOn,
    PoweredOff,
    Report(AdvReport),
    Discovered(Discovered),
}

/// Raw advertising report ([Vol 4] Part E, Section 7.7.65.2).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvReport {
    pub addr: Addr,
    pub data: Vec<u8>,
    pub rssi: i8,
    /// Report type, if the backend exposes it.
    pub kind: Option<ReportKind>,
}

/// Payload type of an advertising report.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReportKind {
    Adv,
    ScanRsp,
}

/// Peripheral discovered by a scan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Discovered {
    pub addr: Addr,
    pub local_name: Option<String>,
    pub connectable: bool,
}

/// Discovered characteristic declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CharInfo {
    pub uuid: Uuid,
    pub props: Props,
}

/// Peripheral role event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PeripheralEvent {
    /// Radio became ready (`true`) or unavailable (`false`).
    Ready(bool),
    /// Client connected.
    Accept(Addr),
    /// Client disconnected.
    Disconnect(Addr),
}
