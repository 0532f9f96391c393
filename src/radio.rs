//! Radio backend interfaces.
//!
//! The profiler drives a [`Central`] and the links it opens. The emulator
//! drives a [`Peripheral`]. Backends report asynchronous state changes through
//! unbounded event channels that are handed out once.

use std::fmt::Debug;

use futures_core::future::BoxFuture;
use tokio::sync::mpsc;

pub use event::*;

use crate::att::ErrorCode;
use crate::gap::Uuid;
use crate::gatt;
use crate::le::Addr;

mod event;
pub mod loopback;

/// Error type returned by radio backends.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("radio is not powered on")]
    NotPowered,
    #[error("unknown peer {0}")]
    UnknownPeer(Addr),
    #[error("link disconnected")]
    Disconnected,
    #[error("operation not supported")]
    Unsupported,
    #[error("ATT error: {0}")]
    Att(#[from] ErrorCode),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Common radio result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Central role: scanning and connection establishment.
pub trait Central: Debug + Send + Sync {
    type Link: Link;

    /// Returns the event stream. The stream can only be taken once.
    fn events(&self) -> Option<mpsc::UnboundedReceiver<ScanEvent>>;

    /// Starts reporting advertising peripherals.
    fn start_scan(&self) -> Result<()>;

    /// Stops reporting advertising peripherals.
    fn stop_scan(&self);

    /// Connects to the peripheral with the specified address.
    fn connect(&self, addr: Addr) -> BoxFuture<'static, Result<Self::Link>>;
}

/// Client side of an established connection. Each discovery procedure
/// resolves once with the complete result.
pub trait Link: Clone + Debug + Send + Sync + 'static {
    /// Discovers all primary services ([Vol 3] Part G, Section 4.4.1).
    fn discover_services(&self) -> BoxFuture<'static, Result<Vec<Uuid>>>;

    /// Discovers all characteristics of a service
    /// ([Vol 3] Part G, Section 4.6.1).
    fn discover_characteristics(&self, svc: Uuid) -> BoxFuture<'static, Result<Vec<CharInfo>>>;

    /// Discovers all descriptors of a characteristic
    /// ([Vol 3] Part G, Section 4.7.1).
    fn discover_descriptors(&self, svc: Uuid, chr: Uuid) -> BoxFuture<'static, Result<Vec<Uuid>>>;
}

/// Peripheral role: advertising and GATT server registration.
pub trait Peripheral: Debug + Send + Sync {
    /// Returns the event stream. The stream can only be taken once.
    fn events(&self) -> Option<mpsc::UnboundedReceiver<PeripheralEvent>>;

    /// Sets the GAP device name.
    fn set_name(&self, name: &str);

    /// Starts advertising the raw advertising and scan response data.
    fn start_advertising(&self, adv: &[u8], scan: &[u8]) -> Result<()>;

    /// Stops advertising.
    fn stop_advertising(&self);

    /// Replaces the GATT services served to connected clients.
    fn set_services(&self, svcs: Vec<gatt::Service>) -> Result<()>;
}
