//! Peripheral profiler.
//!
//! A [`Profiler`] scans for one target address, connects to it, and walks its
//! GATT database (services, then characteristics, then descriptors) with all
//! per-service and per-characteristic procedures running concurrently. The
//! result is a [`Device`](crate::device::Device) description.

pub use {profiler::*, scan::*};

use crate::le::Addr;
use crate::radio;

mod profiler;
mod scan;
mod tracker;


/// Error type returned by the profiler. Every error is terminal and no partial
/// description is produced.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("scan failed")]
    Scan(#[source] radio::Error),
    #[error("connect failed")]
    Connect(#[source] radio::Error),
    #[error("discovery failed")]
    Discovery(#[source] radio::Error),
    #[error("scan ended before {0} was discovered")]
    ScanClosed(Addr),
}

/// Common profiler result type.
pub type Result<T> = std::result::Result<T, Error>;
