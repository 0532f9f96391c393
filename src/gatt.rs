//! Live GATT surface ([Vol 3] Part G) handed to a peripheral-mode radio.
//!
//! A [`Service`] tree carries the attribute layout plus the per-characteristic
//! [`Io`] handlers that the radio backend invokes for client operations.

pub use {io::*, props::*, service::*};

use crate::att::ErrorCode;

mod io;
mod props;
mod service;
