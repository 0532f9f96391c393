//! Generic Access Profile ([Vol 3] Part C).

pub use {consts::*, response_data::*, uuid::*};

mod consts;
mod response_data;
mod uuid;
