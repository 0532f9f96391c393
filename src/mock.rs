//! Peripheral emulator.
//!
//! A [`Mock`] turns a [`Device`](crate::device::Device) description into a
//! live GATT surface, advertises the captured payloads, and routes every
//! client operation to registered listeners. Listeners are registered either
//! globally by operation kind or for one service. Global listeners run first.

pub use {event::*, mock::*};

mod event;
mod mock;
mod registry;

#[cfg(test)]
mod tests;
