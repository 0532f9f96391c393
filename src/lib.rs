//! Bluetooth LE peripheral cloning library.
//!
//! The [`profiler`] connects to a live peripheral and captures its advertising
//! data and GATT layout into a portable [`device::Device`] description. The
//! [`mock`] emulator turns such a description back into a synthetic peripheral
//! that advertises the same payloads, exposes the same services, and routes
//! every client operation to user-supplied listeners.
//!
//! Both halves talk to the radio only through the traits in [`radio`]. The
//! [`radio::loopback`] module provides an in-process implementation that
//! connects emulators and profilers without hardware.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_inception)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::empty_structs_with_brackets)]
#![warn(clippy::exit)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]

pub mod att;
pub mod device;
pub mod gap;
pub mod gatt;
pub mod le;
pub mod mock;
pub mod profiler;
pub mod radio;

mod util;

pub(crate) use util::name_of;
