//! Host-side transport for the IT8951 e-paper timing controller.
//!
//! The controller talks 16-bit big-endian words over SPI. Every transfer
//! starts with a preamble word that tells the controller whether the
//! following words are a command, data to write, or data to read back, and
//! the host has to wait for the HRDY line before each transfer.

pub mod error;
pub mod spi_interface;

pub use error::{Error, TimeOutError};
pub use spi_interface::{DelayStep, PinDefinition, SpiInterface};
