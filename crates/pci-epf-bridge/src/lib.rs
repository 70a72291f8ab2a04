//! The EPF bridge device: connects to the EPC server on realization, pulls
//! PCI identity and BAR layout, forwards BAR writes, and hosts the
//! endpoint-test command register for guest-driven DMA exercises.

mod client;
mod device;
mod error;

pub mod config;

pub use client::Link;
pub use config::BridgeConfig;
pub use device::PciEpfBridgeDevice;
pub use endpoint_test::{command, offset as endpoint_test_offset, Status as EndpointTestStatus};
pub use error::BridgeError;
