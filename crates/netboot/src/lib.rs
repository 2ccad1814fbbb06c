//! Netboot Provisioning Service
//!
//! Answers bare-metal machines on the network-boot path, backed by the
//! hardware inventory (`inventory-client`):
//!
//! - **Job resolution**: turns a client address into a [`Job`] describing the
//!   machine, its resolving interface and its selected installer
//! - **Boot scripts**: iPXE scripts for custom iPXE, OSIE, Flatcar and VMware
//! - **Installer configs**: VMware kickstart and Flatcar ignition documents
//! - **DHCP handoff**: builds DHCPv4 offers/acks with PXE boot options
//! - **HTTP front**: job files, phone-home, events, problems, hardware
//!   components, health, Prometheus metrics and CPU profiling
//!
//! Every request path is fail-closed: an unknown or unreachable record yields
//! a 4xx/5xx (or DHCP silence), never a process failure.

pub mod client_addr;
pub mod config;
pub mod dhcp;
pub mod error;
pub mod events;
pub mod http;
pub mod ignition;
pub mod installers;
pub mod ipxe;
pub mod job;
pub mod metrics;
pub mod profiling;
pub mod server;
#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use dhcp::DhcpResponder;
pub use error::BootError;
pub use installers::{InstallerKind, Installers};
pub use job::{Job, Locator, Resolver};
pub use server::NetbootServer;
