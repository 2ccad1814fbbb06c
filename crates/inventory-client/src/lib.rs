//! Hardware Inventory REST API Client
//!
//! A Rust client library for the hardware inventory backend that the netboot
//! service consults on every DHCP and HTTP request. Provides typed hardware
//! records and the lookup/post operations the boot path needs.
//!
//! # Example
//!
//! ```no_run
//! use inventory_client::{InventoryClient, InventoryClientTrait};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InventoryClient::new(
//!     "http://inventory:42113".to_string(),
//!     "your-api-token".to_string(),
//!     Duration::from_secs(10),
//! )?;
//!
//! // Find the machine that owns an address
//! let hardware = client.hardware_by_ip("10.0.0.12".parse()?).await?;
//!
//! // Relay an install event for its instance
//! if let Some(instance) = &hardware.instance {
//!     let event = serde_json::json!({"type": "provisioning.104.01", "body": "booted"});
//!     client.post_instance_event(&instance.id, &event).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod inventory_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::InventoryClient;
pub use common::{HttpClient, PaginatedResponse};
pub use error::InventoryError;
pub use inventory_trait::InventoryClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockInventoryClient;
pub use models::*;
