//! InventoryClient trait for mocking
//!
//! This trait abstracts the InventoryClient so the boot path can be exercised
//! against an in-memory implementation in unit tests.

use crate::error::InventoryError;
use crate::models::Hardware;
use std::net::IpAddr;

/// Trait for hardware inventory operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait InventoryClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), InventoryError>;

    // Lookups
    async fn hardware_by_ip(&self, ip: IpAddr) -> Result<Hardware, InventoryError>;
    async fn hardware_by_mac(&self, mac: &str) -> Result<Hardware, InventoryError>;
    async fn has_active_workflow(&self, hardware_id: &str) -> Result<bool, InventoryError>;

    // Relays
    /// Post an event for an instance, returning the backend's event id
    async fn post_instance_event(&self, instance_id: &str, event: &serde_json::Value) -> Result<String, InventoryError>;
    async fn post_instance_phone_home(&self, instance_id: &str) -> Result<(), InventoryError>;
    async fn post_hardware_problem(&self, hardware_id: &str, problem: &serde_json::Value) -> Result<(), InventoryError>;
    async fn post_hardware_components(&self, hardware_id: &str, components: &serde_json::Value) -> Result<serde_json::Value, InventoryError>;
}
