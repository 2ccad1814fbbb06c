//! Inventory API client
//!
//! Implements the inventory REST API used by the boot path:
//! hardware lookups under /api/v1/hardware/, workflow state under
//! /api/v1/workflows/ and the event relays under /api/v1/instances/.

use crate::common::{HttpClient, PaginatedResponse};
use crate::error::InventoryError;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::{EventAck, Hardware, WorkflowSummary};
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Inventory API client
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: HttpClient,
}

impl InventoryClient {
    /// Create a new inventory client
    ///
    /// # Arguments
    /// * `base_url` - Inventory base URL (e.g., "http://inventory:42113")
    /// * `token` - API token for authentication
    /// * `timeout` - Per-request timeout applied by the HTTP client
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, InventoryError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    async fn hardware_where(&self, filter: (&str, &str)) -> Result<Hardware, InventoryError> {
        let path = format!("/api/v1/hardware/?{}", self.http.build_query_string(&[filter]));
        self.http.get(&path).await
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for InventoryClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn validate_token(&self) -> Result<(), InventoryError> {
        debug!("Validating inventory token and connectivity");
        let _: serde_json::Value = self.http.get("/api/v1/status/").await?;
        Ok(())
    }

    async fn hardware_by_ip(&self, ip: IpAddr) -> Result<Hardware, InventoryError> {
        self.hardware_where(("ip", &ip.to_string())).await
    }

    async fn hardware_by_mac(&self, mac: &str) -> Result<Hardware, InventoryError> {
        if mac.is_empty() {
            return Err(InventoryError::InvalidRequest("empty MAC address".to_string()));
        }
        self.hardware_where(("mac", &mac.to_ascii_lowercase())).await
    }

    async fn has_active_workflow(&self, hardware_id: &str) -> Result<bool, InventoryError> {
        let path = format!(
            "/api/v1/workflows/?{}",
            self.http.build_query_string(&[("hardware_id", hardware_id), ("state", "active")])
        );
        let page: PaginatedResponse<WorkflowSummary> = self.http.get(&path).await?;
        Ok(page.count > 0)
    }

    async fn post_instance_event(&self, instance_id: &str, event: &serde_json::Value) -> Result<String, InventoryError> {
        let path = format!("/api/v1/instances/{}/events/", urlencoding::encode(instance_id));
        let ack: EventAck = self.http.post(&path, event).await?;
        debug!("Posted event {} for instance {}", ack.id, instance_id);
        Ok(ack.id)
    }

    async fn post_instance_phone_home(&self, instance_id: &str) -> Result<(), InventoryError> {
        let path = format!("/api/v1/instances/{}/phone-home/", urlencoding::encode(instance_id));
        self.http.post_discard(&path, &serde_json::json!({})).await
    }

    async fn post_hardware_problem(&self, hardware_id: &str, problem: &serde_json::Value) -> Result<(), InventoryError> {
        let path = format!("/api/v1/hardware/{}/problems/", urlencoding::encode(hardware_id));
        self.http.post_discard(&path, problem).await
    }

    async fn post_hardware_components(
        &self,
        hardware_id: &str,
        components: &serde_json::Value,
    ) -> Result<serde_json::Value, InventoryError> {
        let path = format!("/api/v1/hardware/{}/components/", urlencoding::encode(hardware_id));
        self.http.post(&path, components).await
    }
}
