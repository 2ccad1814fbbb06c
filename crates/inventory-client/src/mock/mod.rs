//! Mock InventoryClient for unit testing
//!
//! This module provides an in-memory implementation of InventoryClientTrait that
//! can be used in unit tests without a running inventory backend.
//!
//! - `helpers.rs` - builders for hardware fixtures

mod helpers;

pub use helpers::{instance, interface};

use crate::error::InventoryError;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::Hardware;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Mock InventoryClient for testing
///
/// Stores hardware in memory and records everything the boot path relays, so
/// tests can assert on what would have reached the backend.
#[derive(Debug, Clone)]
pub struct MockInventoryClient {
    pub(crate) base_url: String,
    pub(crate) hardware: Arc<Mutex<Vec<Hardware>>>,
    pub(crate) active_workflows: Arc<Mutex<HashSet<String>>>,
    pub(crate) unavailable: Arc<AtomicBool>,
    pub(crate) events: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    pub(crate) phone_homes: Arc<Mutex<Vec<String>>>,
    pub(crate) problems: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    pub(crate) components: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    // Counter for generating event IDs
    pub(crate) next_id: Arc<AtomicU64>,
}

impl MockInventoryClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            hardware: Arc::new(Mutex::new(Vec::new())),
            active_workflows: Arc::new(Mutex::new(HashSet::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
            events: Arc::new(Mutex::new(Vec::new())),
            phone_homes: Arc::new(Mutex::new(Vec::new())),
            problems: Arc::new(Mutex::new(Vec::new())),
            components: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Add a hardware record to the mock store (for test setup)
    pub fn add_hardware(&self, hardware: Hardware) {
        self.hardware.lock().unwrap().push(hardware);
    }

    /// Mark a hardware id as having (or not having) an active workflow
    pub fn set_active_workflow(&self, hardware_id: &str, active: bool) {
        let mut workflows = self.active_workflows.lock().unwrap();
        if active {
            workflows.insert(hardware_id.to_string());
        } else {
            workflows.remove(hardware_id);
        }
    }

    /// Make every call fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Instance events posted so far, as (instance id, body)
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }

    /// Instance ids that phoned home
    pub fn phone_homes(&self) -> Vec<String> {
        self.phone_homes.lock().unwrap().clone()
    }

    /// Hardware problems posted so far, as (hardware id, body)
    pub fn problems(&self) -> Vec<(String, serde_json::Value)> {
        self.problems.lock().unwrap().clone()
    }

    /// Hardware component reports posted so far, as (hardware id, body)
    pub fn components(&self) -> Vec<(String, serde_json::Value)> {
        self.components.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), InventoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InventoryError::Unavailable("mock backend marked unavailable".to_string()));
        }
        Ok(())
    }

    fn find(&self, what: &str, pred: impl Fn(&Hardware) -> bool) -> Result<Hardware, InventoryError> {
        self.check_available()?;
        self.hardware
            .lock()
            .unwrap()
            .iter()
            .find(|hw| pred(hw))
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(format!("no hardware for {}", what)))
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for MockInventoryClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), InventoryError> {
        self.check_available()
    }

    async fn hardware_by_ip(&self, ip: IpAddr) -> Result<Hardware, InventoryError> {
        self.find(&ip.to_string(), |hw| hw.interface_by_ip(ip).is_some())
    }

    async fn hardware_by_mac(&self, mac: &str) -> Result<Hardware, InventoryError> {
        self.find(mac, |hw| hw.interface_by_mac(mac).is_some())
    }

    async fn has_active_workflow(&self, hardware_id: &str) -> Result<bool, InventoryError> {
        self.check_available()?;
        Ok(self.active_workflows.lock().unwrap().contains(hardware_id))
    }

    async fn post_instance_event(&self, instance_id: &str, event: &serde_json::Value) -> Result<String, InventoryError> {
        self.check_available()?;
        self.events.lock().unwrap().push((instance_id.to_string(), event.clone()));
        Ok(format!("event-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn post_instance_phone_home(&self, instance_id: &str) -> Result<(), InventoryError> {
        self.check_available()?;
        self.phone_homes.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }

    async fn post_hardware_problem(&self, hardware_id: &str, problem: &serde_json::Value) -> Result<(), InventoryError> {
        self.check_available()?;
        self.problems.lock().unwrap().push((hardware_id.to_string(), problem.clone()));
        Ok(())
    }

    async fn post_hardware_components(
        &self,
        hardware_id: &str,
        components: &serde_json::Value,
    ) -> Result<serde_json::Value, InventoryError> {
        self.check_available()?;
        self.components.lock().unwrap().push((hardware_id.to_string(), components.clone()));
        Ok(components.clone())
    }
}
