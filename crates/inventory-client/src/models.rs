//! Inventory API models
//!
//! Hardware records as served by the inventory backend. Every field outside
//! the identifiers is optional on the wire and defaults when absent, so a
//! sparse record still deserializes.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Hardware state reported for machines that already run a provisioned instance
pub const HARDWARE_STATE_IN_USE: &str = "in_use";

/// A physical machine known to the inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub facility_code: String,
    #[serde(default)]
    pub plan_slug: String,
    #[serde(default)]
    pub plan_version_slug: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub boot_drive_hint: String,
    #[serde(default)]
    pub osie_version: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Free-form operator data; the renderers read hooks and overrides from it
    #[serde(default)]
    pub custom_data: serde_json::Value,
    #[serde(default)]
    pub instance: Option<Instance>,
}

impl Hardware {
    /// Index and interface whose address equals `ip`.
    pub fn interface_by_ip(&self, ip: IpAddr) -> Option<(usize, &Interface)> {
        self.interfaces
            .iter()
            .enumerate()
            .find(|(_, iface)| iface.ip.as_ref().is_some_and(|cfg| cfg.address == ip))
    }

    /// Index and interface with the given MAC, compared case-insensitively.
    pub fn interface_by_mac(&self, mac: &str) -> Option<(usize, &Interface)> {
        self.interfaces
            .iter()
            .enumerate()
            .find(|(_, iface)| iface.mac.eq_ignore_ascii_case(mac))
    }

    /// Look up a dotted key path (`"kickstart.pre_url"`) in the custom data.
    ///
    /// Returns `None` when any segment is missing or a non-object is crossed.
    pub fn custom_value(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.')
            .try_fold(&self.custom_data, |value, key| value.as_object()?.get(key))
    }

    /// Plan slug, qualified by the plan version when one is recorded
    /// (`"s3.xlarge.x86:s3.xlarge.x86.01"`).
    pub fn family_slug(&self) -> String {
        if self.plan_version_slug.is_empty() {
            self.plan_slug.clone()
        } else {
            format!("{}:{}", self.plan_slug, self.plan_version_slug)
        }
    }
}

/// A network interface on a machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(default)]
    pub name: String,
    pub mac: String,
    #[serde(default)]
    pub ip: Option<IpConfig>,
    #[serde(default)]
    pub netboot: Netboot,
}

/// Address assignment for an interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpConfig {
    pub address: IpAddr,
    #[serde(default)]
    pub netmask: Option<Ipv4Addr>,
    #[serde(default)]
    pub gateway: Option<IpAddr>,
}

/// Per-interface netboot permissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netboot {
    #[serde(default)]
    pub allow_pxe: bool,
    #[serde(default)]
    pub allow_workflow: bool,
}

/// The provisioned (or provisioning) instance assigned to a machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub crypted_root_password: String,
    #[serde(default)]
    pub operating_system: OperatingSystem,
    #[serde(default)]
    pub ipxe_script_url: Option<String>,
    #[serde(default)]
    pub always_pxe: bool,
}

/// Operating system requested for an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingSystem {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub distro: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub installer: String,
    #[serde(default)]
    pub installer_data: Option<InstallerData>,
}

/// Installer-specific payload, used by custom iPXE
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallerData {
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub script: String,
}

/// Workflow entry returned by the workflow listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    #[serde(default)]
    pub hardware_id: String,
    #[serde(default)]
    pub state: String,
}

/// Acknowledgement for a posted instance event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAck {
    pub id: String,
}
