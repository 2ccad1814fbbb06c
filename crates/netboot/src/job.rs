//! Job resolution.
//!
//! A [`Job`] is an immutable view of one machine as seen from one of its
//! interfaces: the hardware record, the resolving interface, the facility and
//! the installer selected for its operating system. Jobs are built per request
//! and dropped with it.

use crate::error::BootError;
use crate::installers::{self, CUSTOM_IPXE};
use crate::InstallerKind;
use inventory_client::{
    Hardware, InstallerData, Instance, Interface, InventoryClientTrait, InventoryError, HARDWARE_STATE_IN_USE,
};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How the client was identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Ip(IpAddr),
    Mac(String),
}

#[derive(Debug, Clone)]
pub struct Job {
    hardware: Hardware,
    interface: Option<usize>,
    facility: String,
    installer: InstallerKind,
}

impl Job {
    /// Build a job for `hardware` as reached through `locator`.
    ///
    /// `default_facility` is used when the record carries no facility.
    pub fn new(hardware: Hardware, locator: &Locator, default_facility: &str) -> Self {
        let interface = match locator {
            Locator::Ip(ip) => hardware.interface_by_ip(*ip),
            Locator::Mac(mac) => hardware.interface_by_mac(mac),
        }
        .map(|(idx, _)| idx);

        let facility = if hardware.facility_code.is_empty() {
            default_facility.to_string()
        } else {
            hardware.facility_code.clone()
        };

        let mut job = Self {
            hardware,
            interface,
            facility,
            installer: InstallerKind::Deny,
        };
        job.installer = installers::select(job.os_slug(), job.os_distro());
        job
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hardware
    }

    pub fn hardware_id(&self) -> &str {
        &self.hardware.id
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.hardware.instance.as_ref()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance().map(|i| i.id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn facility_code(&self) -> &str {
        &self.facility
    }

    pub fn plan_slug(&self) -> &str {
        &self.hardware.plan_slug
    }

    pub fn plan_version_slug(&self) -> &str {
        &self.hardware.plan_version_slug
    }

    /// `plan` or `plan:version`
    pub fn family_slug(&self) -> String {
        self.hardware.family_slug()
    }

    pub fn arch(&self) -> &str {
        if self.hardware.arch.is_empty() {
            if self.is_arm() { "aarch64" } else { "x86_64" }
        } else {
            &self.hardware.arch
        }
    }

    pub fn is_arm(&self) -> bool {
        matches!(self.hardware.arch.as_str(), "aarch64" | "arm64") || self.hardware.plan_slug.contains(".arm")
    }

    pub fn boot_drive_hint(&self) -> &str {
        &self.hardware.boot_drive_hint
    }

    /// OS slug used for installer selection. Instances whose installer is
    /// custom iPXE select it regardless of their slug.
    pub fn os_slug(&self) -> &str {
        match self.instance() {
            Some(i) if i.operating_system.installer == CUSTOM_IPXE => CUSTOM_IPXE,
            Some(i) => i.operating_system.slug.as_str(),
            None => "",
        }
    }

    pub fn os_distro(&self) -> &str {
        self.instance().map_or("", |i| i.operating_system.distro.as_str())
    }

    pub fn os_version(&self) -> &str {
        self.instance().map_or("", |i| i.operating_system.version.as_str())
    }

    pub fn installer(&self) -> InstallerKind {
        self.installer
    }

    pub fn installer_data(&self) -> Option<&InstallerData> {
        self.instance()?.operating_system.installer_data.as_ref()
    }

    pub fn ipxe_script_url(&self) -> Option<&str> {
        self.instance()?.ipxe_script_url.as_deref().filter(|u| !u.is_empty())
    }

    /// The interface the client was identified by, if it is on the record.
    pub fn interface(&self) -> Option<&Interface> {
        self.interface.and_then(|idx| self.hardware.interfaces.get(idx))
    }

    /// MAC of the resolving interface, or of the first interface.
    pub fn mac(&self) -> &str {
        self.interface()
            .or_else(|| self.hardware.interfaces.first())
            .map_or("", |iface| iface.mac.as_str())
    }

    pub fn interface_name(&self) -> String {
        match self.interface() {
            Some(iface) if !iface.name.is_empty() => iface.name.clone(),
            _ => format!("eth{}", self.interface.unwrap_or(0)),
        }
    }

    /// True only when the resolving interface explicitly permits PXE.
    pub fn allow_pxe(&self) -> bool {
        self.interface().is_some_and(|iface| iface.netboot.allow_pxe)
    }

    /// True when the resolving interface participates in workflows.
    pub fn can_workflow(&self) -> bool {
        self.interface().is_some_and(|iface| iface.netboot.allow_workflow)
    }

    /// Provisioned machines boot from disk unless the instance asks to PXE
    /// on every boot.
    pub fn should_netboot(&self) -> bool {
        self.allow_pxe()
            && (self.hardware.state != HARDWARE_STATE_IN_USE || self.instance().is_some_and(|i| i.always_pxe))
    }

    /// Crypted root password: a string `rootpwcrypt` in custom data wins over
    /// the instance password.
    pub fn root_password(&self) -> &str {
        if let Some(pw) = self.custom_value("rootpwcrypt").and_then(serde_json::Value::as_str) {
            return pw;
        }
        self.instance().map_or("", |i| i.crypted_root_password.as_str())
    }

    pub fn custom_value(&self, path: &str) -> Option<&serde_json::Value> {
        self.hardware.custom_value(path)
    }

    pub fn hostname(&self) -> &str {
        self.instance().map_or("", |i| i.hostname.as_str())
    }
}

/// Await an inventory call, bounded by `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, BootError>
where
    F: Future<Output = Result<T, InventoryError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(BootError::from),
        Err(_) => Err(BootError::Unavailable(format!(
            "inventory did not answer within {:?}",
            limit
        ))),
    }
}

/// Resolves client addresses into jobs against the inventory
pub struct Resolver {
    inventory: Arc<dyn InventoryClientTrait>,
    default_facility: String,
    timeout: Duration,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("inventory", &self.inventory.base_url())
            .field("default_facility", &self.default_facility)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Resolver {
    pub fn new(inventory: Arc<dyn InventoryClientTrait>, default_facility: String, timeout: Duration) -> Self {
        Self {
            inventory,
            default_facility,
            timeout,
        }
    }

    pub fn inventory(&self) -> &dyn InventoryClientTrait {
        self.inventory.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the job for a client IP address.
    pub async fn resolve(&self, ip: IpAddr) -> Result<Job, BootError> {
        debug!("Resolving job for {}", ip);
        let hardware = bounded(self.timeout, self.inventory.hardware_by_ip(ip)).await?;
        Ok(Job::new(hardware, &Locator::Ip(ip), &self.default_facility))
    }

    /// Resolve the job for a client MAC address.
    pub async fn resolve_mac(&self, mac: &str) -> Result<Job, BootError> {
        debug!("Resolving job for {}", mac);
        let hardware = bounded(self.timeout, self.inventory.hardware_by_mac(mac)).await?;
        Ok(Job::new(hardware, &Locator::Mac(mac.to_string()), &self.default_facility))
    }

    /// Whether the job's hardware has a workflow in progress.
    pub async fn has_active_workflow(&self, job: &Job) -> Result<bool, BootError> {
        bounded(self.timeout, self.inventory.has_active_workflow(job.hardware_id())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockJob;
    use inventory_client::MockInventoryClient;
    use inventory_client::mock::{instance, interface};
    use serde_json::json;

    #[test]
    fn test_allow_pxe_is_per_interface() {
        let mut hw = Hardware {
            id: "hw-1".into(),
            interfaces: vec![
                interface("eth0", "00:00:00:00:00:01", "10.0.0.1".parse().unwrap()),
                interface("eth1", "00:00:00:00:00:02", "10.0.0.2".parse().unwrap()),
            ],
            ..Hardware::default()
        };
        hw.interfaces[1].netboot.allow_pxe = false;

        let job = Job::new(hw.clone(), &Locator::Ip("10.0.0.1".parse().unwrap()), "onprem");
        assert!(job.allow_pxe());
        assert_eq!(job.interface_name(), "eth0");

        let job = Job::new(hw.clone(), &Locator::Mac("00:00:00:00:00:02".into()), "onprem");
        assert!(!job.allow_pxe());
        assert_eq!(job.mac(), "00:00:00:00:00:02");

        // Record found but the address is not on any interface
        let job = Job::new(hw, &Locator::Ip("10.0.0.9".parse().unwrap()), "onprem");
        assert!(!job.allow_pxe());
        assert!(!job.can_workflow());
        assert_eq!(job.mac(), "00:00:00:00:00:01");
    }

    #[test]
    fn test_facility_falls_back_to_default() {
        let job = MockJob::new("c3.small.x86", "").job();
        assert_eq!(job.facility_code(), "onprem");
        let job = MockJob::new("c3.small.x86", "ewr1").job();
        assert_eq!(job.facility_code(), "ewr1");
    }

    #[test]
    fn test_family_slug_and_arch() {
        let job = MockJob::new("s3.xlarge.x86:s3.xlarge.x86.01", "ewr1").job();
        assert_eq!(job.plan_slug(), "s3.xlarge.x86");
        assert_eq!(job.plan_version_slug(), "s3.xlarge.x86.01");
        assert_eq!(job.family_slug(), "s3.xlarge.x86:s3.xlarge.x86.01");
        assert_eq!(job.arch(), "x86_64");
        assert!(!job.is_arm());

        let job = MockJob::new("c3.large.arm", "ewr1").job();
        assert!(job.is_arm());
        assert_eq!(job.arch(), "aarch64");
    }

    #[test]
    fn test_root_password_precedence() {
        let cases = [
            (serde_json::Value::Null, "insecure"),
            (json!({"rootpwcrypt": "override"}), "override"),
            (json!(["test"]), "insecure"),
            (json!({"rootpwcrypt": 4}), "insecure"),
        ];
        for (custom_data, want) in cases {
            let job = MockJob::new("c3.small.x86", "ewr1")
                .password("insecure")
                .custom_data(custom_data.clone())
                .job();
            assert_eq!(job.root_password(), want, "custom data {custom_data}");
        }
    }

    #[test]
    fn test_custom_ipxe_installer_overrides_slug() {
        let job = MockJob::new("c3.small.x86", "ewr1")
            .os("ubuntu_20_04", "ubuntu")
            .installer(CUSTOM_IPXE)
            .job();
        assert_eq!(job.os_slug(), CUSTOM_IPXE);
        assert_eq!(job.installer(), InstallerKind::CustomIpxe);
    }

    #[test]
    fn test_should_netboot_respects_in_use_state() {
        let mut hw = MockJob::new("c3.small.x86", "ewr1").hardware();
        hw.state = HARDWARE_STATE_IN_USE.to_string();
        let job = Job::new(hw.clone(), &Locator::Mac(hw.interfaces[0].mac.clone()), "onprem");
        assert!(job.allow_pxe());
        assert!(!job.should_netboot());

        if let Some(instance) = hw.instance.as_mut() {
            instance.always_pxe = true;
        }
        let job = Job::new(hw.clone(), &Locator::Mac(hw.interfaces[0].mac.clone()), "onprem");
        assert!(job.should_netboot());
    }

    #[tokio::test]
    async fn test_resolve_by_ip_and_mac() {
        let mock = MockInventoryClient::new("http://inventory");
        let mut hw = Hardware {
            id: "hw-1".into(),
            interfaces: vec![interface("eth0", "00:00:ba:dd:be:ef", "10.0.0.5".parse().unwrap())],
            instance: Some(instance("inst-1", "ubuntu_20_04", "ubuntu")),
            ..Hardware::default()
        };
        hw.facility_code = "ewr1".into();
        mock.add_hardware(hw);
        let resolver = Resolver::new(Arc::new(mock), "onprem".into(), Duration::from_secs(1));

        let job = resolver.resolve("10.0.0.5".parse().unwrap()).await.unwrap();
        assert_eq!(job.hardware_id(), "hw-1");
        assert_eq!(job.instance_id(), Some("inst-1"));
        assert_eq!(job.installer(), InstallerKind::Osie);

        let job = resolver.resolve_mac("00:00:BA:DD:BE:EF").await.unwrap();
        assert!(job.allow_pxe());

        let err = resolver.resolve("10.0.0.6".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, BootError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_unavailable_backend() {
        let mock = MockInventoryClient::new("http://inventory");
        mock.set_unavailable(true);
        let resolver = Resolver::new(Arc::new(mock), "onprem".into(), Duration::from_secs(1));
        let err = resolver.resolve("10.0.0.5".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, BootError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), InventoryError>(())
        };
        let err = bounded(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, BootError::Unavailable(_)));
    }
}
