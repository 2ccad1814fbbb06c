//! Test utilities for building hardware fixtures and jobs

use crate::job::{Job, Locator};
use inventory_client::mock::interface;
use inventory_client::{Hardware, InstallerData, Instance, OperatingSystem};

pub(crate) const MAC: &str = "00:00:ba:dd:be:ef";
pub(crate) const INSTANCE_ID: &str = "4c2c5a39-8d4a-4a62-9d67-76b3d7d5b5a1";

/// Builder for a single-interface machine with an instance.
///
/// `family` is `plan` or `plan:version`, as in `"s3.xlarge.x86:s3.xlarge.x86.01"`.
#[derive(Debug, Clone)]
pub(crate) struct MockJob {
    hardware: Hardware,
}

impl MockJob {
    pub(crate) fn new(family: &str, facility: &str) -> Self {
        let (plan, version) = family.split_once(':').unwrap_or((family, ""));
        let hardware = Hardware {
            id: "hw-fake".to_string(),
            facility_code: facility.to_string(),
            plan_slug: plan.to_string(),
            plan_version_slug: version.to_string(),
            interfaces: vec![interface("eth0", MAC, "127.0.0.1".parse().unwrap())],
            instance: Some(Instance {
                id: INSTANCE_ID.to_string(),
                hostname: "boots-test.example.com".to_string(),
                ..Instance::default()
            }),
            ..Hardware::default()
        };
        Self { hardware }
    }

    fn os_mut(&mut self) -> &mut OperatingSystem {
        &mut self.instance_mut().operating_system
    }

    fn instance_mut(&mut self) -> &mut Instance {
        self.hardware.instance.get_or_insert_with(Instance::default)
    }

    pub(crate) fn os(mut self, slug: &str, distro: &str) -> Self {
        self.os_mut().slug = slug.to_string();
        self.os_mut().distro = distro.to_string();
        self
    }

    pub(crate) fn os_version(mut self, version: &str) -> Self {
        self.os_mut().version = version.to_string();
        self
    }

    pub(crate) fn installer(mut self, installer: &str) -> Self {
        self.os_mut().installer = installer.to_string();
        self
    }

    pub(crate) fn installer_data(mut self, chain: &str, script: &str) -> Self {
        self.os_mut().installer_data = Some(InstallerData {
            chain: chain.to_string(),
            script: script.to_string(),
        });
        self
    }

    pub(crate) fn ipxe_script_url(mut self, url: &str) -> Self {
        self.instance_mut().ipxe_script_url = Some(url.to_string());
        self
    }

    pub(crate) fn password(mut self, crypted: &str) -> Self {
        self.instance_mut().crypted_root_password = crypted.to_string();
        self
    }

    pub(crate) fn without_instance(mut self) -> Self {
        self.hardware.instance = None;
        self
    }

    pub(crate) fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.hardware.manufacturer = manufacturer.to_string();
        self
    }

    pub(crate) fn boot_drive_hint(mut self, hint: &str) -> Self {
        self.hardware.boot_drive_hint = hint.to_string();
        self
    }

    pub(crate) fn custom_data(mut self, data: serde_json::Value) -> Self {
        self.hardware.custom_data = data;
        self
    }

    pub(crate) fn allow_workflow(mut self, allow: bool) -> Self {
        self.hardware.interfaces[0].netboot.allow_workflow = allow;
        self
    }

    pub(crate) fn allow_pxe(mut self, allow: bool) -> Self {
        self.hardware.interfaces[0].netboot.allow_pxe = allow;
        self
    }

    pub(crate) fn hardware(self) -> Hardware {
        self.hardware
    }

    /// Job as resolved through the fixture's interface MAC
    pub(crate) fn job(self) -> Job {
        Job::new(self.hardware, &Locator::Mac(MAC.to_string()), "onprem")
    }
}
