//! Flatcar Container Linux: PXE-boots the live image, which installs itself
//! to disk through an ignition `install.service`.

use super::{BootScript, InstallerConfig, announce};
use crate::config::Config;
use crate::error::BootError;
use crate::ignition::SystemdUnits;
use crate::ipxe::Script;
use crate::job::Job;
use std::fmt;
use std::sync::Arc;

pub const IGNITION_PATH: &str = "/flatcar/ignition.json";

const DEFAULT_CHANNEL: &str = "stable";
const CONSOLE_X86: &str = "console=tty0 console=ttyS1,115200n8";
const CONSOLE_ARM: &str = "console=ttyAMA0,115200";

/// Closed set of per-family edits to the x86 install unit.
const ARM_REPLACEMENTS: &[(&str, &str)] = &[
    (" -o packet", ""),
    ("tty0 console=ttyS1,115200n8", "ttyAMA0,115200"),
    ("amd64", "arm64"),
];
const S3_XLARGE_REPLACEMENTS: &[(&str, &str)] = &[("-o packet -s", "-o packet -s -e 259")];

#[derive(Debug, Clone)]
pub struct Flatcar {
    config: Arc<Config>,
}

impl Flatcar {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn channel(job: &Job) -> &str {
        match job.os_version() {
            "" => DEFAULT_CHANNEL,
            version => version,
        }
    }

    fn replacements(job: &Job) -> &'static [(&'static str, &'static str)] {
        if job.is_arm() {
            ARM_REPLACEMENTS
        } else if job.plan_slug() == "s3.xlarge.x86" {
            S3_XLARGE_REPLACEMENTS
        } else {
            &[]
        }
    }

    /// Units for the x86 baseline; family edits are applied on render.
    pub fn units(&self, job: &Job) -> SystemdUnits {
        let channel = Self::channel(job);
        let mut units = SystemdUnits::default();
        let install = units.add("install.service");
        install.enabled = true;

        install
            .contents
            .add_section("Unit")
            .add("Requires", "systemd-networkd-wait-online.service")
            .add("After", "systemd-networkd-wait-online.service");

        install
            .contents
            .add_section("Service")
            .add("Type", "oneshot")
            .add(
                "ExecStart",
                r#"/usr/bin/curl --retry 10 -H "Content-Type: application/json" -X POST -d '{"type":"provisioning.106"}' ${phone_home_url}"#,
            )
            .add(
                "ExecStart",
                format!(
                    "/usr/bin/flatcar-install -V current -C {} -b {}/flatcar/amd64-usr/{} -o packet -s",
                    channel, self.config.osie_vendor_services_url, channel
                ),
            )
            .add("ExecStart", "/usr/bin/udevadm settle")
            .add("ExecStart", "/usr/bin/mkdir -p /oemmnt")
            .add("ExecStart", "/usr/bin/mount /dev/disk/by-label/OEM /oemmnt")
            .add(
                "ExecStart",
                r#"/usr/bin/bash -c "/usr/bin/echo \"set linux_console=\\\"console=tty0 console=ttyS1,115200n8\\\"\" >> /oemmnt/grub.cfg""#,
            )
            .add(
                "ExecStart",
                r#"/usr/bin/curl -H "Content-Type: application/json" -X POST -d '{"type":"provisioning.109"}' ${phone_home_url}"#,
            )
            .add("ExecStart", "/usr/bin/systemctl reboot");

        install.contents.add_section("Install").add("WantedBy", "multi-user.target");

        units
    }
}

impl BootScript for Flatcar {
    fn boot_script(&self, job: &Job, script: &mut Script) -> Result<(), BootError> {
        let (arch_dir, console) = if job.is_arm() {
            ("arm64-usr", CONSOLE_ARM)
        } else {
            ("amd64-usr", CONSOLE_X86)
        };
        let ignition_url = format!("ignition.config.url={}{}", self.config.public_url(), IGNITION_PATH);
        let phone_home = format!("systemd.setenv=phone_home_url={}", self.config.phone_home_url());

        announce(job, script);
        script
            .set(
                "base-url",
                format!("{}/flatcar/{}/{}", self.config.mirror_base_url, arch_dir, Self::channel(job)),
            )
            .kernel("${base-url}/flatcar_production_pxe.vmlinuz")
            .args(&[
                console,
                "flatcar.first_boot=1",
                "flatcar.autologin",
                ignition_url.as_str(),
                phone_home.as_str(),
            ])
            .initrd("${base-url}/flatcar_production_pxe_image.cpio.gz")
            .boot();
        Ok(())
    }
}

impl InstallerConfig for Flatcar {
    fn path(&self) -> &'static str {
        IGNITION_PATH
    }

    fn name(&self) -> &'static str {
        "ignition"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn render(&self, job: &Job, out: &mut dyn fmt::Write) -> Result<(), BootError> {
        let document = self.units(job).to_ignition(Self::replacements(job));
        out.write_str(&serde_json::to_string(&document)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::test_utils::MockJob;

    const HEAD: &str = "[Unit]
Requires=systemd-networkd-wait-online.service
After=systemd-networkd-wait-online.service

[Service]
Type=oneshot
ExecStart=/usr/bin/curl --retry 10 -H \"Content-Type: application/json\" -X POST -d '{\"type\":\"provisioning.106\"}' ${phone_home_url}
";

    const TAIL: &str = "ExecStart=/usr/bin/udevadm settle
ExecStart=/usr/bin/mkdir -p /oemmnt
ExecStart=/usr/bin/mount /dev/disk/by-label/OEM /oemmnt
";

    const END: &str = "ExecStart=/usr/bin/curl -H \"Content-Type: application/json\" -X POST -d '{\"type\":\"provisioning.109\"}' ${phone_home_url}
ExecStart=/usr/bin/systemctl reboot

[Install]
WantedBy=multi-user.target
";

    fn job(family: &str) -> Job {
        MockJob::new(family, "ewr1")
            .os("flatcar_alpha", "flatcar")
            .os_version("alpha")
            .job()
    }

    fn install_contents(family: &str) -> String {
        let flatcar = Flatcar::new(Arc::new(Config::default()));
        let mut out = String::new();
        flatcar.render(&job(family), &mut out).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["ignition"]["version"], "2.1.0");
        let unit = &doc["systemd"]["units"][0];
        assert_eq!(unit["name"], "install.service");
        assert_eq!(unit["enabled"], true);
        unit["contents"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_install_unit_per_family() {
        let x86_console = "ExecStart=/usr/bin/bash -c \"/usr/bin/echo \\\"set linux_console=\\\\\\\"console=tty0 console=ttyS1,115200n8\\\\\\\"\\\" >> /oemmnt/grub.cfg\"\n";
        let arm_console = "ExecStart=/usr/bin/bash -c \"/usr/bin/echo \\\"set linux_console=\\\\\\\"console=ttyAMA0,115200\\\\\\\"\\\" >> /oemmnt/grub.cfg\"\n";
        let install = "ExecStart=/usr/bin/flatcar-install -V current -C alpha -b http://127.0.0.1/vendor-services/flatcar/amd64-usr/alpha";

        let cases = [
            (
                "c3.small.x86",
                format!("{HEAD}{install} -o packet -s\n{TAIL}{x86_console}{END}"),
            ),
            (
                "s3.xlarge.x86",
                format!("{HEAD}{install} -o packet -s -e 259\n{TAIL}{x86_console}{END}"),
            ),
            (
                "c3.large.arm",
                format!(
                    "{HEAD}{} -s\n{TAIL}{arm_console}{END}",
                    install.replace("amd64", "arm64")
                ),
            ),
        ];

        for (family, want) in cases {
            assert_eq!(install_contents(family), want, "family {family}");
        }
    }

    #[test]
    fn test_boot_script() {
        let flatcar = Flatcar::new(Arc::new(Config::default()));
        let mut script = Script::new();
        flatcar.boot_script(&job("c3.small.x86"), &mut script).unwrap();
        let lines = script.lines();
        let tail = &lines[lines.len() - 4..];
        assert_eq!(
            tail,
            [
                "set base-url http://127.0.0.1/flatcar/amd64-usr/alpha",
                "kernel ${base-url}/flatcar_production_pxe.vmlinuz console=tty0 console=ttyS1,115200n8 \
                 flatcar.first_boot=1 flatcar.autologin ignition.config.url=http://127.0.0.1/flatcar/ignition.json \
                 systemd.setenv=phone_home_url=http://127.0.0.1/phone-home",
                "initrd ${base-url}/flatcar_production_pxe_image.cpio.gz",
                "boot",
            ]
        );
    }

    #[test]
    fn test_arm_boot_script_uses_arm_image() {
        let flatcar = Flatcar::new(Arc::new(Config::default()));
        let mut script = Script::new();
        flatcar.boot_script(&job("c3.large.arm"), &mut script).unwrap();
        let text = script.lines().join("\n");
        assert!(text.contains("set base-url http://127.0.0.1/flatcar/arm64-usr/alpha"));
        assert!(text.contains("console=ttyAMA0,115200 flatcar.first_boot=1"));
    }
}
