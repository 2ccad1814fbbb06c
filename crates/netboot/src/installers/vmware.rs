//! VMware ESXi: boots the ESXi installer with a kickstart served by this
//! service.

use super::{BootScript, InstallerConfig, announce};
use crate::config::Config;
use crate::error::BootError;
use crate::ipxe::Script;
use crate::job::Job;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const KICKSTART_PATH: &str = "/vmware/ks-esxi.cfg";

/// ESXi truncates storage device names to this many characters.
const MAX_DISK_NAME: usize = 16;

/// Storage drivers to install to, by hardware family. Full `plan:version`
/// entries are matched before plan-only ones.
const FIRST_DISK_DRIVERS: &[(&str, &str)] = &[
    ("s3.xlarge.x86:s3.xlarge.x86.01", "KXG50ZNV256G_TOSHIBA,vmw_ahci"),
    ("c3.medium.x86", "vmw_ahci,lsi_mr3,lsi_msgpt3"),
    ("s3.xlarge.x86", "vmw_ahci,lsi_mr3,lsi_msgpt3"),
    ("s1.large.x86", "vmw_ahci"),
];

/// Install target for a hardware family.
///
/// A non-empty boot drive hint wins. Unknown families get an empty string,
/// which leaves the choice to the installer.
pub fn first_disk(family: &str, hint: &str) -> String {
    if !hint.is_empty() {
        return hint.chars().take(MAX_DISK_NAME).collect();
    }

    let plan = family.split(':').next().unwrap_or(family);
    [family, plan]
        .iter()
        .find_map(|key| FIRST_DISK_DRIVERS.iter().find(|(f, _)| f == key))
        .map(|(_, drivers)| (*drivers).to_string())
        .unwrap_or_default()
}

fn first_disk_flag(disk: &str) -> String {
    if disk.is_empty() {
        "--firstdisk".to_string()
    } else {
        format!("--firstdisk={}", disk)
    }
}

/// `vmware_esxi_6_7` -> `6.7.0`, `vmware_esxi_7_0U2a` -> `7.0U2a`
fn esxi_release(job: &Job) -> String {
    let version = job
        .os_slug()
        .strip_prefix("vmware_esxi_")
        .unwrap_or_else(|| job.os_version())
        .replace('_', ".");
    let plain = version.chars().all(|c| c.is_ascii_digit() || c == '.');
    if plain && version.matches('.').count() == 1 {
        format!("{}.0", version)
    } else {
        version
    }
}

#[derive(Debug, Clone)]
pub struct Vmware {
    config: Arc<Config>,
}

impl Vmware {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn write_python_post(&self, out: &mut dyn fmt::Write, body: &Value) -> fmt::Result {
        writeln!(out, "import urllib.request")?;
        writeln!(out)?;
        writeln!(out, "urllib.request.urlopen(urllib.request.Request(")?;
        writeln!(out, "    \"{}\",", self.config.phone_home_url())?;
        writeln!(out, "    data=b'{}',", body)?;
        writeln!(out, "    headers={{\"Content-Type\": \"application/json\"}},")?;
        writeln!(out, "), timeout=30)")
    }
}

/// Single-quote `s` for busybox sh.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Shell lines for an optional custom-data hook phase (`pre`, `firstboot`).
///
/// `kickstart.<phase>_url` is fetched and run, `kickstart.<phase>_commands`
/// (a string or list of strings) is inlined.
fn hook_lines(job: &Job, phase: &str) -> Vec<String> {
    let mut lines = Vec::new();

    let url_key = format!("kickstart.{}_url", phase);
    match job.custom_value(&url_key) {
        None => debug!("No {} hook for hardware {}", url_key, job.hardware_id()),
        Some(Value::String(url)) if url.chars().any(|c| c.is_whitespace() || c.is_control()) => warn!(
            "Ignoring {} for hardware {}: URL contains whitespace or control characters",
            url_key,
            job.hardware_id()
        ),
        Some(Value::String(url)) if !url.is_empty() => {
            let file = format!("/tmp/{}-hook.sh", phase);
            lines.push(format!("wget -q -O {file} {} && sh {file}", shell_quote(url)));
        }
        Some(other) => warn!("Ignoring {} for hardware {}: expected a URL, got {}", url_key, job.hardware_id(), other),
    }

    let commands_key = format!("kickstart.{}_commands", phase);
    match job.custom_value(&commands_key) {
        None => debug!("No {} hook for hardware {}", commands_key, job.hardware_id()),
        Some(Value::String(commands)) => lines.extend(commands.lines().map(str::to_string)),
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_str() {
                    Some(cmd) => lines.push(cmd.to_string()),
                    None => warn!("Ignoring non-string entry in {} for hardware {}", commands_key, job.hardware_id()),
                }
            }
        }
        Some(other) => warn!(
            "Ignoring {} for hardware {}: expected commands, got {}",
            commands_key,
            job.hardware_id(),
            other
        ),
    }

    lines
}

impl BootScript for Vmware {
    fn boot_script(&self, job: &Job, script: &mut Script) -> Result<(), BootError> {
        let disk = first_disk(&job.family_slug(), job.boot_drive_hint());
        let ks = format!("ks={}{}", self.config.public_url(), KICKSTART_PATH);
        let netdevice = format!("netdevice={}", job.mac());
        let ksdevice = format!("ksdevice={}", job.mac());

        announce(job, script);
        script.set(
            "base-url",
            format!("{}/vmware/esxi-{}", self.config.mirror_base_url, esxi_release(job)),
        );
        if !disk.is_empty() {
            script.set("firstdisk", &disk);
        }
        script
            .kernel("${base-url}/mboot.c32")
            .args(&["-c", "${base-url}/boot.cfg", ks.as_str(), netdevice.as_str(), ksdevice.as_str()])
            .boot();
        Ok(())
    }
}

impl InstallerConfig for Vmware {
    fn path(&self) -> &'static str {
        KICKSTART_PATH
    }

    fn name(&self) -> &'static str {
        "kickstart"
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }

    fn render(&self, job: &Job, out: &mut dyn fmt::Write) -> Result<(), BootError> {
        let disk = first_disk_flag(&first_disk(&job.family_slug(), job.boot_drive_hint()));

        writeln!(out, "# Kickstart for hardware {} in {}", job.hardware_id(), job.facility_code())?;
        writeln!(out, "accepteula")?;
        writeln!(out, "clearpart {} --overwritevmfs", disk)?;
        writeln!(out, "install {} --overwritevmfs", disk)?;
        writeln!(out, "rootpw --iscrypted {}", job.root_password())?;
        writeln!(out, "network --bootproto=dhcp --device={}", job.mac())?;
        writeln!(out, "reboot")?;

        let pre = hook_lines(job, "pre");
        if !pre.is_empty() {
            writeln!(out)?;
            writeln!(out, "%pre --interpreter=busybox")?;
            for line in &pre {
                writeln!(out, "{}", line)?;
            }
        }

        writeln!(out)?;
        writeln!(out, "%post --interpreter=python --ignorefailure=true")?;
        self.write_python_post(out, &serde_json::json!({"type": "provisioning.109"}))?;

        writeln!(out)?;
        writeln!(out, "%firstboot --interpreter=busybox")?;
        writeln!(out, "vim-cmd hostsvc/enable_ssh")?;
        writeln!(out, "vim-cmd hostsvc/start_ssh")?;
        writeln!(out, "esxcli system syslog config set --loghost=udp://{}:514", self.config.public_syslog_fqdn)?;
        writeln!(out, "esxcli system syslog reload")?;
        for line in hook_lines(job, "firstboot") {
            writeln!(out, "{}", line)?;
        }

        match job.instance_id() {
            Some(id) => {
                writeln!(out)?;
                writeln!(out, "%firstboot --interpreter=python")?;
                self.write_python_post(out, &serde_json::json!({"instance_id": id}))?;
            }
            None => debug!("Hardware {} has no instance, skipping instance phone-home", job.hardware_id()),
        }

        Ok(())
    }
}
