//! Installer registry.
//!
//! Selection is a fixed-priority list of predicates over (OS slug, distro)
//! and is total: anything unrecognized gets the OSIE installer. Installers
//! contribute to two phases, each with its own dispatch table:
//!
//! - boot scripts ([`BootScript`]), keyed by [`InstallerKind`]
//! - installer configs ([`InstallerConfig`]), served at their own HTTP path
//!
//! An installer missing from a phase is a no-op for that phase.

pub mod custom_ipxe;
pub mod flatcar;
pub mod osie;
pub mod vmware;

use crate::config::Config;
use crate::error::BootError;
use crate::ipxe::{PROVISIONING_BOOTED, Script};
use crate::job::Job;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use custom_ipxe::CustomIpxe;
pub use flatcar::Flatcar;
pub use osie::Osie;
pub use vmware::Vmware;

/// OS slug / distro / installer marker for operator-supplied iPXE
pub const CUSTOM_IPXE: &str = "custom_ipxe";

/// Tag sent to OSIE-style cloud-init as `ipxe_cloud_config`
const CLOUD_CONFIG_TAG: &str = "packet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallerKind {
    CustomIpxe,
    Vmware,
    Flatcar,
    Osie,
    /// No operating system requested; nothing to install
    Deny,
}

impl InstallerKind {
    pub fn name(self) -> &'static str {
        match self {
            InstallerKind::CustomIpxe => "custom_ipxe",
            InstallerKind::Vmware => "vmware",
            InstallerKind::Flatcar => "flatcar",
            InstallerKind::Osie => "osie",
            InstallerKind::Deny => "deny",
        }
    }
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct Rule {
    matches: fn(&str, &str) -> bool,
    kind: InstallerKind,
}

const RULES: &[Rule] = &[
    Rule {
        matches: |slug, distro| slug == CUSTOM_IPXE || distro == CUSTOM_IPXE,
        kind: InstallerKind::CustomIpxe,
    },
    Rule {
        matches: |slug, distro| slug.starts_with("vmware_esxi_") || distro == "vmware",
        kind: InstallerKind::Vmware,
    },
    Rule {
        matches: |slug, distro| distro == "flatcar" || slug.starts_with("flatcar_"),
        kind: InstallerKind::Flatcar,
    },
    Rule {
        matches: |slug, distro| slug.is_empty() && distro.is_empty(),
        kind: InstallerKind::Deny,
    },
];

/// Select the installer for an OS slug and distro. Never fails.
pub fn select(slug: &str, distro: &str) -> InstallerKind {
    RULES
        .iter()
        .find(|rule| (rule.matches)(slug, distro))
        .map_or(InstallerKind::Osie, |rule| rule.kind)
}

/// Boot-script phase of an installer
pub trait BootScript: Send + Sync + fmt::Debug {
    /// Append this installer's commands after the shared preamble.
    fn boot_script(&self, job: &Job, script: &mut Script) -> Result<(), BootError>;
}

/// Installer-config phase of an installer
pub trait InstallerConfig: Send + Sync + fmt::Debug {
    /// HTTP path the document is served at
    fn path(&self) -> &'static str;

    /// Metrics label and log name
    fn name(&self) -> &'static str;

    fn content_type(&self) -> &'static str;

    fn render(&self, job: &Job, out: &mut dyn fmt::Write) -> Result<(), BootError>;
}

/// The shared block every installer opens with: announce the boot, then
/// identify the facility and plan.
pub(crate) fn announce(job: &Job, script: &mut Script) {
    script
        .phone_home(PROVISIONING_BOOTED)
        .set("packet_facility", job.facility_code())
        .set("packet_plan", job.plan_slug());
}

/// Both dispatch tables, built once at startup
#[derive(Debug)]
pub struct Installers {
    config: Arc<Config>,
    boot: HashMap<InstallerKind, Arc<dyn BootScript>>,
    configs: Vec<Arc<dyn InstallerConfig>>,
}

impl Installers {
    pub fn new(config: Arc<Config>) -> Self {
        let flatcar = Arc::new(Flatcar::new(Arc::clone(&config)));
        let vmware = Arc::new(Vmware::new(Arc::clone(&config)));

        let mut boot: HashMap<InstallerKind, Arc<dyn BootScript>> = HashMap::new();
        boot.insert(InstallerKind::CustomIpxe, Arc::new(CustomIpxe));
        boot.insert(InstallerKind::Osie, Arc::new(Osie::new(Arc::clone(&config))));
        boot.insert(InstallerKind::Flatcar, flatcar.clone());
        boot.insert(InstallerKind::Vmware, vmware.clone());

        let configs = vec![flatcar as Arc<dyn InstallerConfig>, vmware as Arc<dyn InstallerConfig>];

        Self { config, boot, configs }
    }

    pub fn configs(&self) -> &[Arc<dyn InstallerConfig>] {
        &self.configs
    }

    /// Installer config served at `path`
    pub fn config_for_path(&self, path: &str) -> Option<&dyn InstallerConfig> {
        self.configs.iter().find(|c| c.path() == path).map(|c| c.as_ref())
    }

    /// Render the iPXE script `name` (without `.ipxe`) for `job`.
    ///
    /// Returns `Ok(None)` for script names this service does not serve.
    pub fn boot_script(&self, job: &Job, name: &str) -> Result<Option<Vec<u8>>, BootError> {
        let mut script = Script::new();
        script.set("iface", job.interface_name()).or("shell");
        script.set("tinkerbell", self.config.public_url());
        script.set("syslog_host", &self.config.public_syslog_fqdn);
        script.set("ipxe_cloud_config", CLOUD_CONFIG_TAG);
        for (key, value) in &self.config.extra_ipxe_vars {
            script.set(key, value);
        }

        match name {
            "auto" => match self.boot.get(&job.installer()) {
                Some(installer) => installer.boot_script(job, &mut script)?,
                None => debug!(
                    "No boot script for installer {} on hardware {}, serving the preamble only",
                    job.installer(),
                    job.hardware_id()
                ),
            },
            "shell" => {
                script.shell();
            }
            _ => return Ok(None),
        }

        Ok(Some(script.into_bytes()))
    }
}
