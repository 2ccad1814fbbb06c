//! OSIE: the in-memory installation environment, and the fallback for any OS
//! this service has no dedicated installer for.

use super::{BootScript, announce};
use crate::config::Config;
use crate::error::BootError;
use crate::ipxe::Script;
use crate::job::Job;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Osie {
    config: Arc<Config>,
}

impl Osie {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Base URL of the OSIE build to boot. A version pinned on the hardware
    /// is served from the mirror.
    pub fn base_url(&self, job: &Job) -> String {
        let version = &job.hardware().osie_version;
        if version.is_empty() {
            self.config.osie_base_url.clone()
        } else {
            format!("{}/misc/osie/{}", self.config.mirror_base_url, version)
        }
    }
}

impl BootScript for Osie {
    fn boot_script(&self, job: &Job, script: &mut Script) -> Result<(), BootError> {
        announce(job, script);
        script
            .set("arch", job.arch())
            .set("parch", job.plan_slug())
            .set("bootdevmac", job.mac());

        if job.can_workflow() {
            script.set("worker_id", job.hardware_id());
            if let Some(authority) = &self.config.grpc_authority {
                script.set("grpc_authority", authority);
            }
        }

        script.set("base-url", self.base_url(job)).chain("${base-url}/auto.ipxe");
        Ok(())
    }
}
