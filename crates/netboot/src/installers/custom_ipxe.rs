//! Operator-supplied iPXE.
//!
//! Chains to a URL or inlines a script provided on the instance.

use super::{BootScript, announce};
use crate::error::BootError;
use crate::ipxe::Script;
use crate::job::Job;

#[derive(Debug, Clone, Copy, Default)]
pub struct CustomIpxe;

impl BootScript for CustomIpxe {
    fn boot_script(&self, job: &Job, script: &mut Script) -> Result<(), BootError> {
        let data = job.installer_data();
        let chain = data
            .map(|d| d.chain.as_str())
            .filter(|c| !c.is_empty())
            .or_else(|| job.ipxe_script_url());
        let inline = data.map(|d| d.script.as_str()).filter(|s| !s.trim().is_empty());

        if chain.is_none() && inline.is_none() {
            return Err(BootError::Render(format!(
                "ipxe config URL or Script must be defined for hardware {}",
                job.hardware_id()
            )));
        }

        announce(job, script);
        match (chain, inline) {
            (Some(url), _) => {
                script.chain(url);
            }
            (None, Some(raw)) => {
                script.append_raw(raw);
            }
            (None, None) => {}
        }
        Ok(())
    }
}
