//! Helper functions for creating hardware fixtures

use crate::models::{Instance, Interface, IpConfig, Netboot, OperatingSystem};
use std::net::IpAddr;

/// Interface with an address, allowed to PXE boot and run workflows
pub fn interface(name: &str, mac: &str, ip: IpAddr) -> Interface {
    Interface {
        name: name.to_string(),
        mac: mac.to_string(),
        ip: Some(IpConfig {
            address: ip,
            netmask: Some([255, 255, 255, 0].into()),
            gateway: None,
        }),
        netboot: Netboot {
            allow_pxe: true,
            allow_workflow: true,
        },
    }
}

/// Instance running the given OS slug and distro
pub fn instance(id: &str, slug: &str, distro: &str) -> Instance {
    Instance {
        id: id.to_string(),
        hostname: format!("{}.example.com", id),
        operating_system: OperatingSystem {
            slug: slug.to_string(),
            distro: distro.to_string(),
            ..OperatingSystem::default()
        },
        ..Instance::default()
    }
}
