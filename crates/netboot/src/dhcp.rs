//! DHCPv4 handoff.
//!
//! The UDP side lives elsewhere and passes decoded [`Message`]s here. A
//! request from a known machine is answered with an OFFER or ACK that carries
//! its inventory address and, when it may netboot, the PXE boot options that
//! point it at this service. Unknown machines get no answer at all.

use crate::config::Config;
use crate::error::BootError;
use crate::job::{Job, Resolver};
use crate::metrics::Metrics;
use dhcproto::v4::{DhcpOption, Message, MessageType, Opcode, OptionCode};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vendor option 43: PXE discovery control (sub-option 6) = 8, skip boot
/// server discovery and use the boot file name as given.
const PXE_VENDOR_OPTIONS: [u8; 4] = [0x06, 0x01, 0x08, 0xff];

/// Client architecture types (RFC 4578)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientArch {
    IntelX86Bios,
    EfiX86,
    EfiX64,
    EfiArm32,
    EfiArm64,
    Unknown,
}

impl From<u16> for ClientArch {
    fn from(value: u16) -> Self {
        match value {
            0 => ClientArch::IntelX86Bios,
            6 => ClientArch::EfiX86,
            7 => ClientArch::EfiX64,
            10 => ClientArch::EfiArm32,
            11 => ClientArch::EfiArm64,
            _ => ClientArch::Unknown,
        }
    }
}

impl ClientArch {
    pub fn is_uefi(self) -> bool {
        matches!(
            self,
            ClientArch::EfiX86 | ClientArch::EfiX64 | ClientArch::EfiArm32 | ClientArch::EfiArm64
        )
    }

    pub fn is_arm(self) -> bool {
        matches!(self, ClientArch::EfiArm32 | ClientArch::EfiArm64)
    }
}

/// What the request says about the client, pulled out of its options
#[derive(Debug, Clone)]
pub struct DhcpRequest<'a> {
    pub message: &'a Message,
    pub message_type: MessageType,
    /// Lowercase colon-separated hardware address
    pub mac: String,
    pub arch: Option<ClientArch>,
    /// Firmware is already iPXE (user class option 77)
    pub is_ipxe: bool,
    /// Class identifier (option 60) starts with `PXEClient`
    pub is_pxe: bool,
    /// Class identifier (option 60) starts with `HTTPClient`
    pub is_http: bool,
}

impl<'a> DhcpRequest<'a> {
    pub fn parse(message: &'a Message) -> Result<Self, BootError> {
        let message_type = match message.opts().get(OptionCode::MessageType) {
            Some(DhcpOption::MessageType(mt)) => *mt,
            _ => return Err(BootError::Malformed("DHCP message without a message type".to_string())),
        };

        let chaddr = message.chaddr();
        if chaddr.len() < 6 {
            return Err(BootError::Malformed(format!(
                "DHCP client hardware address is {} bytes long",
                chaddr.len()
            )));
        }
        let mac = chaddr[..6]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":");

        let arch = match message.opts().get(OptionCode::ClientSystemArchitecture) {
            Some(DhcpOption::ClientSystemArchitecture(arch)) => Some(ClientArch::from(u16::from(*arch))),
            _ => None,
        };

        let is_ipxe = match message.opts().get(OptionCode::UserClass) {
            Some(DhcpOption::UserClass(class)) => {
                let class = String::from_utf8_lossy(class);
                class.contains("iPXE") || class.contains("Tinkerbell")
            }
            _ => false,
        };

        let class_id = match message.opts().get(OptionCode::ClassIdentifier) {
            Some(DhcpOption::ClassIdentifier(class)) => String::from_utf8_lossy(class).into_owned(),
            _ => String::new(),
        };

        Ok(Self {
            message,
            message_type,
            mac,
            arch,
            is_ipxe,
            is_pxe: class_id.starts_with("PXEClient"),
            is_http: class_id.starts_with("HTTPClient"),
        })
    }

    /// The client is network booting rather than asking for a plain lease
    pub fn is_netboot(&self) -> bool {
        self.is_ipxe || self.is_pxe || self.is_http
    }
}

/// Boot file name for the client: the iPXE script for iPXE, otherwise an
/// iPXE binary matching the firmware.
pub fn boot_file(config: &Config, request: &DhcpRequest<'_>, job: &Job) -> String {
    if request.is_ipxe {
        return format!("{}/auto.ipxe", config.public_url());
    }

    let arch = request.arch.unwrap_or(ClientArch::IntelX86Bios);
    let binary = if arch.is_arm() || job.is_arm() {
        "snp.efi"
    } else if arch.is_uefi() {
        "ipxe.efi"
    } else {
        "undionly.kpxe"
    };

    if request.is_http {
        format!("{}/{}", config.public_url(), binary)
    } else {
        binary.to_string()
    }
}

/// Build the reply to `request` for `job`.
pub fn build_reply(
    config: &Config,
    request: &DhcpRequest<'_>,
    job: &Job,
    reply_type: MessageType,
) -> Result<Message, BootError> {
    let ip = job
        .interface()
        .and_then(|iface| iface.ip.as_ref())
        .ok_or_else(|| {
            BootError::Unsupported(format!("no address for {} on hardware {}", request.mac, job.hardware_id()))
        })?;
    let IpAddr::V4(address) = ip.address else {
        return Err(BootError::Unsupported(format!(
            "{} on hardware {} has no IPv4 address",
            request.mac,
            job.hardware_id()
        )));
    };

    let mut reply = Message::default();
    reply
        .set_opcode(Opcode::BootReply)
        .set_xid(request.message.xid())
        .set_flags(request.message.flags())
        .set_chaddr(request.message.chaddr())
        .set_giaddr(request.message.giaddr())
        .set_yiaddr(address)
        .set_siaddr(config.public_ipv4);

    let opts = reply.opts_mut();
    opts.insert(DhcpOption::MessageType(reply_type));
    opts.insert(DhcpOption::ServerIdentifier(config.public_ipv4));
    if let Some(mask) = ip.netmask {
        opts.insert(DhcpOption::SubnetMask(mask));
    }
    if let Some(IpAddr::V4(gateway)) = ip.gateway {
        opts.insert(DhcpOption::Router(vec![gateway]));
    }
    if !config.dns_servers.is_empty() {
        opts.insert(DhcpOption::DomainNameServer(config.dns_servers.clone()));
    }
    opts.insert(DhcpOption::AddressLeaseTime(config.lease_time));
    if !job.hostname().is_empty() {
        opts.insert(DhcpOption::Hostname(job.hostname().to_string()));
    }

    if request.is_netboot() && job.should_netboot() {
        let file = boot_file(config, request, job);
        debug!("Offering boot file {} to {}", file, request.mac);
        reply.set_fname_str(&file);

        let opts = reply.opts_mut();
        opts.insert(DhcpOption::BootfileName(file.into_bytes()));
        if request.is_http {
            opts.insert(DhcpOption::ClassIdentifier(b"HTTPClient".to_vec()));
        } else {
            opts.insert(DhcpOption::ClassIdentifier(b"PXEClient".to_vec()));
            opts.insert(DhcpOption::VendorExtensions(PXE_VENDOR_OPTIONS.to_vec()));
        }
    }

    Ok(reply)
}

/// Answers decoded DHCP requests from the inventory
#[derive(Debug, Clone)]
pub struct DhcpResponder {
    resolver: Arc<Resolver>,
    config: Arc<Config>,
    metrics: Arc<Metrics>,
}

impl DhcpResponder {
    pub fn new(resolver: Arc<Resolver>, config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        Self {
            resolver,
            config,
            metrics,
        }
    }

    /// Reply to `message`, or `Ok(None)` when the client gets no answer.
    pub async fn respond(&self, message: &Message) -> Result<Option<Message>, BootError> {
        let _job = self.metrics.track("dhcp", "dhcp");
        let request = DhcpRequest::parse(message)?;

        let reply_type = match request.message_type {
            MessageType::Discover => MessageType::Offer,
            MessageType::Request => MessageType::Ack,
            other => {
                debug!("Ignoring DHCP {:?} from {}", other, request.mac);
                return Ok(None);
            }
        };

        let job = match self.resolver.resolve_mac(&request.mac).await {
            Ok(job) => job,
            Err(BootError::NotFound(_)) => {
                info!(mac = %request.mac, "Unknown DHCP client");
                return Ok(None);
            }
            Err(e) => {
                warn!(mac = %request.mac, error = %e, "Failed to resolve DHCP client");
                return Err(e);
            }
        };

        build_reply(&self.config, &request, &job, reply_type).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MAC, MockJob};
    use dhcproto::v4::Architecture;
    use std::net::Ipv4Addr;
    use inventory_client::{InventoryClientTrait, MockInventoryClient};
    use std::time::Duration;

    const CHADDR: [u8; 16] = [0x00, 0x00, 0xba, 0xdd, 0xbe, 0xef, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

    fn discover(class: Option<&str>, arch: Option<u16>, user_class: Option<&str>) -> Message {
        let mut msg = Message::default();
        msg.set_opcode(Opcode::BootRequest).set_xid(0x1234_5678).set_chaddr(&CHADDR);
        msg.opts_mut().insert(DhcpOption::MessageType(MessageType::Discover));
        if let Some(class) = class {
            msg.opts_mut().insert(DhcpOption::ClassIdentifier(class.as_bytes().to_vec()));
        }
        if let Some(arch) = arch {
            msg.opts_mut()
                .insert(DhcpOption::ClientSystemArchitecture(Architecture::from(arch)));
        }
        if let Some(user_class) = user_class {
            msg.opts_mut().insert(DhcpOption::UserClass(user_class.as_bytes().to_vec()));
        }
        msg
    }

    fn bootfile(reply: &Message) -> Option<String> {
        match reply.opts().get(OptionCode::BootfileName) {
            Some(DhcpOption::BootfileName(name)) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }

    fn class_id(reply: &Message) -> Option<Vec<u8>> {
        match reply.opts().get(OptionCode::ClassIdentifier) {
            Some(DhcpOption::ClassIdentifier(class)) => Some(class.clone()),
            _ => None,
        }
    }

    fn responder(mock: &MockInventoryClient) -> DhcpResponder {
        let inventory: Arc<dyn InventoryClientTrait> = Arc::new(mock.clone());
        let resolver = Arc::new(Resolver::new(inventory, "onprem".to_string(), Duration::from_secs(1)));
        DhcpResponder::new(resolver, Arc::new(Config::default()), Arc::new(Metrics::new().unwrap()))
    }

    #[test]
    fn test_client_arch() {
        assert_eq!(ClientArch::from(0), ClientArch::IntelX86Bios);
        assert_eq!(ClientArch::from(7), ClientArch::EfiX64);
        assert_eq!(ClientArch::from(11), ClientArch::EfiArm64);
        assert_eq!(ClientArch::from(999), ClientArch::Unknown);
        assert!(ClientArch::EfiX64.is_uefi());
        assert!(!ClientArch::IntelX86Bios.is_uefi());
        assert!(ClientArch::EfiArm64.is_arm());
    }

    #[test]
    fn test_parse_request() {
        let msg = discover(Some("PXEClient:Arch:00007"), Some(7), Some("iPXE"));
        let request = DhcpRequest::parse(&msg).unwrap();
        assert_eq!(request.mac, MAC);
        assert_eq!(request.message_type, MessageType::Discover);
        assert_eq!(request.arch, Some(ClientArch::EfiX64));
        assert!(request.is_ipxe);
        assert!(request.is_pxe);
        assert!(!request.is_http);
    }

    #[test]
    fn test_parse_requires_message_type() {
        let mut msg = Message::default();
        msg.set_chaddr(&CHADDR);
        assert!(matches!(DhcpRequest::parse(&msg), Err(BootError::Malformed(_))));
    }

    #[test]
    fn test_boot_file_per_client() {
        let config = Config::default();
        let x86 = MockJob::new("c3.small.x86", "ewr1").job();
        let arm = MockJob::new("c3.large.arm", "ewr1").job();

        let cases = [
            (Some("PXEClient"), Some(0), None, &x86, "undionly.kpxe"),
            (Some("PXEClient"), Some(7), None, &x86, "ipxe.efi"),
            (Some("PXEClient"), Some(11), None, &x86, "snp.efi"),
            (Some("PXEClient"), Some(7), None, &arm, "snp.efi"),
            (Some("PXEClient"), Some(7), Some("iPXE"), &x86, "http://127.0.0.1/auto.ipxe"),
            (Some("HTTPClient:Arch:00016"), Some(7), None, &x86, "http://127.0.0.1/ipxe.efi"),
        ];
        for (class, arch, user_class, job, want) in cases {
            let msg = discover(class, arch, user_class);
            let request = DhcpRequest::parse(&msg).unwrap();
            assert_eq!(boot_file(&config, &request, job), want, "arch {arch:?} user class {user_class:?}");
        }
    }

    #[test]
    fn test_reply_fields() {
        let config = Config {
            dns_servers: vec![Ipv4Addr::new(1, 1, 1, 1)],
            ..Config::default()
        };
        let msg = discover(Some("PXEClient:Arch:00000"), Some(0), None);
        let request = DhcpRequest::parse(&msg).unwrap();
        let job = MockJob::new("c3.small.x86", "ewr1").job();

        let reply = build_reply(&config, &request, &job, MessageType::Offer).unwrap();
        assert_eq!(reply.opcode(), Opcode::BootReply);
        assert_eq!(reply.xid(), 0x1234_5678);
        assert_eq!(reply.yiaddr(), Ipv4Addr::LOCALHOST);
        assert_eq!(reply.siaddr(), config.public_ipv4);
        assert!(matches!(
            reply.opts().get(OptionCode::MessageType),
            Some(DhcpOption::MessageType(MessageType::Offer))
        ));
        assert!(matches!(
            reply.opts().get(OptionCode::SubnetMask),
            Some(DhcpOption::SubnetMask(mask)) if *mask == Ipv4Addr::new(255, 255, 255, 0)
        ));
        assert!(matches!(
            reply.opts().get(OptionCode::Hostname),
            Some(DhcpOption::Hostname(name)) if name == "boots-test.example.com"
        ));
        assert!(reply.opts().get(OptionCode::DomainNameServer).is_some());
        assert_eq!(bootfile(&reply).as_deref(), Some("undionly.kpxe"));
        assert_eq!(class_id(&reply), Some(b"PXEClient".to_vec()));
        assert!(reply.opts().get(OptionCode::VendorExtensions).is_some());
    }

    #[test]
    fn test_http_client_reply_class() {
        let msg = discover(Some("HTTPClient:Arch:00016"), Some(7), None);
        let request = DhcpRequest::parse(&msg).unwrap();
        let job = MockJob::new("c3.small.x86", "ewr1").job();
        let reply = build_reply(&Config::default(), &request, &job, MessageType::Offer).unwrap();
        assert_eq!(class_id(&reply), Some(b"HTTPClient".to_vec()));
        assert!(reply.opts().get(OptionCode::VendorExtensions).is_none());
    }

    #[test]
    fn test_no_boot_options_unless_netboot() {
        let job = MockJob::new("c3.small.x86", "ewr1").allow_pxe(false).job();
        let msg = discover(Some("PXEClient"), Some(7), None);
        let request = DhcpRequest::parse(&msg).unwrap();
        let reply = build_reply(&Config::default(), &request, &job, MessageType::Offer).unwrap();
        assert_eq!(reply.yiaddr(), Ipv4Addr::LOCALHOST);
        assert_eq!(bootfile(&reply), None);

        // Plain lease request from an installed OS
        let job = MockJob::new("c3.small.x86", "ewr1").job();
        let msg = discover(None, None, None);
        let request = DhcpRequest::parse(&msg).unwrap();
        let reply = build_reply(&Config::default(), &request, &job, MessageType::Ack).unwrap();
        assert_eq!(bootfile(&reply), None);
    }

    #[test]
    fn test_ipv6_interface_is_unsupported() {
        let mut hw = MockJob::new("c3.small.x86", "ewr1").hardware();
        if let Some(ip) = hw.interfaces[0].ip.as_mut() {
            ip.address = "fd00::10".parse().unwrap();
        }
        let job = Job::new(hw, &crate::job::Locator::Mac(MAC.to_string()), "onprem");
        let msg = discover(Some("PXEClient"), Some(7), None);
        let request = DhcpRequest::parse(&msg).unwrap();
        let err = build_reply(&Config::default(), &request, &job, MessageType::Offer).unwrap_err();
        assert!(matches!(err, BootError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_respond_known_and_unknown_clients() {
        let mock = MockInventoryClient::new("http://inventory.test");
        let responder = responder(&mock);
        let msg = discover(Some("PXEClient"), Some(7), None);

        assert!(responder.respond(&msg).await.unwrap().is_none());

        mock.add_hardware(MockJob::new("c3.small.x86", "ewr1").hardware());
        let reply = responder.respond(&msg).await.unwrap().unwrap();
        assert_eq!(bootfile(&reply).as_deref(), Some("ipxe.efi"));
    }

    #[tokio::test]
    async fn test_respond_ignores_other_message_types() {
        let mock = MockInventoryClient::new("http://inventory.test");
        mock.add_hardware(MockJob::new("c3.small.x86", "ewr1").hardware());
        let responder = responder(&mock);

        let mut msg = discover(Some("PXEClient"), Some(7), None);
        msg.opts_mut().insert(DhcpOption::MessageType(MessageType::Release));
        assert!(responder.respond(&msg).await.unwrap().is_none());

        msg.opts_mut().insert(DhcpOption::MessageType(MessageType::Request));
        let reply = responder.respond(&msg).await.unwrap().unwrap();
        assert!(matches!(
            reply.opts().get(OptionCode::MessageType),
            Some(DhcpOption::MessageType(MessageType::Ack))
        ));
    }

    #[tokio::test]
    async fn test_respond_backend_down_is_error() {
        let mock = MockInventoryClient::new("http://inventory.test");
        mock.set_unavailable(true);
        let msg = discover(Some("PXEClient"), Some(7), None);
        let err = responder(&mock).respond(&msg).await.unwrap_err();
        assert!(matches!(err, BootError::Unavailable(_)));
    }
}
