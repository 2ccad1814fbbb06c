//! Service configuration.
//!
//! Built once at startup from environment variables and shared read-only by
//! the resolver, the installers and the HTTP front.

use crate::error::BootError;
use ipnet::IpNet;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:80";
const DEFAULT_INVENTORY_URL: &str = "http://127.0.0.1:42113";
const DEFAULT_FACILITY: &str = "onprem";
const DEFAULT_INVENTORY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LEASE_TIME: u32 = 172_800;

/// Netboot service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub public_ipv4: Ipv4Addr,
    pub public_fqdn: String,
    pub public_syslog_fqdn: String,
    /// Facility used when a hardware record carries none
    pub facility_code: String,
    pub mirror_base_url: String,
    pub osie_base_url: String,
    pub osie_vendor_services_url: String,
    pub grpc_authority: Option<String>,
    pub inventory_url: String,
    pub inventory_token: String,
    pub inventory_timeout: Duration,
    /// Peers allowed to set X-Forwarded-For
    pub trusted_proxies: Vec<IpNet>,
    /// Extra `set` lines for every boot script, in order
    pub extra_ipxe_vars: Vec<(String, String)>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_time: u32,
}

impl Default for Config {
    fn default() -> Self {
        let public_ipv4 = Ipv4Addr::LOCALHOST;
        let public_fqdn = public_ipv4.to_string();
        let mirror_base_url = format!("http://{}", public_fqdn);
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
            public_ipv4,
            public_syslog_fqdn: public_fqdn.clone(),
            facility_code: DEFAULT_FACILITY.to_string(),
            osie_base_url: format!("{}/misc/osie/current", mirror_base_url),
            osie_vendor_services_url: format!("{}/vendor-services", mirror_base_url),
            mirror_base_url,
            public_fqdn,
            grpc_authority: None,
            inventory_url: DEFAULT_INVENTORY_URL.to_string(),
            inventory_token: String::new(),
            inventory_timeout: Duration::from_secs(DEFAULT_INVENTORY_TIMEOUT_SECS),
            trusted_proxies: Vec::new(),
            extra_ipxe_vars: Vec::new(),
            dns_servers: Vec::new(),
            lease_time: DEFAULT_LEASE_TIME,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, BootError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BootError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| BootError::Configuration(format!("{} environment variable is required", key)))
        };

        let public_ipv4: Ipv4Addr = parse("PUBLIC_IP", &required("PUBLIC_IP")?)?;
        let public_fqdn = get("PUBLIC_FQDN").unwrap_or_else(|| public_ipv4.to_string());
        let mirror_base_url = get("MIRROR_BASE_URL")
            .unwrap_or_else(|| format!("http://{}", public_fqdn))
            .trim_end_matches('/')
            .to_string();

        let inventory_timeout = match get("INVENTORY_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse("INVENTORY_TIMEOUT_SECS", &v)?),
            None => Duration::from_secs(DEFAULT_INVENTORY_TIMEOUT_SECS),
        };

        Ok(Self {
            http_addr: parse("HTTP_BIND", &get("HTTP_BIND").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()))?,
            public_ipv4,
            public_syslog_fqdn: get("PUBLIC_SYSLOG_FQDN").unwrap_or_else(|| public_ipv4.to_string()),
            facility_code: get("FACILITY_CODE").unwrap_or_else(|| DEFAULT_FACILITY.to_string()),
            osie_base_url: get("OSIE_BASE_URL")
                .unwrap_or_else(|| format!("{}/misc/osie/current", mirror_base_url)),
            osie_vendor_services_url: get("OSIE_VENDOR_SERVICES_URL")
                .unwrap_or_else(|| format!("{}/vendor-services", mirror_base_url)),
            mirror_base_url,
            public_fqdn,
            grpc_authority: get("TINKERBELL_GRPC_AUTHORITY"),
            inventory_url: get("INVENTORY_URL").unwrap_or_else(|| DEFAULT_INVENTORY_URL.to_string()),
            inventory_token: required("INVENTORY_TOKEN")?,
            inventory_timeout,
            trusted_proxies: parse_list("TRUSTED_PROXIES", get("TRUSTED_PROXIES"))?,
            extra_ipxe_vars: parse_ipxe_vars(get("IPXE_EXTRA_VARS").as_deref().unwrap_or(""))?,
            dns_servers: parse_list("DNS_SERVERS", get("DNS_SERVERS"))?,
            lease_time: match get("DHCP_LEASE_TIME") {
                Some(v) => parse("DHCP_LEASE_TIME", &v)?,
                None => DEFAULT_LEASE_TIME,
            },
        })
    }

    /// Base URL machines use to reach this service
    pub fn public_url(&self) -> String {
        format!("http://{}", self.public_fqdn)
    }

    pub fn phone_home_url(&self) -> String {
        format!("{}/phone-home", self.public_url())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, BootError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BootError::Configuration(format!("invalid {} {:?}: {}", key, value, e)))
}

fn parse_list<T>(key: &str, value: Option<String>) -> Result<Vec<T>, BootError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse(key, s))
        .collect()
}

/// Parse whitespace-separated `key=value` pairs, keeping their order.
fn parse_ipxe_vars(raw: &str) -> Result<Vec<(String, String)>, BootError> {
    raw.split_whitespace()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => Err(BootError::Configuration(format!(
                "invalid IPXE_EXTRA_VARS entry {:?}, expected key=value",
                pair
            ))),
        })
        .collect()
}
