use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::Result;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(8);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const IP_ECHO_URLS: [&str; 2] = ["https://api.ip.sb/ip", "http://api.ip.sb/ip"];
const DOMAIN_LOOKUP_URL: &str = "http://ipget.net/";

/// Shown in client artifacts when the host has no reachable public address.
pub const UNKNOWN_SERVER_IP: &str = "your_server_ip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// Outbound lookups. Lookup failures read as `None`.
pub trait Net {
    fn public_ip(&self, family: IpFamily) -> Option<String>;
    fn resolve_domain(&self, domain: &str) -> Option<String>;
    fn fetch_text(&self, url: &str) -> Result<String>;
}

/// IPv4 first, then IPv6, then a placeholder.
pub fn server_ip(net: &dyn Net) -> String {
    net.public_ip(IpFamily::V4)
        .or_else(|| net.public_ip(IpFamily::V6))
        .unwrap_or_else(|| UNKNOWN_SERVER_IP.to_string())
}

/// True when the address needs brackets in `host:port` form.
#[must_use]
pub fn is_ipv6(addr: &str) -> bool {
    addr.contains(':')
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpNet;

impl HttpNet {
    fn client(family: Option<IpFamily>, timeout: Duration) -> Option<Client> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true);
        // Binding the unspecified address of a family forces that family.
        builder = match family {
            Some(IpFamily::V4) => builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Some(IpFamily::V6) => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            None => builder,
        };
        match builder.build() {
            Ok(client) => Some(client),
            Err(err) => {
                debug!(error = %err, "http_client_build_failed");
                None
            }
        }
    }

    fn get_first_line(client: &Client, url: &str) -> Option<String> {
        let body = client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text());
        match body {
            Ok(body) => first_line(&body),
            Err(err) => {
                debug!(url = url, error = %err, "lookup_request_failed");
                None
            }
        }
    }
}

impl Net for HttpNet {
    fn public_ip(&self, family: IpFamily) -> Option<String> {
        let client = Self::client(Some(family), LOOKUP_TIMEOUT)?;
        IP_ECHO_URLS
            .iter()
            .find_map(|url| Self::get_first_line(&client, url))
    }

    fn resolve_domain(&self, domain: &str) -> Option<String> {
        let client = Self::client(None, LOOKUP_TIMEOUT)?;
        let url = format!("{}?ip={}", DOMAIN_LOOKUP_URL, urlencoding::encode(domain));
        Self::get_first_line(&client, &url)
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
        let body = client.get(url).send()?.error_for_status()?.text()?;
        Ok(body)
    }
}

fn first_line(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}
