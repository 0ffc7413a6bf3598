//! Reachable address announcement
//!
//! Advisory only: nothing in request handling depends on it.

use qrcode::QrCode;
use qrcode::render::unicode;
use std::net::{IpAddr, SocketAddr};

/// URLs other devices can use to reach a listener bound to `local_addr`.
///
/// For a wildcard bind every non-loopback IPv4 interface is listed, falling
/// back to localhost when there is none. A concrete bind address is used as
/// is.
pub fn reachable_urls(scheme: &str, local_addr: SocketAddr) -> Vec<String> {
    if !local_addr.ip().is_unspecified() {
        return vec![format_url(scheme, local_addr.ip(), local_addr.port())];
    }

    let interfaces: Vec<IpAddr> = match local_ip_address::list_afinet_netifas() {
        Ok(list) => list.into_iter().map(|(_name, ip)| ip).collect(),
        Err(e) => {
            tracing::warn!("Could not list network interfaces: {}", e);
            Vec::new()
        }
    };

    let urls = urls_for_interfaces(scheme, local_addr.port(), interfaces);
    if urls.is_empty() {
        return vec![format_url(
            scheme,
            IpAddr::from([127, 0, 0, 1]),
            local_addr.port(),
        )];
    }
    urls
}

/// Keep IPv4, non-loopback addresses, one URL each, in interface order
pub fn urls_for_interfaces(
    scheme: &str,
    port: u16,
    interfaces: impl IntoIterator<Item = IpAddr>,
) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for ip in interfaces {
        if !ip.is_ipv4() || ip.is_loopback() || ip.is_unspecified() {
            continue;
        }
        let url = format_url(scheme, ip, port);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

fn format_url(scheme: &str, ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}://{}:{}", scheme, v4, port),
        IpAddr::V6(v6) => format!("{}://[{}]:{}", scheme, v6, port),
    }
}

/// Render a URL as a terminal QR code (two modules per character row)
pub fn render_qr(url: &str) -> Option<String> {
    let code = QrCode::new(url.as_bytes()).ok()?;
    Some(
        code.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}
