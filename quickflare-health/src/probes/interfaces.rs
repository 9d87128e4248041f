//! Interface, MTU and adapter probes

use super::{is_vpn_like, Platform, ProbeContext, ProbeError, ProbeResult, SignalProbe};
use crate::signal::Signal;
use async_trait::async_trait;

/// MTU below which a VPN-like interface counts as tunnelled.
const TUNNEL_MTU_CEILING: u32 = 1400;

/// Interface or adapter name from a header line of `ip`/`ifconfig` output.
fn unix_header_name(platform: Platform, line: &str) -> Option<String> {
    match platform {
        // "3: wg0: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420 ..."
        Platform::Linux | Platform::Other => {
            let mut parts = line.splitn(3, ':');
            let index = parts.next()?.trim();
            if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let name = parts.next()?.trim();
            let name = name.split('@').next().unwrap_or(name);
            (!name.is_empty()).then(|| name.to_string())
        }
        // "utun3: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1380"
        Platform::MacOs => {
            if line.starts_with(char::is_whitespace) {
                return None;
            }
            let (name, _) = line.split_once(':')?;
            (!name.is_empty()).then(|| name.to_string())
        }
        Platform::Windows => None,
    }
}

/// VPN-like interfaces found in interface listing output.
pub(crate) fn find_vpn_interfaces(platform: Platform, output: &str) -> Vec<String> {
    match platform {
        Platform::Windows => output
            .lines()
            .map(str::trim)
            .filter_map(|line| {
                if let Some(header) = line.strip_suffix(':') {
                    let (_, name) = header.split_once(" adapter ")?;
                    return is_vpn_like(name).then(|| name.to_string());
                }
                let (key, value) = line.split_once(" : ")?;
                let value = value.trim();
                (key.starts_with("Description") && is_vpn_like(value)).then(|| value.to_string())
            })
            .collect(),
        _ => output
            .lines()
            .filter_map(|line| unix_header_name(platform, line))
            .filter(|name| is_vpn_like(name))
            .collect(),
    }
}

/// `(interface, mtu)` pairs from `ip link` / `ifconfig` / `netsh` output.
pub(crate) fn parse_interface_mtus(platform: Platform, output: &str) -> Vec<(String, u32)> {
    match platform {
        // "  1280                1       12345      67890  CloudflareWARP"
        Platform::Windows => output
            .lines()
            .filter_map(|line| {
                let mut tokens = line.split_whitespace();
                let mtu = tokens.next()?.parse().ok()?;
                let name = tokens.skip(3).collect::<Vec<_>>().join(" ");
                (!name.is_empty()).then_some((name, mtu))
            })
            .collect(),
        _ => output
            .lines()
            .filter_map(|line| {
                let name = unix_header_name(platform, line)?;
                let mut tokens = line.split_whitespace();
                tokens.find(|t| *t == "mtu")?;
                let mtu = tokens.next()?.parse().ok()?;
                Some((name, mtu))
            })
            .collect(),
    }
}

/// Fires when a tun/tap/wireguard or VPN-branded interface exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualInterfaceProbe;

#[async_trait]
impl SignalProbe for VirtualInterfaceProbe {
    fn signal(&self) -> Signal {
        Signal::VirtualInterface
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let out = match ctx.platform() {
            Platform::Linux => ctx.run("ip", &["addr"]).await?,
            Platform::MacOs => ctx.run("ifconfig", &[]).await?,
            Platform::Windows => ctx.run("ipconfig", &["/all"]).await?,
            Platform::Other => return Err(ProbeError::Unsupported),
        };
        let found = find_vpn_interfaces(ctx.platform(), &out.stdout);
        let detected = !found.is_empty();
        if detected {
            tracing::debug!("VPN-like interfaces: {}", found.join(", "));
            ctx.record(|d| d.virtual_interfaces = found);
        }
        Ok(detected)
    }
}

/// Fires when a VPN-like interface runs with an MTU below 1400.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtuProbe;

#[async_trait]
impl SignalProbe for MtuProbe {
    fn signal(&self) -> Signal {
        Signal::Mtu
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let out = match ctx.platform() {
            Platform::Linux => ctx.run("ip", &["link"]).await?,
            Platform::MacOs => ctx.run("ifconfig", &[]).await?,
            Platform::Windows => {
                ctx.run("netsh", &["interface", "ipv4", "show", "subinterfaces"])
                    .await?
            }
            Platform::Other => return Err(ProbeError::Unsupported),
        };
        Ok(parse_interface_mtus(ctx.platform(), &out.stdout)
            .iter()
            .any(|(name, mtu)| *mtu < TUNNEL_MTU_CEILING && is_vpn_like(name)))
    }
}

/// Whether a `wmic nic get name,netenabled` listing shows an enabled VPN adapter.
pub(crate) fn has_enabled_vpn_adapter(output: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim();
        line.to_ascii_uppercase().ends_with("TRUE") && is_vpn_like(line)
    })
}

/// Fires when an enabled network adapter names a VPN product (Windows only).
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkAdapterProbe;

#[async_trait]
impl SignalProbe for NetworkAdapterProbe {
    fn signal(&self) -> Signal {
        Signal::NetworkAdapter
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        if ctx.platform() != Platform::Windows {
            return Err(ProbeError::Unsupported);
        }
        let out = ctx.run("wmic", &["nic", "get", "name,netenabled"]).await?;
        Ok(has_enabled_vpn_adapter(&out.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP_ADDR: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN group default qlen 1000
    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
    inet 127.0.0.1/8 scope host lo
2: eth0@if12: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP group default
    inet 172.17.0.2/16 brd 172.17.255.255 scope global eth0
5: wg0: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420 qdisc noqueue state UNKNOWN group default qlen 1000
    inet 10.8.0.2/24 scope global wg0
";

    const IFCONFIG: &str = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:00:00:00
utun3: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1380
\tinet 100.96.0.3 --> 100.96.0.3 netmask 0xffffffff
";

    #[test]
    fn test_linux_interfaces() {
        assert_eq!(find_vpn_interfaces(Platform::Linux, IP_ADDR), vec!["wg0"]);
        let clean = IP_ADDR.lines().take(5).collect::<Vec<_>>().join("\n");
        assert!(find_vpn_interfaces(Platform::Linux, &clean).is_empty());
    }

    #[test]
    fn test_linux_mtus() {
        let mtus = parse_interface_mtus(Platform::Linux, IP_ADDR);
        assert_eq!(
            mtus,
            vec![
                ("lo".to_string(), 65536),
                ("eth0".to_string(), 1500),
                ("wg0".to_string(), 1420),
            ]
        );
    }

    #[test]
    fn test_macos_interfaces_and_mtu() {
        assert_eq!(find_vpn_interfaces(Platform::MacOs, IFCONFIG), vec!["utun3"]);
        let mtus = parse_interface_mtus(Platform::MacOs, IFCONFIG);
        assert!(mtus.contains(&("utun3".to_string(), 1380)));
        assert_eq!(mtus.len(), 3);
    }

    #[test]
    fn test_windows_adapters() {
        let out = "\
Windows IP Configuration\r
\r
Ethernet adapter Ethernet:\r
   Description . . . . . . . . . . . : Intel(R) Ethernet Connection I219-V\r
Unknown adapter CloudflareWARP:\r
   Description . . . . . . . . . . . : Cloudflare WARP Interface Tunnel\r
";
        assert_eq!(
            find_vpn_interfaces(Platform::Windows, out),
            vec!["CloudflareWARP", "Cloudflare WARP Interface Tunnel"]
        );
    }

    #[test]
    fn test_windows_mtus() {
        let out = "\
   MTU  MediaSenseState   Bytes In  Bytes Out  Interface\r
------  ---------------  ---------  ---------  -------------\r
4294967295                1          0      12345  Loopback Pseudo-Interface 1\r
  1500                1  123456789   98765432  Ethernet\r
  1280                1      12345      67890  CloudflareWARP\r
";
        let mtus = parse_interface_mtus(Platform::Windows, out);
        assert!(mtus.contains(&("CloudflareWARP".to_string(), 1280)));
        assert!(mtus.contains(&("Ethernet".to_string(), 1500)));
    }

    #[test]
    fn test_enabled_vpn_adapter() {
        let out = "Name                                   NetEnabled\r\nIntel(R) Ethernet Connection I219-V    TRUE\r\nTAP-Windows Adapter V9                 FALSE\r\n";
        assert!(!has_enabled_vpn_adapter(out));
        let out = "Name                                   NetEnabled\r\nWireGuard Tunnel                       TRUE\r\n";
        assert!(has_enabled_vpn_adapter(out));
    }
}
