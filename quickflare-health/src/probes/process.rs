//! Competing VPN client probe

use super::{Platform, ProbeContext, ProbeError, ProbeResult, SignalProbe};
use crate::signal::Signal;
use async_trait::async_trait;

const UNIX_VPN_PROCESSES: &[&str] = &[
    "openvpn",
    "wireguard",
    "wg-quick",
    "nordvpnd",
    "expressvpn",
    "protonvpn",
    "warp-svc",
];

const WINDOWS_VPN_PROCESSES: &[&str] = &[
    "openvpn.exe",
    "wireguard.exe",
    "nordvpn.exe",
    "expressvpn",
    "protonvpn",
    "warp-svc.exe",
];

/// Names from `names` that appear in a process listing.
pub(crate) fn running_vpn_clients(listing: &str, names: &[&str]) -> Vec<String> {
    let lower = listing.to_ascii_lowercase();
    names
        .iter()
        .filter(|name| lower.contains(*name))
        .map(|name| (*name).to_string())
        .collect()
}

/// Whether `netstat -ano` shows WARP/WireGuard or IKE traffic.
pub(crate) fn netstat_shows_vpn(output: &str) -> bool {
    output.lines().any(|line| {
        let mut tokens = line.split_whitespace();
        let proto = tokens.next().unwrap_or_default();
        let local = tokens.next().unwrap_or_default();
        let remote = tokens.next().unwrap_or_default();
        remote.ends_with(":2408")
            || remote.starts_with("162.159.")
            || (proto.eq_ignore_ascii_case("UDP") && local.ends_with(":500"))
    })
}

/// Fires when a known VPN client process is running.
#[derive(Debug, Clone, Copy, Default)]
pub struct VpnProcessProbe;

#[async_trait]
impl SignalProbe for VpnProcessProbe {
    fn signal(&self) -> Signal {
        Signal::VpnProcess
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let found = match ctx.platform() {
            Platform::Windows => {
                let netstat = ctx.run("netstat", &["-ano"]).await?;
                if netstat_shows_vpn(&netstat.stdout) {
                    return Ok(true);
                }
                let tasks = ctx.run("tasklist", &["/FO", "CSV", "/NH"]).await?;
                running_vpn_clients(&tasks.stdout, WINDOWS_VPN_PROCESSES)
            }
            Platform::Linux | Platform::MacOs => {
                let ps = ctx.run("ps", &["aux"]).await?;
                running_vpn_clients(&ps.stdout, UNIX_VPN_PROCESSES)
            }
            Platform::Other => return Err(ProbeError::Unsupported),
        };
        let detected = !found.is_empty();
        if detected {
            ctx.record(|d| d.vpn_processes = found);
        }
        Ok(detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ps_listing() {
        let ps = "\
USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
root       812  0.0  0.1  12345  6789 ?        Ss   09:12   0:00 /usr/sbin/sshd -D
root       901  0.2  0.4  54321  9876 ?        Ssl  09:12   0:03 /usr/bin/warp-svc
";
        assert_eq!(running_vpn_clients(ps, UNIX_VPN_PROCESSES), vec!["warp-svc"]);
        assert!(running_vpn_clients("sshd\nbash\n", UNIX_VPN_PROCESSES).is_empty());
    }

    #[test]
    fn test_tasklist_csv() {
        let tasks = "\"explorer.exe\",\"4120\",\"Console\",\"1\",\"98,000 K\"\r\n\"OpenVPN.exe\",\"5521\",\"Services\",\"0\",\"12,000 K\"\r\n";
        assert_eq!(
            running_vpn_clients(tasks, WINDOWS_VPN_PROCESSES),
            vec!["openvpn.exe"]
        );
    }

    #[test]
    fn test_netstat_warp_endpoint() {
        let out = "  UDP    0.0.0.0:53211          162.159.192.1:2408     *:*    3344\r\n";
        assert!(netstat_shows_vpn(out));

        let out = "  TCP    192.168.0.23:51234     140.82.112.4:443       ESTABLISHED     9000\r\n";
        assert!(!netstat_shows_vpn(out));
    }

    #[test]
    fn test_netstat_ike_listener() {
        let out = "  UDP    0.0.0.0:500            *:*                                    4412\r\n";
        assert!(netstat_shows_vpn(out));
        let out = "  TCP    0.0.0.0:500            0.0.0.0:0              LISTENING       4412\r\n";
        assert!(!netstat_shows_vpn(out));
    }
}
