//! [`EndpointResolver`] – locate the simulator host without manual setup.
//!
//! The common deployment runs this service inside a guest Linux environment
//! (WSL-style) while the simulator listens on the hosting OS. The guest
//! cannot use loopback to reach it, so the resolver harvests candidate host
//! addresses from the guest's network configuration and probes them in
//! priority order:
//!
//! | Priority | Source |
//! |---|---|
//! | 1 | explicit override (config / `AEROLINK_SIM_HOST`) — no probing |
//! | 2 | first `nameserver` in `/etc/resolv.conf` |
//! | 3 | `default via` gateway from `ip route show default` |
//! | 4 | `AEROLINK_GATEWAY_HINT` environment value |
//! | 5 | configurable static fallback gateways |
//!
//! Resolution never fails: when every probe comes back negative the last
//! static fallback is returned as a best guess, and the subsequent connect
//! attempt produces the user-facing error.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

/// Fixed TCP port of the simulator's RPC service.
pub const SIM_PORT: u16 = 41451;

/// Secondary override consulted as a guest-side candidate (priority 4).
const GATEWAY_HINT_ENV: &str = "AEROLINK_GATEWAY_HINT";

/// Substrings of `/proc/version` that identify a guest-hosted kernel.
const GUEST_MARKERS: [&str; 2] = ["microsoft", "wsl"];

/// Probe and classify candidate simulator endpoints.
///
/// Construct once from configuration; [`resolve`][Self::resolve] is cheap
/// enough to re-run on every reconnect.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    /// Used unconditionally when set; probing is skipped entirely.
    override_host: Option<String>,
    /// Per-candidate TCP connect budget.
    probe_timeout: Duration,
    /// Historically common host-side gateway addresses, probed last.
    fallback_gateways: Vec<String>,
    port: u16,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self {
            override_host: None,
            probe_timeout: Duration::from_secs(3),
            fallback_gateways: vec!["192.168.1.1".to_string(), "192.168.0.1".to_string()],
            port: SIM_PORT,
        }
    }
}

impl EndpointResolver {
    pub fn new(
        override_host: Option<String>,
        probe_timeout: Duration,
        fallback_gateways: Vec<String>,
        port: u16,
    ) -> Self {
        Self {
            override_host: override_host.filter(|h| !h.trim().is_empty()),
            probe_timeout,
            fallback_gateways,
            port,
        }
    }

    /// The port every candidate is probed on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Produce a simulator host address. Never fails; the result is a best
    /// guess when nothing answered a probe.
    pub async fn resolve(&self) -> String {
        if let Some(host) = &self.override_host {
            info!(host = %host, "using explicit simulator host override");
            return host.clone();
        }

        if !self.is_guest_hosted() {
            debug!("native environment detected, using loopback");
            return "127.0.0.1".to_string();
        }

        let candidates = self.guest_candidates();
        info!(?candidates, "guest-hosted environment, probing host-side candidates");

        if let Some(host) = self.probe_first(&candidates).await {
            info!(host = %host, "candidate accepted a connection");
            return host;
        }

        if let Some(host) = self.probe_first(&self.fallback_gateways).await {
            info!(host = %host, "static fallback gateway accepted a connection");
            return host;
        }

        // Nothing answered; hand back the last fallback so the caller's own
        // connect attempt surfaces the failure.
        let best_guess = self
            .fallback_gateways
            .last()
            .cloned()
            .unwrap_or_else(|| "127.0.0.1".to_string());
        info!(host = %best_guess, "all probes failed, degrading to best-guess address");
        best_guess
    }

    /// Whether this process runs inside a guest Linux environment hosted by
    /// a different OS instance.
    pub fn is_guest_hosted(&self) -> bool {
        match std::fs::read_to_string("/proc/version") {
            Ok(contents) => is_guest_kernel(&contents),
            Err(_) => false,
        }
    }

    /// Candidate host addresses in priority order, deduplicated.
    fn guest_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(ns) = read_nameserver(Path::new("/etc/resolv.conf")) {
            candidates.push(ns);
        }
        if let Some(gw) = default_gateway() {
            candidates.push(gw);
        }
        if let Ok(hint) = std::env::var(GATEWAY_HINT_ENV)
            && !hint.trim().is_empty()
        {
            candidates.push(hint.trim().to_string());
        }
        candidates.dedup();
        candidates
    }

    /// Every address this resolver could consider, in priority order.
    /// Used by the connectivity diagnostics surface, not by [`resolve`][Self::resolve].
    pub fn candidate_addresses(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(host) = &self.override_host {
            out.push(host.clone());
        }
        out.push("127.0.0.1".to_string());
        out.extend(self.guest_candidates());
        out.extend(self.fallback_gateways.iter().cloned());
        out.dedup();
        out
    }

    /// Probe `candidates` in order and return the first that accepts a TCP
    /// connection on the simulator port.
    pub(crate) async fn probe_first(&self, candidates: &[String]) -> Option<String> {
        for host in candidates {
            if test_connectivity(host, self.port, self.probe_timeout).await {
                return Some(host.clone());
            }
            debug!(host = %host, port = self.port, "candidate did not answer");
        }
        None
    }
}

/// Open and immediately close a TCP connection to `host:port`.
///
/// Any failure — refusal, timeout, unresolvable address — is a negative
/// result. Never errors.
pub async fn test_connectivity(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(_)) | Err(_) => false,
    }
}

/// Classify `/proc/version` contents. Case-insensitive substring match
/// against the known guest markers.
fn is_guest_kernel(proc_version: &str) -> bool {
    let lowered = proc_version.to_lowercase();
    GUEST_MARKERS.iter().any(|m| lowered.contains(m))
}

/// First `nameserver` entry of a resolv.conf file, if any.
fn read_nameserver(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_nameserver(&contents)
}

fn parse_nameserver(resolv_conf: &str) -> Option<String> {
    resolv_conf.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("nameserver") => parts.next().map(str::to_string),
            _ => None,
        }
    })
}

/// Gateway of the default IP route, via `ip route show default`.
fn default_gateway() -> Option<String> {
    let output = Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_default_gateway(&String::from_utf8_lossy(&output.stdout))
}

fn parse_default_gateway(route_output: &str) -> Option<String> {
    route_output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        loop {
            match parts.next()? {
                "via" => return parts.next().map(str::to_string),
                _ => continue,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn guest_kernel_markers_are_case_insensitive() {
        assert!(is_guest_kernel(
            "Linux version 5.15.90.1-microsoft-standard-WSL2 (gcc ...)"
        ));
        assert!(is_guest_kernel("linux version 4.4.0 Microsoft build"));
        assert!(!is_guest_kernel("Linux version 6.8.0-41-generic (ubuntu)"));
    }

    #[test]
    fn nameserver_parse_takes_first_entry() {
        let conf = "# generated by the guest network layer\nnameserver 10.255.255.254\nnameserver 8.8.8.8\n";
        assert_eq!(parse_nameserver(conf).as_deref(), Some("10.255.255.254"));
    }

    #[test]
    fn nameserver_parse_ignores_comments_and_other_keys() {
        let conf = "search localdomain\n# nameserver 1.1.1.1\noptions edns0\n";
        assert_eq!(parse_nameserver(conf), None);
    }

    #[test]
    fn gateway_parse_reads_default_via() {
        let out = "default via 172.21.176.1 dev eth0 proto kernel\n";
        assert_eq!(parse_default_gateway(out).as_deref(), Some("172.21.176.1"));
    }

    #[test]
    fn gateway_parse_handles_missing_route() {
        assert_eq!(parse_default_gateway(""), None);
        assert_eq!(parse_default_gateway("169.254.0.0/16 dev eth0 scope link\n"), None);
    }

    #[tokio::test]
    async fn connectivity_probe_succeeds_against_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(test_connectivity("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn connectivity_probe_fails_on_closed_port() {
        // Bind then drop to obtain a port that is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!test_connectivity("127.0.0.1", port, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn connectivity_probe_times_out_without_error() {
        // TEST-NET-1 is reserved and unroutable; the probe must report
        // false within the timeout rather than hang or panic.
        assert!(!test_connectivity("192.0.2.1", 41451, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn probe_first_returns_first_reachable_in_priority_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let resolver = EndpointResolver::new(
            None,
            Duration::from_millis(300),
            vec![],
            port,
        );
        // First candidate unreachable, second reachable, third never probed.
        let candidates = vec![
            "192.0.2.1".to_string(),
            "127.0.0.1".to_string(),
            "192.0.2.2".to_string(),
        ];
        let chosen = resolver.probe_first(&candidates).await;
        assert_eq!(chosen.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn probe_first_exhausts_dead_candidates() {
        let resolver =
            EndpointResolver::new(None, Duration::from_millis(200), vec![], 41451);
        let candidates = vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()];
        assert_eq!(resolver.probe_first(&candidates).await, None);
    }

    #[tokio::test]
    async fn explicit_override_wins_without_probing() {
        let resolver = EndpointResolver::new(
            Some("10.1.2.3".to_string()),
            Duration::from_millis(1),
            vec!["192.168.1.1".to_string()],
            41451,
        );
        assert_eq!(resolver.resolve().await, "10.1.2.3");
    }

    #[test]
    fn blank_override_is_treated_as_unset() {
        let resolver = EndpointResolver::new(
            Some("   ".to_string()),
            Duration::from_secs(1),
            vec![],
            41451,
        );
        assert!(resolver.override_host.is_none());
    }
}
