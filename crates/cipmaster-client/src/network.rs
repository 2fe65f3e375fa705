//! Host network checks: target reachability and the multicast route.
//!
//! Everything that touches the OS goes through [`Platform`] and
//! [`ProcessRunner`] so the parsing can be tested against captured output.

use ipnetwork::{ipv4_mask_to_prefix, Ipv4Network};
use std::io;
use std::net::Ipv4Addr;
use std::process::{Command, Stdio};

/// Reports the host operating system, using `std::env::consts::OS` names.
pub trait Platform {
    fn os_name(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn os_name(&self) -> String {
        std::env::consts::OS.to_string()
    }
}

pub trait ProcessRunner {
    /// Runs `command` and returns its exit code.
    fn status(&self, command: &[String]) -> io::Result<i32>;
    /// Runs `command` and returns stdout; a non-zero exit is an error.
    fn output(&self, command: &[String]) -> io::Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn status(&self, command: &[String]) -> io::Result<i32> {
        let (program, args) = split_command(command)?;
        let status = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }

    fn output(&self, command: &[String]) -> io::Result<String> {
        let (program, args) = split_command(command)?;
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{program} exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn split_command(command: &[String]) -> io::Result<(&str, &[String])> {
    match command {
        [program, args @ ..] => Ok((program.as_str(), args)),
        [] => Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command")),
    }
}

fn command(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub fn ping_command(platform: &dyn Platform, target: &str) -> Vec<String> {
    if platform.os_name() == "windows" {
        command(&["ping", "-n", "1", target])
    } else {
        command(&["ping", "-c", "1", target])
    }
}

/// Route table command for the host, or `None` when the OS is not supported.
pub fn route_command(platform: &dyn Platform) -> Option<Vec<String>> {
    match platform.os_name().as_str() {
        "windows" => Some(command(&["route", "print"])),
        "linux" => Some(command(&["ip", "route", "show", "table", "all"])),
        "macos" => Some(command(&["netstat", "-rn"])),
        _ => None,
    }
}

const MULTICAST_BASE: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 0);
const MULTICAST_PREFIX: u8 = 4;

/// The 224.0.0.0/4 multicast block.
pub fn multicast_range() -> Option<Ipv4Network> {
    Ipv4Network::new(MULTICAST_BASE, MULTICAST_PREFIX).ok()
}

fn in_multicast_range(net: Ipv4Network) -> bool {
    multicast_range().is_some_and(|range| net.is_subnet_of(range))
}

/// Network with the host bits of `address` cleared.
fn masked(address: Ipv4Addr, prefix: u8) -> Option<Ipv4Network> {
    let net = Ipv4Network::new(address, prefix).ok()?;
    Ipv4Network::new(net.network(), prefix).ok()
}

/// Reads a CIDR-like token, padding short bases such as `224.0.0/4`.
fn parse_prefix_token(token: &str) -> Option<Ipv4Network> {
    let (base, prefix) = token.split_once('/')?;
    let base = base.trim();
    let prefix = prefix.trim();
    if base.is_empty() || prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded = base.to_string();
    while padded.matches('.').count() < 3 {
        padded.push_str(".0");
    }
    masked(padded.parse().ok()?, prefix.parse().ok()?)
}

/// Reads an address followed by a dotted netmask. Only contiguous masks
/// are accepted.
fn parse_netmask_pair(address: Ipv4Addr, netmask: Ipv4Addr) -> Option<Ipv4Network> {
    masked(address, ipv4_mask_to_prefix(netmask).ok()?)
}

fn addresses_in(line: &str) -> Vec<Ipv4Addr> {
    line.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Infers a prefix from the trailing zero octets of a bare multicast route.
fn guess_network(address: Ipv4Addr) -> Option<Ipv4Network> {
    if address == MULTICAST_BASE {
        return multicast_range();
    }
    let prefix = match address.octets() {
        [_, 0, 0, 0] => 8,
        [_, _, 0, 0] => 16,
        [_, _, _, 0] => 24,
        _ => 32,
    };
    masked(address, prefix)
}

/// Returns the first multicast network found in route table output.
pub fn parse_multicast_route(stdout: &str) -> Option<Ipv4Network> {
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let cleaned = line.replace(',', " ");
        let cidr = cleaned
            .split_whitespace()
            .filter_map(parse_prefix_token)
            .find(|net| in_multicast_range(*net));
        if cidr.is_some() {
            return cidr;
        }

        let addresses = addresses_in(line);
        if let [network, netmask, ..] = addresses.as_slice() {
            if let Some(net) = parse_netmask_pair(*network, *netmask) {
                if in_multicast_range(net) {
                    return Some(net);
                }
            }
        }

        if line.to_ascii_lowercase().contains("multicast") {
            let guessed = addresses
                .iter()
                .copied()
                .filter(|address| address.is_multicast())
                .filter_map(guess_network)
                .find(|net| in_multicast_range(*net));
            return guessed.or_else(multicast_range);
        }
    }
    None
}

/// True when `target` answers a single ping.
pub fn communicate_with_target(
    target: &str,
    platform: &dyn Platform,
    runner: &dyn ProcessRunner,
) -> bool {
    match runner.status(&ping_command(platform, target)) {
        Ok(code) => code == 0,
        Err(err) => {
            log::warn!("ping command failed: {err}");
            false
        }
    }
}

pub fn get_multicast_route(
    platform: &dyn Platform,
    runner: &dyn ProcessRunner,
) -> Option<Ipv4Network> {
    let Some(command) = route_command(platform) else {
        log::warn!(
            "multicast route lookup not supported on {}",
            platform.os_name()
        );
        return None;
    };
    match runner.output(&command) {
        Ok(stdout) => parse_multicast_route(&stdout),
        Err(err) => {
            log::warn!("failed to obtain multicast route: {err}");
            None
        }
    }
}

/// Returns `(supported, route_exists, route)` for `multicast_address`.
/// A provided `route` skips the route table lookup.
pub fn check_multicast_support(
    multicast_address: &str,
    route: Option<String>,
    platform: &dyn Platform,
    runner: &dyn ProcessRunner,
) -> (bool, bool, Option<String>) {
    let address: Ipv4Addr = match multicast_address.parse() {
        Ok(address) => address,
        Err(err) => {
            log::warn!("invalid multicast address {multicast_address}: {err}");
            return (false, false, route);
        }
    };

    let route = route.or_else(|| get_multicast_route(platform, runner).map(|net| net.to_string()));
    let Some(route) = route else {
        return (false, false, None);
    };
    match route.parse::<Ipv4Network>() {
        Ok(net) => (net.contains(address), true, Some(route)),
        Err(err) => {
            log::warn!("invalid multicast route discovered: {err}");
            (false, true, Some(route))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NetworkCheckResult {
    pub reachable: bool,
    pub multicast_supported: bool,
    pub route_exists: bool,
    pub route: Option<String>,
}

impl NetworkCheckResult {
    /// Label/status rows for display.
    pub fn summary(&self) -> Vec<(&'static str, &'static str)> {
        let flag = |ok: bool| if ok { "OK" } else { "FAILED" };
        vec![
            ("Communication with Target", flag(self.reachable)),
            ("Multicast Group Join", flag(self.multicast_supported)),
            ("Multicast Route Compatibility", flag(self.route_exists)),
        ]
    }
}

pub fn check_network(
    target: &str,
    multicast_address: &str,
    platform: &dyn Platform,
    runner: &dyn ProcessRunner,
) -> NetworkCheckResult {
    let reachable = communicate_with_target(target, platform, runner);
    let (multicast_supported, route_exists, route) =
        check_multicast_support(multicast_address, None, platform, runner);
    log::info!(
        "network check for {target}: reachable={reachable} multicast={multicast_supported} route={route:?}"
    );
    NetworkCheckResult {
        reachable,
        multicast_supported,
        route_exists,
        route,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        check_multicast_support, check_network, masked, multicast_range, parse_multicast_route,
        parse_netmask_pair, Platform, ProcessRunner,
    };
    use ipnetwork::Ipv4Network;
    use proptest::prelude::*;
    use std::io;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    struct FixedPlatform(&'static str);

    impl Platform for FixedPlatform {
        fn os_name(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Default)]
    struct RecordingRunner {
        exit_code: i32,
        stdout: String,
        commands: Mutex<Vec<Vec<String>>>,
    }

    impl ProcessRunner for RecordingRunner {
        fn status(&self, command: &[String]) -> io::Result<i32> {
            self.commands.lock().unwrap().push(command.to_vec());
            Ok(self.exit_code)
        }

        fn output(&self, command: &[String]) -> io::Result<String> {
            self.commands.lock().unwrap().push(command.to_vec());
            Ok(self.stdout.clone())
        }
    }

    const WINDOWS_ROUTES: &str = "
===========================================================================
Active Routes:
Network Destination        Netmask          Gateway       Interface  Metric
          0.0.0.0          0.0.0.0     192.168.0.1   192.168.0.100     25
        224.0.0.0        240.0.0.0         On-link    192.168.0.100    256
===========================================================================
";

    const LINUX_ROUTES: &str = "
default via 192.168.0.1 dev eth0 proto dhcp metric 100
224.0.0.0/4 dev eth0 scope link
";

    const LINUX_MULTICAST_KEYWORD: &str = "
multicast 239.192.0.0 dev eth0 scope link src 172.16.5.16
multicast 224.0.0.0 dev eth0 scope link src 172.16.5.16
";

    const DARWIN_ROUTES: &str = "
Internet:
Destination        Gateway            Flags        Netif Expire
224.0.0/4          link#4             UmCS            en0
";

    #[test]
    fn parses_route_tables_from_each_platform() {
        for output in [WINDOWS_ROUTES, LINUX_ROUTES, DARWIN_ROUTES] {
            assert_eq!(
                parse_multicast_route(output).unwrap().to_string(),
                "224.0.0.0/4"
            );
        }
        assert_eq!(
            parse_multicast_route(LINUX_MULTICAST_KEYWORD)
                .unwrap()
                .to_string(),
            "239.192.0.0/16"
        );
        assert_eq!(parse_multicast_route("default via 10.0.0.1 dev eth0"), None);
    }

    #[test]
    fn multicast_keyword_without_address_falls_back() {
        assert_eq!(
            parse_multicast_route("multicast route via eth0"),
            multicast_range()
        );
        assert_eq!(
            parse_multicast_route("multicast 239.192.7.0 dev eth0")
                .unwrap()
                .to_string(),
            "239.192.7.0/24"
        );
    }

    #[test]
    fn route_membership() {
        let net: Ipv4Network = "239.192.0.0/16".parse().unwrap();
        assert!(net.contains(Ipv4Addr::new(239, 192, 1, 2)));
        assert!(!net.contains(Ipv4Addr::new(10, 0, 0, 5)));
        assert!("10.0.0.0/33".parse::<Ipv4Network>().is_err());

        let pair = parse_netmask_pair(Ipv4Addr::new(239, 1, 2, 3), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(pair.unwrap().to_string(), "239.0.0.0/8");
        assert_eq!(
            parse_netmask_pair(Ipv4Addr::new(224, 0, 0, 0), Ipv4Addr::new(255, 0, 255, 0)),
            None
        );
    }

    #[test]
    fn provided_route_skips_lookup() {
        let runner = RecordingRunner::default();
        let platform = FixedPlatform("linux");
        let (supported, exists, route) = check_multicast_support(
            "239.192.1.2",
            Some("239.192.0.0/16".into()),
            &platform,
            &runner,
        );
        assert!(supported && exists);
        assert_eq!(route.as_deref(), Some("239.192.0.0/16"));
        assert!(runner.commands.lock().unwrap().is_empty());

        let (supported, exists, _) =
            check_multicast_support("not-an-ip", None, &platform, &runner);
        assert!(!supported && !exists);
    }

    #[test]
    fn unsupported_platform_has_no_route() {
        let runner = RecordingRunner::default();
        let (supported, exists, route) =
            check_multicast_support("239.192.1.2", None, &FixedPlatform("plan9"), &runner);
        assert_eq!((supported, exists, route), (false, false, None));
    }

    #[test]
    fn check_network_uses_platform_commands() {
        let runner = RecordingRunner {
            exit_code: 0,
            stdout: WINDOWS_ROUTES.to_string(),
            ..Default::default()
        };
        let platform = FixedPlatform("windows");
        let result = check_network("192.168.0.10", "239.192.1.2", &platform, &runner);
        assert!(result.reachable);
        assert!(result.multicast_supported);
        assert_eq!(result.route.as_deref(), Some("224.0.0.0/4"));
        assert!(result.summary().iter().all(|(_, status)| *status == "OK"));

        let commands = runner.commands.lock().unwrap();
        assert_eq!(commands[0], vec!["ping", "-n", "1", "192.168.0.10"]);
        assert_eq!(commands[1], vec!["route", "print"]);
    }

    #[test]
    fn failed_ping_is_unreachable() {
        let runner = RecordingRunner {
            exit_code: 1,
            stdout: LINUX_ROUTES.to_string(),
            ..Default::default()
        };
        let result = check_network("10.0.0.5", "239.192.1.2", &FixedPlatform("linux"), &runner);
        assert!(!result.reachable);
        assert!(result.route_exists);
        assert_eq!(result.summary()[0], ("Communication with Target", "FAILED"));
        let commands = runner.commands.lock().unwrap();
        assert_eq!(commands[0], vec!["ping", "-c", "1", "10.0.0.5"]);
        assert_eq!(commands[1], vec!["ip", "route", "show", "table", "all"]);
    }

    proptest! {
        #[test]
        fn networks_contain_their_own_addresses(raw in any::<u32>(), prefix in 0u8..=32) {
            let address = Ipv4Addr::from(raw);
            let net = masked(address, prefix).unwrap();
            prop_assert!(net.contains(address));
            prop_assert_eq!(net.to_string().parse::<Ipv4Network>().unwrap(), net);
            if prefix >= 4 && address.is_multicast() {
                prop_assert!(net.is_subnet_of(multicast_range().unwrap()));
            }
        }
    }
}
