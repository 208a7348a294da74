//! Reachability probe: native ICMP echo with a `ping` command fallback.
//!
//! Native probes run on a blocking thread so the round trip is timed without
//! scheduler noise.

use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::{ProbeError, Reachability};

/// Extra time allowed on top of the probe timeout before giving up on it.
/// The command fallback can only wait in whole seconds.
const PING_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    Native,
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Identifier/sequence pair distinguishing concurrent pings to one host.
fn next_ping_id() -> (u16, u16) {
    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (identifier, sequence)
}

fn detect_icmp_capability() -> IcmpCapability {
    // RAW needs CAP_NET_RAW; DGRAM works unprivileged where ping_group_range allows it.
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (RAW socket, privileged)");
        return IcmpCapability::Native;
    }
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (DGRAM socket, unprivileged)");
        return IcmpCapability::Native;
    }
    tracing::info!("Ping probe: native ICMP unavailable, using command fallback");
    IcmpCapability::CommandOnly
}

/// Probe an address for liveness.
///
/// Never blocks longer than `timeout` plus a small slack; a probe that
/// overruns is reported as `TimedOut`.
pub async fn probe_reachability(address: IpAddr, timeout: Duration) -> Reachability {
    match tokio::time::timeout(timeout + PING_SLACK, ping(address, timeout)).await {
        Ok(Ok(response_time_ms)) => Reachability::Reachable { response_time_ms },
        Ok(Err(ProbeError::Timeout(_))) | Err(_) => Reachability::TimedOut,
        Ok(Err(e)) => {
            tracing::debug!("Ping probe: {} unreachable: {}", address, e);
            Reachability::Unreachable
        }
    }
}

/// Ping once and return the round trip in milliseconds.
pub async fn ping(address: IpAddr, timeout: Duration) -> Result<f64, ProbeError> {
    let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);
    if capability == IcmpCapability::CommandOnly {
        return run_ping_command(address, timeout).await;
    }

    let result = tokio::task::spawn_blocking(move || run_blocking_ping(address, timeout))
        .await
        .map_err(|e| ProbeError::Network(format!("spawn_blocking failed: {}", e)))?;

    match result {
        Err(ProbeError::Network(msg)) if is_permission_error(&msg) => {
            tracing::warn!(
                "Native ping failed with permission error for {}, falling back to command: {}",
                address,
                msg
            );
            run_ping_command(address, timeout).await
        }
        other => other,
    }
}

fn is_permission_error(msg: &str) -> bool {
    msg.contains("Permission") || msg.contains("Operation not permitted") || msg.contains("denied")
}

fn io_error(context: &str, e: std::io::Error) -> ProbeError {
    ProbeError::Network(format!("{}: {}", context, e))
}

fn run_blocking_ping(ip: IpAddr, timeout: Duration) -> Result<f64, ProbeError> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    // DGRAM ping sockets rewrite the echo identifier to their local port and
    // only deliver replies addressed to it, so only RAW replies are matched on it.
    let (socket, raw) = match Socket::new(domain, Type::RAW, Some(protocol)) {
        Ok(socket) => (socket, true),
        Err(_) => Socket::new(domain, Type::DGRAM, Some(protocol))
            .map(|socket| (socket, false))
            .map_err(|e| io_error("Failed to create ICMP socket", e))?,
    };
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| io_error("Failed to set timeout", e))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| io_error("Failed to set timeout", e))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| io_error("Failed to connect", e))?;

    let (identifier, sequence) = next_ping_id();
    let packet = match ip {
        IpAddr::V4(_) => build_icmp_echo_request(identifier, sequence),
        IpAddr::V6(_) => build_icmpv6_echo_request(identifier, sequence),
    };

    let start = Instant::now();
    socket.send(&packet).map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            io_error("Permission denied", e)
        } else {
            io_error("Failed to send", e)
        }
    })?;

    let expected_identifier = raw.then_some(identifier);
    let mut buf = [0u8; 1500];
    loop {
        let len = (&socket).read(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => ProbeError::Timeout(timeout),
            _ => io_error("Failed to receive", e),
        })?;
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }
        if is_matching_reply(ip, &buf[..len], expected_identifier, sequence) {
            return Ok(elapsed.as_secs_f64() * 1000.0);
        }
        // Someone else's packet, keep waiting.
    }
}

/// Whether `buf` is the echo reply for our sequence and, when given, identifier.
fn is_matching_reply(ip: IpAddr, buf: &[u8], identifier: Option<u16>, sequence: u16) -> bool {
    let (offset, reply_type) = match ip {
        // RAW v4 sockets include the IP header, DGRAM ones do not.
        IpAddr::V4(_) => (if buf.first().map(|b| b >> 4) == Some(4) { 20 } else { 0 }, 0u8),
        IpAddr::V6(_) => (0, 129u8),
    };
    if buf.len() < offset + 8 {
        return false;
    }
    let icmp = &buf[offset..];
    icmp[0] == reply_type
        && identifier.map_or(true, |id| u16::from_be_bytes([icmp[4], icmp[5]]) == id)
        && u16::from_be_bytes([icmp[6], icmp[7]]) == sequence
}

fn echo_payload(packet: &mut [u8]) {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());
}

/// ICMP Echo Request (type 8, code 0).
fn build_icmp_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = 8;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    echo_payload(&mut packet);

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

/// ICMPv6 Echo Request (type 128, code 0). The kernel fills in the checksum.
fn build_icmpv6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = 128;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    echo_payload(&mut packet);
    packet
}

/// RFC 1071 checksum.
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => (*hi as u32) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !sum as u16
}

async fn run_ping_command(address: IpAddr, timeout: Duration) -> Result<f64, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);
    let address = address.to_string();

    let output = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_secs.to_string(), &address])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timeout")
            || stdout.contains("100% packet loss")
            || stdout.contains("100.0% packet loss")
        {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}", stdout.trim())));
    }

    parse_ping_output(&stdout)
}

/// Pull the round trip (ms) out of `ping` output.
fn parse_ping_output(output: &str) -> Result<f64, ProbeError> {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            // Per-packet "time=12.3 ms" (Linux, macOS)
            Regex::new(r"time[=<](?P<ms>[0-9.]+)\s*ms").expect("valid regex"),
            // Summary "rtt min/avg/max/mdev = a/b/c/d" or "round-trip min/avg/max/stddev = ..."
            Regex::new(r"(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*[0-9.]+/(?P<ms>[0-9.]+)/")
                .expect("valid regex"),
        ]
    });

    patterns
        .iter()
        .filter_map(|re| re.captures(output))
        .filter_map(|caps| caps.name("ms")?.as_str().parse::<f64>().ok())
        .next()
        .ok_or_else(|| ProbeError::Command(format!("failed to parse ping output: {}", output)))
}
