//! Forwarded port set.
//!
//! Mappings are recomputed every run from the target address and a static
//! list of (port, protocol) pairs; nothing here is persisted.

use std::fmt;

/// Transport of a forwarded port. TCP is the tunnel's default and is
/// written without a suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// A port forwarded to the same port number on the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortSpec {
    pub const fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    pub const fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }
}

/// Moonlight/Sunshine streaming ports: HTTPS pairing, HTTP, web UI, RTSP,
/// video, control, audio and the 48010 RTSP/UDP pair.
pub const STREAMING_PORTS: &[PortSpec] = &[
    PortSpec::tcp(47984),
    PortSpec::tcp(47989),
    PortSpec::tcp(47990),
    PortSpec::tcp(47998),
    PortSpec::udp(47998),
    PortSpec::udp(47999),
    PortSpec::udp(48000),
    PortSpec::tcp(48010),
    PortSpec::udp(48010),
];

/// One `local:remote_host:remote[/proto]` forward handed to the tunnel binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.local_port, self.remote_host, self.remote_port
        )?;
        match self.protocol {
            Protocol::Tcp => Ok(()),
            Protocol::Udp => write!(f, "/udp"),
        }
    }
}

/// Build the mapping set for `target`, one entry per port, in list order.
pub fn build_mappings(target: &str, specs: &[PortSpec]) -> Vec<PortMapping> {
    specs
        .iter()
        .map(|spec| PortMapping {
            local_port: spec.port,
            remote_host: target.to_string(),
            remote_port: spec.port,
            protocol: spec.protocol,
        })
        .collect()
}
