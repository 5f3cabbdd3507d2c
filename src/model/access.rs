//! Access rules: permission edges between two nodes.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Network protocol covered by a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Every protocol.
    #[default]
    All,
    /// TCP only.
    Tcp,
    /// UDP only.
    Udp,
}

/// Protocol and port range granted by an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Protocol.
    pub protocol: Protocol,
    /// First port of the range; `None` means every port.
    #[serde(default)]
    pub from_port: Option<u16>,
    /// Last port of the range (inclusive).
    #[serde(default)]
    pub to_port: Option<u16>,
}

impl Permission {
    /// Allows all traffic on every port.
    #[must_use]
    pub const fn all_traffic() -> Self {
        Self {
            protocol: Protocol::All,
            from_port: None,
            to_port: None,
        }
    }

    /// Allows TCP on a single port.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self::tcp_range(port, port)
    }

    /// Allows TCP on an inclusive port range.
    #[must_use]
    pub const fn tcp_range(from: u16, to: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: Some(from),
            to_port: Some(to),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protocol = match self.protocol {
            Protocol::All => return write!(f, "all traffic"),
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) if from == to => write!(f, "{protocol}:{from}"),
            (Some(from), Some(to)) => write!(f, "{protocol}:{from}-{to}"),
            (Some(from), None) => write!(f, "{protocol}:{from}"),
            _ => write!(f, "{protocol}:*"),
        }
    }
}

/// Permission for `source` to reach `target`.
///
/// Produces no output value. It is applied only after both endpoints exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRule {
    /// Node whose network boundary is opened.
    pub target: NodeId,
    /// Node allowed in.
    pub source: NodeId,
    /// What is allowed.
    pub permission: Permission,
}

impl std::fmt::Display for AccessRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <- {} ({})", self.target, self.source, self.permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_display() {
        assert_eq!(Permission::all_traffic().to_string(), "all traffic");
        assert_eq!(Permission::tcp(5432).to_string(), "tcp:5432");
        assert_eq!(Permission::tcp_range(8000, 8100).to_string(), "tcp:8000-8100");
    }
}
