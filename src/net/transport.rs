//! Transport specifications.
//!
//! A [`TransportSpec`] describes one endpoint the hosted server listens on:
//! either a TCP `host:port` or a Unix domain socket path together with the
//! permission bits forced onto the socket file after bind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNIX_SCHEME: &str = "unix://";

/// Permission bits applied to a Unix socket file, e.g. `0600`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SocketMode(u32);

impl SocketMode {
    /// Owner read/write only.
    pub const OWNER_ONLY: SocketMode = SocketMode(0o600);

    pub fn new(bits: u32) -> Result<Self, ParseModeError> {
        if bits > 0o7777 {
            return Err(ParseModeError::OutOfRange(bits));
        }
        Ok(Self(bits))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for SocketMode {
    fn default() -> Self {
        Self::OWNER_ONLY
    }
}

impl fmt::Display for SocketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseModeError {
    #[error("permission mode must not be empty")]
    Empty,
    #[error("permission mode {0:?} is not an octal number")]
    NotOctal(String),
    #[error("permission mode {0:o} exceeds 7777")]
    OutOfRange(u32),
}

impl FromStr for SocketMode {
    type Err = ParseModeError;

    /// Accepts `0600`, `600` and `0o600`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(ParseModeError::Empty);
        }
        let bits = u32::from_str_radix(digits, 8)
            .map_err(|_| ParseModeError::NotOctal(trimmed.to_string()))?;
        Self::new(bits)
    }
}

impl TryFrom<String> for SocketMode {
    type Error = ParseModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SocketMode> for String {
    fn from(mode: SocketMode) -> Self {
        mode.to_string()
    }
}

/// Which kind of endpoint a transport is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Unix,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Unix => "unix",
        }
    }
}

/// One configured endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportSpec {
    /// Insecure TCP listener on `host:port`.
    Tcp { host: String, port: u16 },
    /// Unix domain socket at `path`, chmodded to `mode` after bind.
    Unix { path: PathBuf, mode: SocketMode },
}

impl TransportSpec {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        TransportSpec::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Build a Unix transport. A leading `unix://` (any case) is stripped.
    pub fn unix(path: impl AsRef<str>, mode: SocketMode) -> Self {
        TransportSpec::Unix {
            path: socket_path_from_uri(path.as_ref()),
            mode,
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportSpec::Tcp { .. } => TransportKind::Tcp,
            TransportSpec::Unix { .. } => TransportKind::Unix,
        }
    }

    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            TransportSpec::Unix { path, .. } => Some(path),
            TransportSpec::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for TransportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSpec::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{}]:{}", host, port)
            }
            TransportSpec::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            TransportSpec::Unix { path, .. } => write!(f, "{}{}", UNIX_SCHEME, path.display()),
        }
    }
}

/// Strip an optional `unix://` scheme from a configured socket location.
pub fn socket_path_from_uri(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let has_scheme = trimmed
        .get(..UNIX_SCHEME.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(UNIX_SCHEME));
    if has_scheme {
        PathBuf::from(&trimmed[UNIX_SCHEME.len()..])
    } else {
        PathBuf::from(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_octal_modes() {
        assert_eq!("0600".parse::<SocketMode>().unwrap().bits(), 0o600);
        assert_eq!("660".parse::<SocketMode>().unwrap().bits(), 0o660);
        assert_eq!("0o755".parse::<SocketMode>().unwrap().bits(), 0o755);
        assert_eq!(" 0777 ".parse::<SocketMode>().unwrap().bits(), 0o777);
    }

    #[test]
    fn rejects_bad_modes() {
        assert_eq!("".parse::<SocketMode>(), Err(ParseModeError::Empty));
        assert!(matches!("0800".parse::<SocketMode>(), Err(ParseModeError::NotOctal(_))));
        assert!(matches!("rw-------".parse::<SocketMode>(), Err(ParseModeError::NotOctal(_))));
        assert_eq!("17777".parse::<SocketMode>(), Err(ParseModeError::OutOfRange(0o17777)));
    }

    #[test]
    fn mode_displays_as_four_octal_digits() {
        assert_eq!(SocketMode::default().to_string(), "0600");
        assert_eq!(SocketMode::new(0o2750).unwrap().to_string(), "2750");
    }

    #[test]
    fn unix_scheme_is_stripped_case_insensitively() {
        assert_eq!(socket_path_from_uri("unix:///run/grs.sock"), PathBuf::from("/run/grs.sock"));
        assert_eq!(socket_path_from_uri("UNIX:///run/grs.sock"), PathBuf::from("/run/grs.sock"));
        assert_eq!(socket_path_from_uri("/run/grs.sock"), PathBuf::from("/run/grs.sock"));
        assert_eq!(socket_path_from_uri("unix://"), PathBuf::from(""));
    }

    #[test]
    fn transport_display() {
        assert_eq!(TransportSpec::tcp("127.0.0.1", 50051).to_string(), "tcp://127.0.0.1:50051");
        assert_eq!(TransportSpec::tcp("::1", 50051).to_string(), "tcp://[::1]:50051");
        let unix = TransportSpec::unix("unix:///tmp/grs.sock", SocketMode::default());
        assert_eq!(unix.to_string(), "unix:///tmp/grs.sock");
        assert_eq!(unix.kind(), TransportKind::Unix);
        assert_eq!(unix.unix_path(), Some(Path::new("/tmp/grs.sock")));
    }
}
