//! Instrument resource strings.
//!
//! A [`Resource`] names where an instrument lives. Parsing accepts the VISA
//! forms that map onto a transport this crate provides plus two shorthand
//! forms:
//!
//! | Input                              | Result                                  |
//! |------------------------------------|-----------------------------------------|
//! | `TCPIP::10.0.0.5::5025::SOCKET`    | `Socket { host: "10.0.0.5", port: 5025 }` |
//! | `TCPIP0::10.0.0.5::9760`           | `Socket { host: "10.0.0.5", port: 9760 }` |
//! | `10.0.0.5:9760`                    | `Socket { host: "10.0.0.5", port: 9760 }` |
//! | `scope.lab`                        | `Socket { host: "scope.lab", port: 5025 }` |
//! | `ASRL/dev/ttyUSB0::INSTR`          | `Serial { path: "/dev/ttyUSB0", baud: None }` |
//! | `serial:/dev/ttyACM0@115200`       | `Serial { path: "/dev/ttyACM0", baud: Some(115200) }` |
//!
//! Other VISA resources (`GPIB0::18::INSTR`, `USB0::...`, `TCPIP::host::INSTR`)
//! need a VISA library and are rejected with [`Error::Unsupported`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use metrlib_core::error::{Error, Result};
use metrlib_core::transport::Transport;

use crate::serial::SerialTransport;
use crate::tcp::{SCPI_RAW_PORT, TcpTransport};

/// A parsed instrument address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Raw SCPI over TCP.
    Socket { host: String, port: u16 },
    /// Serial or USB virtual COM port. `baud` is `None` when the resource
    /// string did not specify one.
    Serial { path: String, baud: Option<u32> },
}

impl Resource {
    /// Parse a resource string. See the module docs for accepted forms.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidParameter("empty resource string".into()));
        }

        if let Some(rest) = s.strip_prefix("serial:") {
            return parse_serial_shorthand(rest);
        }

        if s.contains("::") {
            return parse_visa(s);
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => Ok(Resource::Socket {
                host: host.to_string(),
                port: parse_port(port)?,
            }),
            Some(_) => Err(Error::InvalidParameter(format!(
                "missing host in resource '{s}'"
            ))),
            None => Ok(Resource::Socket {
                host: s.to_string(),
                port: SCPI_RAW_PORT,
            }),
        }
    }

    /// Replace the port of a socket resource parsed from a bare host name.
    ///
    /// The registry knows per-model ports (9760 for HS9000 units); a bare
    /// host resolves to 5025 until the caller applies the model's port.
    pub fn with_default_port(self, port: u16, explicit: bool) -> Self {
        match self {
            Resource::Socket { host, .. } if !explicit => Resource::Socket { host, port },
            other => other,
        }
    }

    /// Open a transport for this resource.
    ///
    /// `default_baud` applies when a serial resource carries no baud rate.
    pub async fn open(
        &self,
        connect_timeout: Duration,
        default_baud: u32,
    ) -> Result<Box<dyn Transport>> {
        match self {
            Resource::Socket { host, port } => {
                let addr = format!("{host}:{port}");
                let transport = TcpTransport::connect_with_timeout(&addr, connect_timeout).await?;
                Ok(Box::new(transport))
            }
            Resource::Serial { path, baud } => {
                let transport = SerialTransport::open(path, baud.unwrap_or(default_baud)).await?;
                Ok(Box::new(transport))
            }
        }
    }
}

/// True when `s` names a socket resource without an explicit port.
pub fn is_bare_host(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && !s.contains(':')
}

impl FromStr for Resource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Resource::parse(s)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Socket { host, port } => write!(f, "TCPIP::{host}::{port}::SOCKET"),
            Resource::Serial { path, baud: Some(baud) } => write!(f, "serial:{path}@{baud}"),
            Resource::Serial { path, baud: None } => write!(f, "serial:{path}"),
        }
    }
}

fn parse_port(s: &str) -> Result<u16> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| Error::InvalidParameter(format!("invalid port '{s}'")))
}

fn parse_serial_shorthand(rest: &str) -> Result<Resource> {
    let (path, baud) = match rest.rsplit_once('@') {
        Some((path, baud)) => {
            let baud = baud
                .trim()
                .parse::<u32>()
                .map_err(|_| Error::InvalidParameter(format!("invalid baud rate '{baud}'")))?;
            (path, Some(baud))
        }
        None => (rest, None),
    };
    if path.is_empty() {
        return Err(Error::InvalidParameter("missing serial port path".into()));
    }
    Ok(Resource::Serial {
        path: path.to_string(),
        baud,
    })
}

fn parse_visa(s: &str) -> Result<Resource> {
    let parts: Vec<&str> = s.split("::").collect();
    let interface = parts[0].to_ascii_uppercase();

    if interface.starts_with("TCPIP") {
        let suffix_ok = interface[5..].chars().all(|c| c.is_ascii_digit());
        let is_instr = parts
            .last()
            .is_some_and(|p| p.eq_ignore_ascii_case("INSTR"));
        return match parts.as_slice() {
            [_, host, port] | [_, host, port, _]
                if suffix_ok && !is_instr && !host.is_empty() =>
            {
                if parts.len() == 4 && !parts[3].eq_ignore_ascii_case("SOCKET") {
                    return Err(unsupported(s));
                }
                Ok(Resource::Socket {
                    host: host.to_string(),
                    port: parse_port(port)?,
                })
            }
            _ => Err(unsupported(s)),
        };
    }

    if let Some(board) = interface.strip_prefix("ASRL") {
        if parts.len() != 2 || !parts[1].eq_ignore_ascii_case("INSTR") || board.is_empty() {
            return Err(unsupported(s));
        }
        // Keep the path's original case; only the prefix is case-folded.
        let raw = &parts[0][4..];
        let path = match raw.parse::<u32>() {
            Ok(n) if cfg!(windows) => format!("COM{n}"),
            Ok(n) => format!("/dev/ttyS{}", n.saturating_sub(1)),
            Err(_) => raw.to_string(),
        };
        return Ok(Resource::Serial { path, baud: None });
    }

    Err(unsupported(s))
}

fn unsupported(s: &str) -> Error {
    Error::Unsupported(format!("resource '{s}' requires a VISA library"))
}
