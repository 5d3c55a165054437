use regex::Regex;
use std::{fmt::Display, path::PathBuf, sync::LazyLock};
use strum_macros::Display;

static ENDPOINT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(listen|tcp|unix)://(.+)$").unwrap());

/// Transport address of a channel, parsed from its configuration string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Accept one peer at a time on a local TCP address (the built-in operator console).
    Listen(String),
    /// Connect to a TCP peer.
    Tcp(String),
    /// Connect to a local socket path.
    Unix(PathBuf),
}

#[derive(Debug, Display)]
pub enum EndpointError {
    UnknownScheme(String),
}

impl std::error::Error for EndpointError {}

impl TryFrom<&str> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let captures = ENDPOINT_REGEX
            .captures(value.trim())
            .ok_or_else(|| EndpointError::UnknownScheme(value.to_string()))?;
        let address = captures[2].to_string();
        match captures[1].to_lowercase().as_str() {
            "listen" => Ok(Endpoint::Listen(address)),
            "tcp" => Ok(Endpoint::Tcp(address)),
            "unix" => Ok(Endpoint::Unix(PathBuf::from(address))),
            _ => Err(EndpointError::UnknownScheme(value.to_string())),
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Listen(addr) => write!(f, "listen://{addr}"),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}
