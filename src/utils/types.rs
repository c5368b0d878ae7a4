use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::crypto::hash_id;

/// Position on the identifier ring, always reduced mod 2^bits.
pub type HashPos = u64;

/// Network identity of a peer. Two peers are the same peer iff their
/// addresses are equal. On the wire an address travels as a 2-element
/// `[host, port]` array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Address {
            host: host.into(),
            port,
        }
    }

    /// Ring position of this peer, derived from `"host:port"`.
    pub fn hash_pos(&self, bits: u8) -> HashPos {
        hash_id(self.to_string().as_bytes(), bits)
    }
}

impl From<(String, u16)> for Address {
    fn from((host, port): (String, u16)) -> Self {
        Address { host, port }
    }
}

impl From<Address> for (String, u16) {
    fn from(addr: Address) -> Self {
        (addr.host, addr.port)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid address `{0}`, expected host:port")]
pub struct AddressParseError(String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError(s.to_owned()))?;
        if host.is_empty() {
            return Err(AddressParseError(s.to_owned()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressParseError(s.to_owned()))?;
        Ok(Address::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_a_two_element_array() {
        let addr = Address::new("127.0.0.1", 8001);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, r#"["127.0.0.1",8001]"#);

        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn parses_host_port() {
        let addr: Address = "127.0.0.1:8001".parse().unwrap();
        assert_eq!(addr, Address::new("127.0.0.1", 8001));
        assert!("localhost".parse::<Address>().is_err());
        assert!(":8001".parse::<Address>().is_err());
        assert!("127.0.0.1:notaport".parse::<Address>().is_err());
    }
}
