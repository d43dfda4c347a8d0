//! WhatsApp JID (Jabber ID) types.
//!
//! JIDs identify users, groups, and broadcast lists. The host runtime only
//! needs the plain `user@server` form plus an optional device suffix; the
//! protocol engine owns everything beyond that.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Known JID servers on WhatsApp
pub mod servers {
    pub const DEFAULT_USER: &str = "s.whatsapp.net";
    pub const GROUP: &str = "g.us";
    pub const BROADCAST: &str = "broadcast";
    pub const NEWSLETTER: &str = "newsletter";
}

/// MessageID is the internal ID of a WhatsApp message.
pub type MessageID = String;

/// JID represents a WhatsApp user, group, or broadcast identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct JID {
    pub user: String,
    pub device: u16,
    pub server: String,
}

impl JID {
    /// Creates a new regular JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    /// Creates a JID on the default user server.
    pub fn user(user: impl Into<String>) -> Self {
        Self::new(user, servers::DEFAULT_USER)
    }

    /// Returns a version of the JID without the device suffix.
    pub fn to_non_device(&self) -> Self {
        Self {
            user: self.user.clone(),
            device: 0,
            server: self.server.clone(),
        }
    }

    /// Returns true if this JID names a group chat.
    pub fn is_group(&self) -> bool {
        self.server == servers::GROUP
    }

    /// Returns true if this is a broadcast list (not status broadcast).
    pub fn is_broadcast_list(&self) -> bool {
        self.server == servers::BROADCAST && self.user != "status"
    }

    /// Returns true if the JID is empty (no server).
    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl fmt::Display for JID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}", self.server)
        }
    }
}

/// Error type for JID parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseJIDError(pub String);

impl fmt::Display for ParseJIDError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse JID: {}", self.0)
    }
}

impl std::error::Error for ParseJIDError {}

impl FromStr for JID {
    type Err = ParseJIDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_str, server) = match s.split_once('@') {
            Some((user, server)) => (user, server),
            // Server-only JIDs are valid (e.g. the bare group server).
            None => return Ok(JID::new("", s)),
        };

        let mut jid = JID::new(user_str, server);

        if let Some((user, device)) = user_str.split_once(':') {
            if device.contains(':') {
                return Err(ParseJIDError(
                    "unexpected number of colons in JID".to_string(),
                ));
            }
            jid.user = user.to_string();
            jid.device = device
                .parse()
                .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?;
        }

        Ok(jid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_jid() {
        let jid: JID = "1234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.server, servers::DEFAULT_USER);
        assert_eq!(jid.device, 0);
    }

    #[test]
    fn test_parse_device_jid() {
        let jid: JID = "1234567890:2@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 2);
        assert_eq!(jid.to_non_device(), JID::user("1234567890"));
    }

    #[test]
    fn test_jid_to_string() {
        let jid = JID::user("1234567890");
        assert_eq!(jid.to_string(), "1234567890@s.whatsapp.net");

        let jid = JID {
            user: "1234567890".to_string(),
            device: 2,
            server: servers::DEFAULT_USER.to_string(),
        };
        assert_eq!(jid.to_string(), "1234567890:2@s.whatsapp.net");
    }

    #[test]
    fn test_group_jid() {
        let jid: JID = "123456789-1234567890@g.us".parse().unwrap();
        assert_eq!(jid.user, "123456789-1234567890");
        assert!(jid.is_group());
    }

    #[test]
    fn test_bad_device_suffix() {
        assert!("12345:x@s.whatsapp.net".parse::<JID>().is_err());
        assert!("12345:1:2@s.whatsapp.net".parse::<JID>().is_err());
    }
}
