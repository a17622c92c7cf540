//! Correspondent addresses and the anonymized IDs that stand in for them.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// `user[:device]@server`
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^@:\s]+)(?::(\d+))?@([^@\s]+)$").unwrap());

/// Real external identifier of a sender or recipient, as supplied by the
/// channel client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrespondentAddress {
    pub user: String,
    pub device: u16,
    pub server: String,
}

impl CorrespondentAddress {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    pub fn with_device(mut self, device: u16) -> Self {
        self.device = device;
        self
    }

    /// The same correspondent with the device part dropped.
    ///
    /// Identity keys always use this form so one person on several devices
    /// keeps a single anonymized ID.
    pub fn to_non_device(&self) -> Self {
        Self {
            user: self.user.clone(),
            device: 0,
            server: self.server.clone(),
        }
    }
}

impl fmt::Display for CorrespondentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device == 0 {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        }
    }
}

impl FromStr for CorrespondentAddress {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ADDRESS_RE
            .captures(s)
            .ok_or_else(|| IdentityError::InvalidAddress(s.to_string()))?;

        let device = match caps.get(2) {
            Some(d) => d
                .as_str()
                .parse()
                .map_err(|_| IdentityError::InvalidAddress(s.to_string()))?,
            None => 0,
        };

        Ok(Self {
            user: caps[1].to_string(),
            device,
            server: caps[3].to_string(),
        })
    }
}

/// Opaque token standing in for a correspondent address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnonymizedId(String);

impl AnonymizedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnonymizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnonymizedId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
