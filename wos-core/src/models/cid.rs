//! Content identifier

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wos_common::{Error, Result};

const MAX_CID_LEN: usize = 128;

/// Content identifier of an object tree
///
/// Restricted to `[A-Za-z0-9_-]` so a CID is always safe to use as a single
/// path segment in the content store and blob mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    pub fn parse(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(Error::Validation("cid must not be empty".to_string()));
        }
        if value.len() > MAX_CID_LEN {
            return Err(Error::Validation(format!(
                "cid longer than {} characters",
                MAX_CID_LEN
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Validation(format!("cid contains illegal characters: {}", value)));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
