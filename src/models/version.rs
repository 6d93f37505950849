//! Server version parsing and port derivation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SandboxError};

/// Version of a server distribution, e.g. `5.5.10`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerVersion(String);

impl ServerVersion {
    /// Parse the version out of a distribution archive's file name.
    ///
    /// The version is the token between the first two `-` separated
    /// segments, so `mysql-5.5.10-linux2.6-x86_64.tar.gz` yields `5.5.10`.
    pub fn from_archive(path: &Path) -> Result<Self> {
        let invalid = || SandboxError::InvalidArchiveName {
            path: path.to_path_buf(),
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(invalid)?;

        let token = name.split('-').nth(1).ok_or_else(invalid)?;
        if token.is_empty() {
            return Err(invalid());
        }

        Ok(Self(token.to_string()))
    }

    /// Version string as it appeared in the archive name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Default port (and server-id), the version with separators stripped.
    ///
    /// Two sandboxes of the same version always collide on this value.
    pub fn derived_port(&self) -> Result<u16> {
        let digits: String = self.0.chars().filter(|c| c.is_ascii_digit()).collect();

        match digits.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(SandboxError::PortDerivation {
                version: self.0.clone(),
            }),
        }
    }
}

impl FromStr for ServerVersion {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(SandboxError::Other("Empty server version".into()));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
