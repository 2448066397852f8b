// Copyright (c) 2025 - Cowboy AI, Inc.
//! Guest Hostname Value Object with DNS Validation Invariants
//!
//! Hostnames arrive from reverse lookups of the guest's address. The lookup
//! answers with whatever the DNS server knows, usually a fully qualified
//! name; the remote channel only needs the machine's short name.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hostname validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostnameError {
    #[error("Hostname is empty")]
    Empty,

    #[error("Hostname exceeds maximum length of 253 characters: {0}")]
    TooLong(usize),

    #[error("Label exceeds maximum length of 63 characters: {0}")]
    LabelTooLong(String),

    #[error("Invalid character in hostname: {0}")]
    InvalidCharacter(char),

    #[error("Label cannot start or end with hyphen: {0}")]
    InvalidLabelFormat(String),

    #[error("Label cannot be all numeric: {0}")]
    NumericLabel(String),
}

/// Hostname of a guest machine
///
/// Invariants (RFC 1123):
/// - Total length ≤ 253 characters
/// - Each label ≤ 63 characters, alphanumeric and hyphens only
/// - Labels cannot start or end with hyphens
/// - The last label cannot be all numeric, so a dotted IPv4 address is
///   never mistaken for a name
///
/// # Examples
///
/// ```rust
/// use cim_image_builder::domain::Hostname;
///
/// let host = Hostname::new("build-01.lab.example.com").unwrap();
/// assert_eq!(host.short_name(), "build-01");
///
/// assert!(Hostname::new("10.0.0.12").is_err());
/// assert!(Hostname::new("-invalid").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Maximum total length for FQDN (RFC 1123)
    pub const MAX_LENGTH: usize = 253;

    /// Maximum length for a single label (RFC 1123)
    pub const MAX_LABEL_LENGTH: usize = 63;

    /// Validate a dotted name
    pub fn new(hostname: impl Into<String>) -> Result<Self, HostnameError> {
        let hostname = hostname.into();
        match hostname.len() {
            0 => return Err(HostnameError::Empty),
            len if len > Self::MAX_LENGTH => return Err(HostnameError::TooLong(len)),
            _ => {}
        }

        hostname.split('.').try_for_each(Self::check_label)?;

        let last = hostname.rsplit('.').next().unwrap_or_default();
        if last.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HostnameError::NumericLabel(last.to_string()));
        }

        Ok(Self(hostname))
    }

    /// Parse the raw output of a reverse lookup into the guest's short name
    ///
    /// Blank output means the lookup found nothing, which is not an error:
    /// plenty of lab networks have no reverse zone.
    pub fn from_lookup(raw: &str) -> Result<Option<Self>, HostnameError> {
        let trimmed = raw.trim().trim_end_matches('.');
        if trimmed.is_empty() {
            return Ok(None);
        }
        let full = Self::new(trimmed)?;
        Ok(Some(Self(full.short_name().to_string())))
    }

    fn check_label(label: &str) -> Result<(), HostnameError> {
        if label.is_empty() {
            return Err(HostnameError::Empty);
        }
        if label.len() > Self::MAX_LABEL_LENGTH {
            return Err(HostnameError::LabelTooLong(label.to_string()));
        }
        if let Some(bad) = label.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(HostnameError::InvalidCharacter(bad));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(HostnameError::InvalidLabelFormat(label.to_string()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First label, the machine name without its domain
    pub fn short_name(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
