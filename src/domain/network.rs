// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}

/// Value the host reports while a guest adapter has no address yet
pub const UNASSIGNED_SENTINEL: &str = "False";

/// Parse a guest adapter's reported address
///
/// The host answers with an empty string, the [`UNASSIGNED_SENTINEL`], or
/// the unspecified address until DHCP (or the guest's static setup) has run.
/// All three mean "not yet"; anything else must parse as an IP address.
///
/// ```rust
/// use cim_image_builder::domain::parse_guest_address;
///
/// assert!(parse_guest_address("False").is_none());
/// assert!(parse_guest_address(" 172.20.16.5\r\n").is_some());
/// ```
pub fn parse_guest_address(raw: &str) -> Option<IpAddr> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNASSIGNED_SENTINEL) {
        return None;
    }
    IpAddr::from_str(trimmed)
        .ok()
        .filter(|address| !address.is_unspecified())
}

/// VLAN ID value object
///
/// IEEE 802.1Q VLAN identifier (1-4094). 0 and 4095 are reserved.
///
/// ```rust
/// use cim_image_builder::domain::VlanId;
///
/// let vlan = VlanId::new(1724).unwrap();
/// assert_eq!(vlan.value(), 1724);
/// assert!(VlanId::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID
    pub const MAX: u16 = 4094;

    /// Create a new VLAN ID with validation
    pub fn new(id: u16) -> Result<Self, NetworkError> {
        if !(Self::MIN..=Self::MAX).contains(&id) {
            return Err(NetworkError::InvalidVlanId(id));
        }
        Ok(Self(id))
    }

    /// Get the VLAN ID value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = NetworkError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> Self {
        vlan.0
    }
}
