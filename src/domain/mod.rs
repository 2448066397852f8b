// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build Domain Value Objects
//!
//! Values that cross step boundaries and come from the outside world
//! (host queries, reverse lookups, configuration) are validated once, here,
//! so steps can trust what they read from the run context.
//!
//! - [`Hostname`] - DNS-validated guest hostnames (RFC 1123)
//! - [`VlanId`] - IEEE 802.1Q VLAN ID (1-4094)
//! - [`parse_guest_address`] - adapter address reports, sentinel aware

pub mod hostname;
pub mod network;

pub use hostname::{Hostname, HostnameError};
pub use network::{parse_guest_address, NetworkError, VlanId, UNASSIGNED_SENTINEL};
