// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! - `unwind`: every entered step is compensated exactly once, in reverse
//! - `reboots`: reboot counting over arbitrary uptime sequences

mod reboots;
mod unwind;
