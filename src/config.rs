// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build Configuration
//!
//! A build is described by a JSON document deserialized into
//! [`BuildConfig`]. Every option has a default except the install media,
//! the output directory and the guest credential.
//!
//! # Loading
//!
//! ```text
//! config.json ──► BuildConfig::from_file ──► apply_env (CIM_IMAGE_*) ──► validate()
//!                                                                           │
//!                                   ConfigErrors (all violations) ◄── err ──┤
//!                                   ValidatedConfig + warnings   ◄── ok  ───┘
//! ```
//!
//! Validation runs before any step and reports every violated option at
//! once. Sizes are given in megabytes and converted to bytes here, names
//! left empty are generated, and the wait bounds become [`PollPolicy`]s.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::VlanId;
use crate::errors::{BuildError, BuildResult, ConfigError, ConfigErrors};
use crate::poll::PollPolicy;
use crate::ports::{Credential, SwitchKind};

pub const MIN_DISK_SIZE_MB: u64 = 10 * 1024;
pub const MAX_DISK_SIZE_MB: u64 = 65536 * 1024;
pub const DEFAULT_DISK_SIZE_MB: u64 = 127 * 1024;

pub const MIN_MEMORY_SIZE_MB: u64 = 512;
pub const MAX_MEMORY_SIZE_MB: u64 = 32768;
pub const DEFAULT_MEMORY_SIZE_MB: u64 = 1024;

/// Longest install wait accepted, one day
pub const MAX_INSTALL_TIMEOUT_MINS: u64 = 24 * 60;
/// Install waits longer than this are accepted with a warning
pub const LONG_INSTALL_TIMEOUT_MINS: u64 = 4 * 60;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Raw build configuration as written by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_disk_size_mb")]
    pub disk_size_mb: u64,

    #[serde(default = "default_memory_size_mb")]
    pub memory_size_mb: u64,

    /// Generated as `pvm_<uuid>` when empty
    #[serde(default)]
    pub vm_name: String,

    /// Generated as `pis_<uuid>` when empty
    #[serde(default)]
    pub switch_name: String,

    #[serde(default)]
    pub switch_kind: SwitchKind,

    /// Installation ISO
    #[serde(default)]
    pub iso_path: PathBuf,

    /// Prebuilt floppy image carrying unattended-install answers
    #[serde(default)]
    pub seed_image: Option<PathBuf>,

    /// Extra DVD images attached after the installation media
    #[serde(default)]
    pub secondary_iso_images: Vec<PathBuf>,

    #[serde(default)]
    pub vlan_id: Option<u16>,

    /// Reboots the unattended install performs before it is finished
    #[serde(default = "default_expected_reboot_count")]
    pub expected_reboot_count: u32,

    #[serde(default = "default_install_poll_interval_secs")]
    pub install_poll_interval_secs: u64,

    #[serde(default = "default_install_timeout_mins")]
    pub install_timeout_mins: u64,

    /// Uptime drops no larger than this are not counted as reboots
    #[serde(default)]
    pub reboot_jitter_tolerance_secs: f64,

    #[serde(default = "default_address_poll_interval_secs")]
    pub address_poll_interval_secs: u64,

    #[serde(default = "default_address_poll_attempts")]
    pub address_poll_attempts: u32,

    #[serde(default = "default_remote_poll_interval_secs")]
    pub remote_poll_interval_secs: u64,

    #[serde(default = "default_remote_poll_attempts")]
    pub remote_poll_attempts: u32,

    /// Consecutive failed probes a wait absorbs before giving up
    #[serde(default = "default_tolerated_probe_failures")]
    pub tolerated_probe_failures: u32,

    #[serde(default)]
    pub start_settle_secs: u64,

    #[serde(default = "default_restart_settle_secs")]
    pub restart_settle_secs: u64,

    /// Restart the guest once provisioning commands have run
    #[serde(default)]
    pub restart_after_provision: bool,

    #[serde(default)]
    pub credential: Option<Credential>,

    #[serde(default)]
    pub provision_commands: Vec<String>,

    /// Directory the VM is exported into
    #[serde(default)]
    pub output_dir: PathBuf,

    /// Replace an existing output directory
    #[serde(default)]
    pub force: bool,

    /// Where the VM's own files live while it is being built
    #[serde(default)]
    pub vm_dir: Option<PathBuf>,
}

fn default_disk_size_mb() -> u64 {
    DEFAULT_DISK_SIZE_MB
}

fn default_memory_size_mb() -> u64 {
    DEFAULT_MEMORY_SIZE_MB
}

fn default_expected_reboot_count() -> u32 {
    2
}

fn default_install_poll_interval_secs() -> u64 {
    10
}

fn default_install_timeout_mins() -> u64 {
    120
}

fn default_address_poll_interval_secs() -> u64 {
    60
}

fn default_address_poll_attempts() -> u32 {
    60
}

fn default_remote_poll_interval_secs() -> u64 {
    10
}

fn default_remote_poll_attempts() -> u32 {
    30
}

fn default_tolerated_probe_failures() -> u32 {
    1
}

fn default_restart_settle_secs() -> u64 {
    120
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            disk_size_mb: default_disk_size_mb(),
            memory_size_mb: default_memory_size_mb(),
            vm_name: String::new(),
            switch_name: String::new(),
            switch_kind: SwitchKind::default(),
            iso_path: PathBuf::new(),
            seed_image: None,
            secondary_iso_images: Vec::new(),
            vlan_id: None,
            expected_reboot_count: default_expected_reboot_count(),
            install_poll_interval_secs: default_install_poll_interval_secs(),
            install_timeout_mins: default_install_timeout_mins(),
            reboot_jitter_tolerance_secs: 0.0,
            address_poll_interval_secs: default_address_poll_interval_secs(),
            address_poll_attempts: default_address_poll_attempts(),
            remote_poll_interval_secs: default_remote_poll_interval_secs(),
            remote_poll_attempts: default_remote_poll_attempts(),
            tolerated_probe_failures: default_tolerated_probe_failures(),
            start_settle_secs: 0,
            restart_settle_secs: default_restart_settle_secs(),
            restart_after_provision: false,
            credential: None,
            provision_commands: Vec::new(),
            output_dir: PathBuf::new(),
            force: false,
            vm_dir: None,
        }
    }
}

impl BuildConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> BuildResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            BuildError::Configuration(format!("reading {}: {}", path.display(), err))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            BuildError::Configuration(format!("parsing {}: {}", path.display(), err))
        })
    }

    /// Override options from `CIM_IMAGE_*` environment variables
    pub fn apply_env(&mut self) -> BuildResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override options from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> BuildResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(iso_path) = lookup("CIM_IMAGE_ISO_PATH") {
            self.iso_path = PathBuf::from(iso_path);
        }
        if let Some(output_dir) = lookup("CIM_IMAGE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(output_dir);
        }
        if let Some(vm_name) = lookup("CIM_IMAGE_VM_NAME") {
            self.vm_name = vm_name;
        }
        if let Some(switch_name) = lookup("CIM_IMAGE_SWITCH_NAME") {
            self.switch_name = switch_name;
        }
        if let Some(raw) = lookup("CIM_IMAGE_DISK_SIZE_MB") {
            self.disk_size_mb = parse_override("CIM_IMAGE_DISK_SIZE_MB", &raw)?;
        }
        if let Some(raw) = lookup("CIM_IMAGE_MEMORY_SIZE_MB") {
            self.memory_size_mb = parse_override("CIM_IMAGE_MEMORY_SIZE_MB", &raw)?;
        }
        if let Some(raw) = lookup("CIM_IMAGE_VLAN_ID") {
            self.vlan_id = Some(parse_override("CIM_IMAGE_VLAN_ID", &raw)?);
        }
        if let Some(raw) = lookup("CIM_IMAGE_FORCE") {
            self.force = parse_override("CIM_IMAGE_FORCE", &raw)?;
        }

        let username = lookup("CIM_IMAGE_USERNAME");
        let password = lookup("CIM_IMAGE_PASSWORD");
        if username.is_some() || password.is_some() {
            let current = self.credential.take().unwrap_or(Credential {
                username: String::new(),
                password: String::new(),
            });
            self.credential = Some(Credential {
                username: username.unwrap_or(current.username),
                password: password.unwrap_or(current.password),
            });
        }

        Ok(())
    }

    /// Check every option and resolve defaults
    ///
    /// All violations are collected; nothing is returned half-validated.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigErrors> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if !(MIN_DISK_SIZE_MB..=MAX_DISK_SIZE_MB).contains(&self.disk_size_mb) {
            errors.push(ConfigError::DiskSize {
                min: MIN_DISK_SIZE_MB,
                max: MAX_DISK_SIZE_MB,
                actual: self.disk_size_mb,
            });
        }
        if !(MIN_MEMORY_SIZE_MB..=MAX_MEMORY_SIZE_MB).contains(&self.memory_size_mb) {
            errors.push(ConfigError::MemorySize {
                min: MIN_MEMORY_SIZE_MB,
                max: MAX_MEMORY_SIZE_MB,
                actual: self.memory_size_mb,
            });
        }

        if self.iso_path.as_os_str().is_empty() {
            errors.push(ConfigError::IsoPath("is required".to_string()));
        } else if !self.iso_path.is_file() {
            errors.push(ConfigError::IsoPath(format!(
                "{} does not exist",
                self.iso_path.display()
            )));
        }
        for image in &self.secondary_iso_images {
            if !image.is_file() {
                errors.push(ConfigError::IsoPath(format!(
                    "secondary image {} does not exist",
                    image.display()
                )));
            }
        }
        if let Some(seed_image) = &self.seed_image {
            if !seed_image.is_file() {
                errors.push(ConfigError::SeedImage(format!(
                    "{} does not exist",
                    seed_image.display()
                )));
            }
        }

        if self.output_dir.as_os_str().is_empty() {
            errors.push(ConfigError::OutputDir("is required".to_string()));
        } else if self.output_dir.exists() && !self.force {
            errors.push(ConfigError::OutputDir(format!(
                "{} already exists; set force to replace it",
                self.output_dir.display()
            )));
        }

        if self.install_timeout_mins == 0 {
            errors.push(ConfigError::InstallTimeout(
                "must be greater than zero".to_string(),
            ));
        } else if self.install_timeout_mins > MAX_INSTALL_TIMEOUT_MINS {
            errors.push(ConfigError::InstallTimeout(format!(
                "must not exceed {} minutes, got {}",
                MAX_INSTALL_TIMEOUT_MINS, self.install_timeout_mins
            )));
        } else if self.install_timeout_mins > LONG_INSTALL_TIMEOUT_MINS {
            warnings.push(format!(
                "install_timeout_mins of {} is unusually long",
                self.install_timeout_mins
            ));
        }

        let positive: [(&'static str, u64); 5] = [
            ("install_poll_interval_secs", self.install_poll_interval_secs),
            ("address_poll_interval_secs", self.address_poll_interval_secs),
            ("address_poll_attempts", u64::from(self.address_poll_attempts)),
            ("remote_poll_interval_secs", self.remote_poll_interval_secs),
            ("remote_poll_attempts", u64::from(self.remote_poll_attempts)),
        ];
        for (field, value) in positive {
            if value == 0 {
                errors.push(ConfigError::NotPositive { field });
            }
        }

        let install_timeout_secs = self.install_timeout_mins.saturating_mul(60);
        if install_timeout_secs > 0 && self.install_poll_interval_secs > install_timeout_secs {
            errors.push(ConfigError::InstallPollInterval {
                interval_secs: self.install_poll_interval_secs,
                timeout_secs: install_timeout_secs,
            });
        }

        if !self.reboot_jitter_tolerance_secs.is_finite() || self.reboot_jitter_tolerance_secs < 0.0
        {
            errors.push(ConfigError::JitterTolerance(
                self.reboot_jitter_tolerance_secs.to_string(),
            ));
        }

        let vlan = match self.vlan_id.map(VlanId::new).transpose() {
            Ok(vlan) => vlan,
            Err(err) => {
                errors.push(ConfigError::Vlan(err.to_string()));
                None
            }
        };

        let credential = match &self.credential {
            None => {
                errors.push(ConfigError::Credential("is required".to_string()));
                None
            }
            Some(credential) if credential.username.trim().is_empty() => {
                errors.push(ConfigError::Credential("username is empty".to_string()));
                None
            }
            Some(credential) => Some(credential.clone()),
        };

        if self.expected_reboot_count == 0 {
            warnings.push(
                "expected_reboot_count is 0; the install wait ends at the first uptime sample"
                    .to_string(),
            );
        }

        let credential = match credential {
            Some(credential) if errors.is_empty() => credential,
            _ => return Err(ConfigErrors(errors)),
        };

        let vm_name = if self.vm_name.trim().is_empty() {
            format!("pvm_{}", Uuid::now_v7())
        } else {
            self.vm_name.trim().to_string()
        };
        let switch_name = if self.switch_name.trim().is_empty() {
            format!("pis_{}", Uuid::now_v7())
        } else {
            self.switch_name.trim().to_string()
        };
        let vm_dir = self.vm_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir()
                .join("cim-image-builder")
                .join(&vm_name)
        });

        let install_interval = Duration::from_secs(self.install_poll_interval_secs);
        let install_timeout = Duration::from_secs(self.install_timeout_mins * 60);
        let install_attempts = (self.install_timeout_mins * 60)
            .div_ceil(self.install_poll_interval_secs)
            .max(1);

        Ok(ValidatedConfig {
            vm_name,
            switch_name,
            switch_kind: self.switch_kind.clone(),
            memory_bytes: self.memory_size_mb * BYTES_PER_MB,
            disk_bytes: self.disk_size_mb * BYTES_PER_MB,
            iso_path: self.iso_path.clone(),
            seed_image: self.seed_image.clone(),
            secondary_iso_images: self.secondary_iso_images.clone(),
            vlan,
            expected_reboot_count: self.expected_reboot_count,
            reboot_jitter_tolerance_secs: self.reboot_jitter_tolerance_secs,
            install_poll: PollPolicy::new(
                install_interval,
                u32::try_from(install_attempts).unwrap_or(u32::MAX),
            )
            .with_max_elapsed(install_timeout)
            .tolerating(self.tolerated_probe_failures),
            address_poll: PollPolicy::new(
                Duration::from_secs(self.address_poll_interval_secs),
                self.address_poll_attempts,
            )
            .tolerating(self.tolerated_probe_failures),
            remote_poll: PollPolicy::new(
                Duration::from_secs(self.remote_poll_interval_secs),
                self.remote_poll_attempts,
            )
            .tolerating(self.tolerated_probe_failures),
            start_settle: Duration::from_secs(self.start_settle_secs),
            restart_settle: Duration::from_secs(self.restart_settle_secs),
            restart_after_provision: self.restart_after_provision,
            credential,
            provision_commands: self.provision_commands.clone(),
            output_dir: self.output_dir.clone(),
            force: self.force,
            vm_dir,
            warnings,
        })
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, raw: &str) -> BuildResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| BuildError::Configuration(format!("{}: {}", name, err)))
}

/// Configuration with every default resolved and every bound checked
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub vm_name: String,
    pub switch_name: String,
    pub switch_kind: SwitchKind,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub iso_path: PathBuf,
    pub seed_image: Option<PathBuf>,
    pub secondary_iso_images: Vec<PathBuf>,
    pub vlan: Option<VlanId>,
    pub expected_reboot_count: u32,
    pub reboot_jitter_tolerance_secs: f64,
    pub install_poll: PollPolicy,
    pub address_poll: PollPolicy,
    pub remote_poll: PollPolicy,
    pub start_settle: Duration,
    pub restart_settle: Duration,
    pub restart_after_provision: bool,
    pub credential: Credential,
    pub provision_commands: Vec<String>,
    pub output_dir: PathBuf,
    pub force: bool,
    pub vm_dir: PathBuf,
    /// Accepted but suspicious settings
    pub warnings: Vec<String>,
}
