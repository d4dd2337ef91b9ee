//! Memory hierarchy configuration
//!
//! Sources, lowest precedence first:
//! - a named profile (`TIERMEM_PROFILE`, default `small`)
//! - `TIERMEM_*` environment overrides
//! - programmatic setup through [`ConfigBuilder`]

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Named sizing presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Tiny pages and capacities, exercises eviction on every tier
    Tiny,
    /// 128-byte pages, 32 pages per tier, 2 MiB page file
    Small,
    /// Kilobyte pages for hosts with memory to spare
    Large,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Small
    }
}

impl std::str::FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(Profile::Tiny),
            "small" => Ok(Profile::Small),
            "large" => Ok(Profile::Large),
            _ => Err(Error::ConfigError(format!("Invalid profile: {}", s))),
        }
    }
}

/// Geometry of one cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Bytes per page
    pub page_size: usize,

    /// Resident page capacity
    pub pages: usize,
}

impl TierConfig {
    pub fn new(page_size: usize, pages: usize) -> Self {
        Self { page_size, pages }
    }

    /// Bytes this tier can keep resident
    pub fn resident_bytes(&self) -> usize {
        self.page_size * self.pages
    }

    fn validate(&self, tier: &str) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::ConfigError(format!(
                "{} page size must be non-zero",
                tier
            )));
        }
        if self.pages == 0 {
            return Err(Error::ConfigError(format!(
                "{} page count must be non-zero",
                tier
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmmConfig {
    /// Backing file, created or truncated on open
    pub pagefile: PathBuf,

    /// Size of the backing file and of the address space
    pub maximum_size: u64,

    /// Topmost tier
    pub ram: TierConfig,

    pub psram: TierConfig,

    /// Tier held in block-allocator memory
    pub himem: TierConfig,

    /// `sync_all` the page file on every flush
    pub sync_on_flush: bool,
}

impl Default for VmmConfig {
    fn default() -> Self {
        Self::small()
    }
}

impl VmmConfig {
    /// Load the profile named by `TIERMEM_PROFILE` and apply `TIERMEM_*` overrides
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`VmmConfig::from_env`] with variables read through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile: Profile = match lookup("TIERMEM_PROFILE") {
            Some(name) => name.parse()?,
            None => Profile::default(),
        };

        let mut config = Self::profile(profile);
        config.apply_overrides(&lookup)?;
        config.validate()?;

        Ok(config)
    }

    pub fn profile(profile: Profile) -> Self {
        match profile {
            Profile::Tiny => Self::tiny(),
            Profile::Small => Self::small(),
            Profile::Large => Self::large(),
        }
    }

    pub fn tiny() -> Self {
        Self {
            pagefile: PathBuf::from("pagefile.bin"),
            maximum_size: 1024 * 1024, // 1MB
            ram: TierConfig::new(16, 16),
            psram: TierConfig::new(24, 24),
            himem: TierConfig::new(32, 32),
            sync_on_flush: false,
        }
    }

    pub fn small() -> Self {
        Self {
            pagefile: PathBuf::from("pagefile.bin"),
            maximum_size: 2 * 1024 * 1024, // 2MB
            ram: TierConfig::new(128, 32),
            psram: TierConfig::new(128, 32),
            himem: TierConfig::new(128, 32),
            sync_on_flush: false,
        }
    }

    pub fn large() -> Self {
        Self {
            pagefile: PathBuf::from("pagefile.bin"),
            maximum_size: 64 * 1024 * 1024, // 64MB
            ram: TierConfig::new(1024, 64),
            psram: TierConfig::new(2048, 256),
            himem: TierConfig::new(4096, 512),
            sync_on_flush: true,
        }
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TIERMEM_PAGEFILE") {
            self.pagefile = PathBuf::from(path);
        }
        if let Some(size) = lookup("TIERMEM_MAXIMUM_SIZE") {
            self.maximum_size = parse_var("TIERMEM_MAXIMUM_SIZE", &size)?;
        }
        if let Some(sync) = lookup("TIERMEM_SYNC_ON_FLUSH") {
            self.sync_on_flush = parse_var("TIERMEM_SYNC_ON_FLUSH", &sync)?;
        }

        for (prefix, tier) in [
            ("TIERMEM_RAM", &mut self.ram),
            ("TIERMEM_PSRAM", &mut self.psram),
            ("TIERMEM_HIMEM", &mut self.himem),
        ] {
            let key = format!("{}_PAGE_SIZE", prefix);
            if let Some(value) = lookup(&key) {
                tier.page_size = parse_var(&key, &value)?;
            }
            let key = format!("{}_PAGES", prefix);
            if let Some(value) = lookup(&key) {
                tier.pages = parse_var(&key, &value)?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pagefile.as_os_str().is_empty() {
            return Err(Error::ConfigError("pagefile must be set".to_string()));
        }
        if self.maximum_size == 0 {
            return Err(Error::ConfigError(
                "maximum_size must be non-zero".to_string(),
            ));
        }

        self.ram.validate("ram")?;
        self.psram.validate("psram")?;
        self.himem.validate("himem")?;

        // block ids are 16 bits wide
        if self.himem.pages > u16::MAX as usize {
            return Err(Error::ConfigError(format!(
                "himem page count {} exceeds {}",
                self.himem.pages,
                u16::MAX
            )));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ConfigError(format!("Invalid {}: {}", key, value)))
}

/// Configuration builder for programmatic setup
pub struct ConfigBuilder {
    config: VmmConfig,
}

impl ConfigBuilder {
    pub fn new(profile: Profile) -> Self {
        Self {
            config: VmmConfig::profile(profile),
        }
    }

    pub fn with_pagefile(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pagefile = path.into();
        self
    }

    pub fn with_maximum_size(mut self, bytes: u64) -> Self {
        self.config.maximum_size = bytes;
        self
    }

    pub fn with_ram(mut self, page_size: usize, pages: usize) -> Self {
        self.config.ram = TierConfig::new(page_size, pages);
        self
    }

    pub fn with_psram(mut self, page_size: usize, pages: usize) -> Self {
        self.config.psram = TierConfig::new(page_size, pages);
        self
    }

    pub fn with_himem(mut self, page_size: usize, pages: usize) -> Self {
        self.config.himem = TierConfig::new(page_size, pages);
        self
    }

    pub fn with_sync_on_flush(mut self, sync: bool) -> Self {
        self.config.sync_on_flush = sync;
        self
    }

    pub fn build(self) -> Result<VmmConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_small_profile() {
        let config = VmmConfig::small();
        assert_eq!(config.maximum_size, 2 * 1024 * 1024);
        assert_eq!(config.ram, TierConfig::new(128, 32));
        assert_eq!(config.himem.resident_bytes(), 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = VmmConfig::from_lookup(lookup(&[
            ("TIERMEM_PROFILE", "tiny"),
            ("TIERMEM_PAGEFILE", "/tmp/swap.bin"),
            ("TIERMEM_HIMEM_PAGES", "64"),
            ("TIERMEM_RAM_PAGE_SIZE", " 8 "),
            ("TIERMEM_SYNC_ON_FLUSH", "true"),
        ]))
        .unwrap();

        assert_eq!(config.pagefile, PathBuf::from("/tmp/swap.bin"));
        assert_eq!(config.himem, TierConfig::new(32, 64));
        assert_eq!(config.ram, TierConfig::new(8, 16));
        assert!(config.sync_on_flush);
    }

    #[test]
    fn test_invalid_env_values() {
        assert!(VmmConfig::from_lookup(lookup(&[("TIERMEM_PROFILE", "huge")])).is_err());
        assert!(VmmConfig::from_lookup(lookup(&[("TIERMEM_PSRAM_PAGES", "lots")])).is_err());
        assert!(VmmConfig::from_lookup(lookup(&[("TIERMEM_MAXIMUM_SIZE", "0")])).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_and_oversized_tiers() {
        assert!(ConfigBuilder::new(Profile::Small)
            .with_ram(0, 32)
            .build()
            .is_err());
        assert!(ConfigBuilder::new(Profile::Small)
            .with_psram(128, 0)
            .build()
            .is_err());
        assert!(ConfigBuilder::new(Profile::Small)
            .with_himem(128, 70_000)
            .build()
            .is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new(Profile::Large)
            .with_pagefile("/tmp/test.bin")
            .with_maximum_size(4096)
            .with_sync_on_flush(false)
            .build()
            .unwrap();

        assert_eq!(config.pagefile, PathBuf::from("/tmp/test.bin"));
        assert_eq!(config.maximum_size, 4096);
        assert!(!config.sync_on_flush);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = VmmConfig::tiny();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: VmmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
