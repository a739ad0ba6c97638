// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{CrashReportingLevel, DataCollectionLevel},
    protocol::encoding::{MAX_NAME_LEN, truncate_chars},
};

/// Default maximum age of a cached record before eviction (1h 45min).
pub const DEFAULT_MAX_RECORD_AGE_MS: i64 = 105 * 60 * 1000;
/// Default lower memory bound of the beacon cache (80 MB).
pub const DEFAULT_LOWER_MEMORY_BOUNDARY_BYTES: i64 = 80 * 1024 * 1024;
/// Default upper memory bound of the beacon cache (100 MB).
pub const DEFAULT_UPPER_MEMORY_BOUNDARY_BYTES: i64 = 100 * 1024 * 1024;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Application identity and the analytics endpoint.
    pub application: ApplicationConfig,
    /// Device description reported in every beacon prefix.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Privacy gates applied at serialization time.
    #[serde(default)]
    pub privacy: PrivacyConfig,
    /// Beacon cache bounds used by the eviction engine.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Application identity parameters; all of them travel in the immutable
/// beacon prefix.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ApplicationConfig {
    #[serde(rename = "EndpointUrl")]
    /// Base URL of the analytics cluster (mandatory).
    pub endpoint_url: String,

    #[serde(rename = "ApplicationId")]
    /// Application identifier assigned by the server (mandatory).
    pub application_id: String,

    #[serde(default, rename = "ApplicationName")]
    /// Human-readable application name.
    pub application_name: String,

    #[serde(default, rename = "ApplicationVersion")]
    /// Version reported in the beacon prefix; empty means the SDK's own
    /// version.
    pub application_version: String,

    #[serde(rename = "DeviceId")]
    /// Device identifier; used verbatim only at the `UserBehavior`
    /// collection level, otherwise replaced by a per-beacon random id.
    pub device_id: String,
}

/// Device description, all optional.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct DeviceConfig {
    #[serde(default, rename = "OperatingSystem")]
    pub operating_system: String,
    #[serde(default, rename = "Manufacturer")]
    pub manufacturer: String,
    #[serde(default, rename = "ModelId")]
    pub model_id: String,
}

/// Privacy settings, immutable for the lifetime of the SDK instance.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct PrivacyConfig {
    #[serde(rename = "DataCollectionLevel")]
    pub data_collection_level: DataCollectionLevel,
    #[serde(rename = "CrashReportingLevel")]
    pub crash_reporting_level: CrashReportingLevel,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            data_collection_level: DataCollectionLevel::UserBehavior,
            crash_reporting_level: CrashReportingLevel::OptInCrashes,
        }
    }
}

/// Beacon cache bounds. A non-positive age disables time eviction; a
/// non-positive or inverted byte bound disables space eviction.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct CacheConfig {
    #[serde(rename = "MaxRecordAgeMs")]
    pub max_record_age_ms: i64,
    #[serde(rename = "LowerMemoryBytes")]
    pub lower_memory_bytes: i64,
    #[serde(rename = "UpperMemoryBytes")]
    pub upper_memory_bytes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_record_age_ms: DEFAULT_MAX_RECORD_AGE_MS,
            lower_memory_bytes: DEFAULT_LOWER_MEMORY_BOUNDARY_BYTES,
            upper_memory_bytes: DEFAULT_UPPER_MEMORY_BOUNDARY_BYTES,
        }
    }
}

/// Resolves a possibly-relative config path against the current working
/// directory.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.application.endpoint_url.is_empty(),
            "EndpointUrl must not be empty"
        );
        ensure!(
            !self.application.application_id.is_empty(),
            "ApplicationId must not be empty"
        );
        ensure!(
            !self.application.device_id.is_empty(),
            "DeviceId must not be empty"
        );

        // Over-long identity strings are cut rather than rejected.
        let app = &mut self.application;
        app.application_name =
            truncate_chars(&app.application_name, MAX_NAME_LEN).into_owned();
        app.application_version =
            truncate_chars(&app.application_version, MAX_NAME_LEN).into_owned();
        app.device_id = truncate_chars(&app.device_id, MAX_NAME_LEN).into_owned();

        let dev = &mut self.device;
        dev.operating_system =
            truncate_chars(&dev.operating_system, MAX_NAME_LEN).into_owned();
        dev.manufacturer = truncate_chars(&dev.manufacturer, MAX_NAME_LEN).into_owned();
        dev.model_id = truncate_chars(&dev.model_id, MAX_NAME_LEN).into_owned();

        Ok(())
    }
}
