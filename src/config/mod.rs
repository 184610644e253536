// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::geofence::{Coordinate, GeofenceRegion, RegionKind};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Stable identifier attached to every sample
    pub device_id: String,

    /// Enable demo mode (simulated adapters)
    pub demo_mode: bool,

    pub collector: CollectorConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub geofence: GeofenceConfig,
    pub live_status: LiveStatusConfig,
    pub adapters: AdapterConfig,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "VitalSync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            device_id: "device-local".to_string(),
            demo_mode: true,
            collector: CollectorConfig::default(),
            sync: SyncConfig::default(),
            scheduler: SchedulerConfig::default(),
            geofence: GeofenceConfig::default(),
            live_status: LiveStatusConfig::default(),
            adapters: AdapterConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("vitalsync"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Point the database at `data_dir` unless it was set explicitly
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.database.path = data_dir.join("vitalsync.db");
        self.data_dir = data_dir;
    }
}

/// Collector batching limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Samples per batch before a flush
    pub max_batch_samples: usize,

    /// Oldest buffered sample age before a flush, in seconds
    pub max_batch_age_secs: u64,

    /// How often buffers are checked for age, in seconds
    pub flush_check_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_batch_samples: 100,
            max_batch_age_secs: 300,
            flush_check_secs: 15,
        }
    }
}

/// Upload endpoint and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the sync API
    pub endpoint: String,

    pub request_timeout_secs: u64,

    /// Transient attempts before a batch fails terminally
    pub max_attempts: u32,

    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,

    /// Terminally failed batches before the degraded indicator shows
    pub degraded_threshold: usize,

    /// Longest the worker sleeps with nothing eligible, in seconds
    pub idle_poll_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api".to_string(),
            request_timeout_secs: 30,
            max_attempts: 8,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 900_000,
            degraded_threshold: 3,
            idle_poll_secs: 60,
        }
    }
}

/// Recurring task intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub health_sync_interval_secs: u64,
    pub location_sync_interval_secs: u64,
    pub upload_interval_secs: u64,

    /// Samples requested per anchored query page
    pub page_size: usize,

    /// Window length the demo host grants, in seconds
    pub window_budget_secs: u64,

    /// How often the demo host grants a window, in seconds
    pub window_every_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            health_sync_interval_secs: 900,
            location_sync_interval_secs: 900,
            upload_interval_secs: 1800,
            page_size: 50,
            window_budget_secs: 30,
            window_every_secs: 60,
        }
    }
}

/// One monitored region as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub kind: RegionKind,
}

impl From<&RegionConfig> for GeofenceRegion {
    fn from(r: &RegionConfig) -> Self {
        GeofenceRegion::new(&r.id, Coordinate::new(r.latitude, r.longitude), r.radius_meters, r.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    pub regions: Vec<RegionConfig>,
}

impl GeofenceConfig {
    pub fn to_regions(&self) -> Vec<GeofenceRegion> {
        self.regions.iter().map(GeofenceRegion::from).collect()
    }
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            regions: vec![
                RegionConfig {
                    id: "gym".to_string(),
                    latitude: 37.7749,
                    longitude: -122.4194,
                    radius_meters: 100.0,
                    kind: RegionKind::Gym,
                },
                RegionConfig {
                    id: "home".to_string(),
                    latitude: 37.7833,
                    longitude: -122.4167,
                    radius_meters: 100.0,
                    kind: RegionKind::Home,
                },
            ],
        }
    }
}

/// Live status surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveStatusConfig {
    pub enabled: bool,
    pub interval_secs: u64,

    /// WebSocket display surface
    pub websocket_port: u16,
    pub websocket_max_clients: usize,
}

impl Default for LiveStatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            websocket_port: 8765,
            websocket_max_clients: 10,
        }
    }
}

/// Platform adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Per-adapter start timeout in milliseconds
    pub start_timeout_ms: u64,

    /// Inbound event channel capacity
    pub event_capacity: usize,

    /// Simulated sample rate in Hz (demo mode)
    pub simulated_rate_hz: f64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 5_000,
            event_capacity: 1_024,
            simulated_rate_hz: 1.0,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable database storage
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/vitalsync.db"),
        }
    }
}
