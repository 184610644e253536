// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Adapter traits and common sample types

use std::fmt;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::geofence::{Coordinate, RegionTransition};

/// Sample types collected by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    // Vitals
    HeartRate,
    RespiratoryRate,
    BloodOxygen,
    BodyTemperature,
    BloodGlucose,

    // Activity
    StepCount,
    DistanceWalkingRunning,
    ActiveEnergy,

    // Derived from geofenced sessions
    WorkoutSession,
    SleepSession,

    // Location history
    LocationFix,

    // Device metrics
    DeviceMotion,
    BatteryLevel,
}

/// Broad metric grouping used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Vital,
    Activity,
    Sleep,
    Location,
    Device,
}

/// Upload channel; every channel ships to its own endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Health,
    DeviceMetrics,
    LocationHistory,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Health, Channel::DeviceMetrics, Channel::LocationHistory];

    /// Path of the sync endpoint for this channel
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Channel::Health => "/health-data/sync",
            Channel::DeviceMetrics => "/device-metrics/sync",
            Channel::LocationHistory => "/location-history/sync",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Health => "health",
            Channel::DeviceMetrics => "device_metrics",
            Channel::LocationHistory => "location_history",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl SampleType {
    /// Wire name of the sample type
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::HeartRate => "heart_rate",
            SampleType::RespiratoryRate => "respiratory_rate",
            SampleType::BloodOxygen => "blood_oxygen",
            SampleType::BodyTemperature => "body_temperature",
            SampleType::BloodGlucose => "blood_glucose",
            SampleType::StepCount => "steps",
            SampleType::DistanceWalkingRunning => "distance_walked",
            SampleType::ActiveEnergy => "calories_burned",
            SampleType::WorkoutSession => "workout_session",
            SampleType::SleepSession => "sleep_duration",
            SampleType::LocationFix => "location_fix",
            SampleType::DeviceMotion => "device_motion",
            SampleType::BatteryLevel => "battery_level",
        }
    }

    /// Canonical unit
    pub fn unit(&self) -> &'static str {
        match self {
            SampleType::HeartRate => "bpm",
            SampleType::RespiratoryRate => "breaths/min",
            SampleType::BloodOxygen => "%",
            SampleType::BodyTemperature => "degC",
            SampleType::BloodGlucose => "mg/dL",
            SampleType::StepCount => "steps",
            SampleType::DistanceWalkingRunning => "m",
            SampleType::ActiveEnergy => "kcal",
            SampleType::WorkoutSession | SampleType::SleepSession => "s",
            SampleType::LocationFix => "m",
            SampleType::DeviceMotion => "g",
            SampleType::BatteryLevel => "%",
        }
    }

    pub fn category(&self) -> MetricCategory {
        match self {
            SampleType::HeartRate
            | SampleType::RespiratoryRate
            | SampleType::BloodOxygen
            | SampleType::BodyTemperature
            | SampleType::BloodGlucose => MetricCategory::Vital,
            SampleType::StepCount
            | SampleType::DistanceWalkingRunning
            | SampleType::ActiveEnergy
            | SampleType::WorkoutSession => MetricCategory::Activity,
            SampleType::SleepSession => MetricCategory::Sleep,
            SampleType::LocationFix => MetricCategory::Location,
            SampleType::DeviceMotion | SampleType::BatteryLevel => MetricCategory::Device,
        }
    }

    pub fn channel(&self) -> Channel {
        match self.category() {
            MetricCategory::Location => Channel::LocationHistory,
            MetricCategory::Device => Channel::DeviceMetrics,
            _ => Channel::Health,
        }
    }

    /// Plausible value range; `None` means any finite value is accepted
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        match self {
            SampleType::HeartRate => Some((40.0, 200.0)),
            SampleType::RespiratoryRate => Some((4.0, 60.0)),
            SampleType::BloodOxygen => Some((80.0, 100.0)),
            SampleType::BodyTemperature => Some((35.0, 42.0)),
            SampleType::BloodGlucose => Some((20.0, 600.0)),
            SampleType::StepCount => Some((0.0, 100_000.0)),
            SampleType::BatteryLevel => Some((0.0, 100.0)),
            // Session durations come from the geofence clock, not a sensor
            SampleType::WorkoutSession
            | SampleType::SleepSession
            | SampleType::DistanceWalkingRunning
            | SampleType::ActiveEnergy
            | SampleType::LocationFix
            | SampleType::DeviceMotion => None,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable measurement delivered by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub sample_type: SampleType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub device_id: String,

    /// Only set for location fixes
    pub coordinate: Option<Coordinate>,
}

impl HealthSample {
    pub fn new(
        sample_type: SampleType,
        value: f64,
        timestamp: DateTime<Utc>,
        source_id: &str,
        device_id: &str,
    ) -> Self {
        Self {
            sample_type,
            value,
            unit: sample_type.unit().to_string(),
            timestamp,
            source_id: source_id.to_string(),
            device_id: device_id.to_string(),
            coordinate: None,
        }
    }

    /// Location fix; value is the horizontal accuracy in meters
    pub fn location(
        coordinate: Coordinate,
        accuracy_m: f64,
        timestamp: DateTime<Utc>,
        source_id: &str,
        device_id: &str,
    ) -> Self {
        Self {
            coordinate: Some(coordinate),
            ..Self::new(SampleType::LocationFix, accuracy_m, timestamp, source_id, device_id)
        }
    }

    pub fn channel(&self) -> Channel {
        self.sample_type.channel()
    }

    /// Range check against the physiological table
    pub fn validate(&self) -> Result<()> {
        use crate::error::OrchestratorError;

        if !self.value.is_finite() {
            return Err(OrchestratorError::InvalidSample(format!(
                "{} value is not finite",
                self.sample_type
            )));
        }
        if let Some((min, max)) = self.sample_type.valid_range() {
            if self.value < min || self.value > max {
                return Err(OrchestratorError::InvalidSample(format!(
                    "{} value {} outside [{}, {}] {}",
                    self.sample_type, self.value, min, max, self.unit
                )));
            }
        }
        Ok(())
    }
}

/// Which host engine an adapter fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Location,
    Motion,
    HealthStore,
    HostScheduler,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterKind::Location => "location",
            AdapterKind::Motion => "motion",
            AdapterKind::HealthStore => "health store",
            AdapterKind::HostScheduler => "host scheduler",
        };
        f.write_str(name)
    }
}

/// Adapter operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Stopped,
    Starting,
    Active,
    Degraded,
}

/// Inbound event delivered by an adapter
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// Geofence crossing
    Region {
        region_id: String,
        transition: RegionTransition,
        at: DateTime<Utc>,
    },

    /// New sample from a motion/health/location engine
    Sample(HealthSample),

    /// Host granted a background execution window
    ExecutionWindow { budget: Duration },

    /// Host moved the app to the foreground (`true`) or background (`false`)
    Foreground(bool),

    /// Adapter lost its permission or backing service
    Unavailable { adapter: AdapterKind, reason: String },
}

/// Push-style event source
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Unique identifier
    fn id(&self) -> &str;

    /// Host engine behind this source
    fn kind(&self) -> AdapterKind;

    fn status(&self) -> SourceStatus;

    /// Begin delivering events; must return promptly
    async fn start(&mut self, events: mpsc::Sender<AdapterEvent>) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;
}

/// One page of an anchored query
#[derive(Debug, Clone, Default)]
pub struct SamplePage {
    pub samples: Vec<HealthSample>,
    /// Anchor to pass to the next call
    pub next_anchor: Option<String>,
    pub has_more: bool,
}

/// Pull-style source that resumes from an opaque anchor
#[async_trait]
pub trait AnchoredSource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> AdapterKind;

    /// Fetch at most `limit` samples newer than `anchor`
    async fn fetch_page(&self, anchor: Option<&str>, limit: usize) -> Result<SamplePage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_carries_canonical_unit() {
        let sample = HealthSample::new(SampleType::HeartRate, 72.0, Utc::now(), "watch", "dev-1");
        assert_eq!(sample.unit, "bpm");
        assert_eq!(sample.channel(), Channel::Health);
    }

    #[test]
    fn test_validation_ranges() {
        let now = Utc::now();
        assert!(HealthSample::new(SampleType::HeartRate, 72.0, now, "w", "d").validate().is_ok());
        assert!(HealthSample::new(SampleType::HeartRate, 250.0, now, "w", "d").validate().is_err());
        assert!(HealthSample::new(SampleType::BloodOxygen, 79.0, now, "w", "d").validate().is_err());
        assert!(HealthSample::new(SampleType::StepCount, f64::NAN, now, "w", "d").validate().is_err());
        // No range configured
        assert!(HealthSample::new(SampleType::WorkoutSession, 1e9, now, "w", "d").validate().is_ok());
        assert!(HealthSample::new(SampleType::SleepSession, 30.0 * 3600.0, now, "w", "d").validate().is_ok());
    }

    #[test]
    fn test_channel_routing() {
        assert_eq!(SampleType::SleepSession.channel(), Channel::Health);
        assert_eq!(SampleType::LocationFix.channel(), Channel::LocationHistory);
        assert_eq!(SampleType::DeviceMotion.channel(), Channel::DeviceMetrics);
        assert_eq!(Channel::parse("location_history"), Some(Channel::LocationHistory));
        assert_eq!(Channel::parse("nope"), None);
    }
}
