// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Simulated adapters for demo/testing

use std::collections::HashSet;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::StandardNormal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use super::{AdapterEvent, AdapterKind, AnchoredSource, EventSource, HealthSample, SamplePage, SampleType, SourceStatus};
use crate::error::{OrchestratorError, Result};
use crate::geofence::{Coordinate, RegionKind, RegionTable};

/// Ticks spent at each leg of the home -> gym -> home loop
const LEG_TICKS: u64 = 30;

/// What a simulated source emits
#[derive(Debug, Clone)]
enum Behaviour {
    /// Heart rate, steps, energy and battery
    Motion { rate_hz: f64 },
    /// Location fixes commuting between home and gym, plus region crossings
    Location { rate_hz: f64, regions: RegionTable },
    /// Background execution windows
    Host { every: Duration, budget: Duration },
}

/// Push-style source producing realistic data
pub struct SimulatedSource {
    id: String,
    kind: AdapterKind,
    device_id: String,
    behaviour: Behaviour,
    status: SourceStatus,
    deny_permission: bool,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    fn with(id: &str, kind: AdapterKind, device_id: &str, behaviour: Behaviour) -> Self {
        Self {
            id: id.to_string(),
            kind,
            device_id: device_id.to_string(),
            behaviour,
            status: SourceStatus::Stopped,
            deny_permission: false,
            stop_tx: None,
            handle: None,
        }
    }

    pub fn motion(id: &str, device_id: &str, rate_hz: f64) -> Self {
        Self::with(id, AdapterKind::Motion, device_id, Behaviour::Motion { rate_hz })
    }

    pub fn location(id: &str, device_id: &str, regions: RegionTable, rate_hz: f64) -> Self {
        Self::with(id, AdapterKind::Location, device_id, Behaviour::Location { rate_hz, regions })
    }

    pub fn host(id: &str, every: Duration, budget: Duration) -> Self {
        Self::with(id, AdapterKind::HostScheduler, "", Behaviour::Host { every, budget })
    }

    /// Fail `start` as if the user declined authorization
    pub fn with_permission_denied(mut self) -> Self {
        self.deny_permission = true;
        self
    }
}

#[async_trait]
impl EventSource for SimulatedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> AdapterKind {
        self.kind
    }

    fn status(&self) -> SourceStatus {
        self.status
    }

    async fn start(&mut self, events: mpsc::Sender<AdapterEvent>) -> Result<()> {
        if self.deny_permission {
            self.status = SourceStatus::Degraded;
            return Err(OrchestratorError::PermissionDenied {
                adapter: self.kind,
                reason: "authorization not granted (simulated)".into(),
            });
        }
        self.status = SourceStatus::Starting;

        let (stop_tx, stop_rx) = oneshot::channel();
        let emitter = Emitter {
            id: self.id.clone(),
            device_id: self.device_id.clone(),
            events,
            rng: StdRng::from_entropy(),
        };
        self.handle = Some(tokio::spawn(emitter.run(self.behaviour.clone(), stop_rx)));
        self.stop_tx = Some(stop_tx);
        self.status = SourceStatus::Active;

        info!("Simulated {} adapter '{}' started", self.kind, self.id);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.status = SourceStatus::Stopped;
        Ok(())
    }
}

struct Emitter {
    id: String,
    device_id: String,
    events: mpsc::Sender<AdapterEvent>,
    rng: StdRng,
}

impl Emitter {
    async fn run(mut self, behaviour: Behaviour, mut stop_rx: oneshot::Receiver<()>) {
        let period = match &behaviour {
            Behaviour::Motion { rate_hz } | Behaviour::Location { rate_hz, .. } => {
                Duration::from_secs_f64(1.0 / rate_hz.max(0.001))
            }
            Behaviour::Host { every, .. } => *every,
        };
        let mut ticker = interval(period);
        let mut tick: u64 = 0;
        let mut inside = HashSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let batch = match &behaviour {
                        Behaviour::Motion { .. } => self.motion(tick),
                        Behaviour::Location { regions, .. } => self.location(tick, regions, &mut inside),
                        Behaviour::Host { budget, .. } => vec![AdapterEvent::ExecutionWindow { budget: *budget }],
                    };
                    for event in batch {
                        if self.events.send(event).await.is_err() {
                            debug!("Simulator '{}' lost its receiver", self.id);
                            return;
                        }
                    }
                    tick += 1;
                }
                _ = &mut stop_rx => break,
            }
        }
    }

    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.rng.sample::<f64, _>(StandardNormal)
    }

    fn sample(&self, sample_type: SampleType, value: f64) -> AdapterEvent {
        AdapterEvent::Sample(HealthSample::new(sample_type, value, Utc::now(), &self.id, &self.device_id))
    }

    fn motion(&mut self, tick: u64) -> Vec<AdapterEvent> {
        let heart_rate = self.gaussian(72.0, 6.0).clamp(45.0, 190.0).round();
        let steps = self.rng.gen_range(0..30) as f64;
        let energy = (steps * 0.04).max(0.0);

        let mut out = vec![
            self.sample(SampleType::HeartRate, heart_rate),
            self.sample(SampleType::StepCount, steps),
            self.sample(SampleType::ActiveEnergy, energy),
        ];
        if tick % 60 == 0 {
            let battery = 100.0 - (tick / 60 % 100) as f64;
            out.push(self.sample(SampleType::BatteryLevel, battery));
        }
        out
    }

    fn location(&mut self, tick: u64, regions: &RegionTable, inside: &mut HashSet<String>) -> Vec<AdapterEvent> {
        let home = center_of(regions, RegionKind::Home).unwrap_or(Coordinate::new(37.7833, -122.4167));
        let gym = center_of(regions, RegionKind::Gym).unwrap_or(Coordinate::new(37.7749, -122.4194));

        // home, commute, gym, commute
        let leg = (tick / LEG_TICKS) % 4;
        let base = match leg {
            0 => home,
            2 => gym,
            _ => Coordinate::new((home.latitude + gym.latitude) / 2.0, (home.longitude + gym.longitude) / 2.0),
        };
        let point = Coordinate::new(
            base.latitude + self.gaussian(0.0, 0.00003),
            base.longitude + self.gaussian(0.0, 0.00003),
        );
        let now = Utc::now();

        let mut out = vec![AdapterEvent::Sample(HealthSample::location(
            point,
            self.gaussian(8.0, 2.0).abs(),
            now,
            &self.id,
            &self.device_id,
        ))];
        for (region_id, transition) in regions.transitions(inside, &point) {
            out.push(AdapterEvent::Region {
                region_id,
                transition,
                at: now,
            });
        }
        out
    }
}

fn center_of(regions: &RegionTable, kind: RegionKind) -> Option<Coordinate> {
    let mut matching: Vec<_> = regions.iter().filter(|r| r.kind == kind).collect();
    matching.sort_by(|a, b| a.id.cmp(&b.id));
    matching.first().map(|r| r.center)
}

/// Pull-style history store; the anchor is the index of the next sample
pub struct SimulatedHistory {
    name: String,
    kind: AdapterKind,
    backlog: Mutex<Vec<HealthSample>>,
}

impl SimulatedHistory {
    pub fn new(name: &str, kind: AdapterKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            backlog: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, samples: impl IntoIterator<Item = HealthSample>) {
        self.backlog.lock().extend(samples);
    }

    /// A day of hourly vitals
    pub fn fill_demo(&self, device_id: &str) {
        let mut rng = StdRng::from_entropy();
        let start = Utc::now() - chrono::Duration::hours(24);

        let samples = (0..24).flat_map(|hour| {
            let at = start + chrono::Duration::hours(hour);
            let resting = 62.0 + 4.0 * rng.sample::<f64, _>(StandardNormal);
            let oxygen = (97.5 + rng.sample::<f64, _>(StandardNormal)).clamp(90.0, 100.0);
            [
                HealthSample::new(SampleType::HeartRate, resting.round(), at, &self.name, device_id),
                HealthSample::new(SampleType::BloodOxygen, oxygen, at, &self.name, device_id),
                HealthSample::new(SampleType::RespiratoryRate, 14.0, at, &self.name, device_id),
            ]
        });
        let samples: Vec<_> = samples.collect();
        self.push(samples);
    }

    pub fn len(&self) -> usize {
        self.backlog.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backlog.lock().is_empty()
    }
}

#[async_trait]
impl AnchoredSource for SimulatedHistory {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        self.kind
    }

    async fn fetch_page(&self, anchor: Option<&str>, limit: usize) -> Result<SamplePage> {
        let start = match anchor {
            Some(a) => a
                .parse::<usize>()
                .map_err(|_| OrchestratorError::Serialization(format!("bad anchor '{}'", a)))?,
            None => 0,
        };

        let backlog = self.backlog.lock();
        let start = start.min(backlog.len());
        let end = start.saturating_add(limit.max(1)).min(backlog.len());

        Ok(SamplePage {
            samples: backlog[start..end].to_vec(),
            next_anchor: Some(end.to_string()),
            has_more: end < backlog.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::{GeofenceRegion, RegionTransition};

    fn regions() -> RegionTable {
        RegionTable::new(vec![
            GeofenceRegion::new("gym", Coordinate::new(37.7749, -122.4194), 100.0, RegionKind::Gym),
            GeofenceRegion::new("home", Coordinate::new(37.7833, -122.4167), 100.0, RegionKind::Home),
        ])
    }

    #[tokio::test]
    async fn test_motion_emits_valid_samples() {
        let mut source = SimulatedSource::motion("watch", "dev-1", 100.0);
        let (tx, mut rx) = mpsc::channel(64);
        source.start(tx).await.unwrap();
        assert_eq!(source.status(), SourceStatus::Active);

        for _ in 0..6 {
            match rx.recv().await.unwrap() {
                AdapterEvent::Sample(s) => s.validate().unwrap(),
                other => panic!("unexpected {:?}", other),
            }
        }
        source.stop().await.unwrap();
        assert_eq!(source.status(), SourceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_denied_permission() {
        let mut source = SimulatedSource::location("gps", "dev-1", regions(), 1.0).with_permission_denied();
        let (tx, _rx) = mpsc::channel(1);
        let err = source.start(tx).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PermissionDenied { adapter: AdapterKind::Location, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_loop_crosses_regions() {
        let mut source = SimulatedSource::location("gps", "dev-1", regions(), 1.0);
        let (tx, mut rx) = mpsc::channel(1024);
        source.start(tx).await.unwrap();

        let mut crossings = Vec::new();
        while crossings.len() < 3 {
            if let Some(AdapterEvent::Region { region_id, transition, .. }) = rx.recv().await {
                crossings.push((region_id, transition));
            }
        }
        source.stop().await.unwrap();

        assert_eq!(crossings[0], ("home".to_string(), RegionTransition::Enter));
        assert_eq!(crossings[1], ("home".to_string(), RegionTransition::Exit));
        assert_eq!(crossings[2], ("gym".to_string(), RegionTransition::Enter));
    }

    #[tokio::test]
    async fn test_history_pages_by_anchor() {
        let history = SimulatedHistory::new("health-store", AdapterKind::HealthStore);
        history.fill_demo("dev-1");
        assert_eq!(history.len(), 72);

        let first = history.fetch_page(None, 50).await.unwrap();
        assert_eq!(first.samples.len(), 50);
        assert!(first.has_more);

        let second = history.fetch_page(first.next_anchor.as_deref(), 50).await.unwrap();
        assert_eq!(second.samples.len(), 22);
        assert!(!second.has_more);
        assert_eq!(second.next_anchor.as_deref(), Some("72"));

        let empty = history.fetch_page(Some("72"), 50).await.unwrap();
        assert!(empty.samples.is_empty());
        assert!(history.fetch_page(Some("nope"), 50).await.is_err());
    }
}
