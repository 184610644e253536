// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Geofence regions and the session state machine they drive

mod session;

pub use session::{ActivitySession, SessionChange, SessionTracker};

use std::collections::{HashMap, HashSet};
use std::fmt;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine distance
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Direction of a geofence crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionTransition {
    Enter,
    Exit,
}

/// What a region means to the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Gym,
    Home,
}

impl RegionKind {
    /// Session kind opened by entering a region of this kind
    pub fn session_kind(&self) -> SessionKind {
        match self {
            RegionKind::Gym => SessionKind::Workout,
            RegionKind::Home => SessionKind::Sleep,
        }
    }
}

/// Kind of activity-tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Workout,
    Sleep,
}

impl SessionKind {
    pub const ALL: [SessionKind; 2] = [SessionKind::Workout, SessionKind::Sleep];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Workout => "workout",
            SessionKind::Sleep => "sleep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named circular area; static configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRegion {
    pub id: String,
    pub center: Coordinate,
    pub radius_meters: f64,
    pub kind: RegionKind,
}

impl GeofenceRegion {
    pub fn new(id: &str, center: Coordinate, radius_meters: f64, kind: RegionKind) -> Self {
        Self {
            id: id.to_string(),
            center,
            radius_meters,
            kind,
        }
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.center.distance_to(point) <= self.radius_meters
    }
}

/// Read-only lookup from region id to region
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    regions: HashMap<String, GeofenceRegion>,
}

impl RegionTable {
    pub fn new(regions: impl IntoIterator<Item = GeofenceRegion>) -> Self {
        Self {
            regions: regions.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&GeofenceRegion> {
        self.regions.get(id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeofenceRegion> {
        self.regions.values()
    }

    /// Crossings implied by moving to `point`, given the regions currently occupied.
    ///
    /// `inside` is updated in place. Results are sorted by region id so callers
    /// see a deterministic order.
    pub fn transitions(
        &self,
        inside: &mut HashSet<String>,
        point: &Coordinate,
    ) -> Vec<(String, RegionTransition)> {
        let mut crossings = Vec::new();

        for region in self.regions.values() {
            let now_inside = region.contains(point);
            let was_inside = inside.contains(&region.id);

            if now_inside && !was_inside {
                inside.insert(region.id.clone());
                crossings.push((region.id.clone(), RegionTransition::Enter));
            } else if !now_inside && was_inside {
                inside.remove(&region.id);
                crossings.push((region.id.clone(), RegionTransition::Exit));
            }
        }

        crossings.sort_by(|a, b| a.0.cmp(&b.0));
        crossings
    }
}
