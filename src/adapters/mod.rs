// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Adapter module - host engine interfaces and simulations

mod manager;
mod simulator;
mod traits;

pub use manager::{AdapterHealth, AdapterManager};
pub use simulator::{SimulatedHistory, SimulatedSource};
pub use traits::{
    AdapterEvent, AdapterKind, AnchoredSource, Channel, EventSource, HealthSample, MetricCategory, SamplePage,
    SampleType, SourceStatus,
};
