//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Synthetic telemetry module exports and shared types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Synthetic telemetry for the HEMS mock.
//!
//! [`RangeValidator`] turns raw history parameters into a bounded
//! [`GenerationPlan`], [`SeriesGenerator`] fills the plan with a cumulative
//! random walk and [`LiveFeed`] advances the running state pushed to live
//! clients. All of them draw from one [`SharedRng`].

pub mod feed;
pub mod range;
pub mod rng;
pub mod series;

pub use feed::{LiveFeed, LiveReading};
pub use range::{DateField, GenerationPlan, RangeValidator, ValidationError};
pub use rng::SharedRng;
pub use series::{SeriesGenerator, SeriesKind};
