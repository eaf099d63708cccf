//! KubePark: an amusement park run by a control loop inside a cluster.
//!
//! The park process owns the ledger and creates guest workloads; attraction
//! processes register with it and take payments through it. Everything talks
//! over HTTP. See `park`, `attraction`, and `guest` for the three processes.

pub mod attraction;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod discovery;
pub mod economy;
pub mod error;
pub mod event;
pub mod guest;
pub mod ledger;
pub mod orchestrator;
pub mod park;
pub mod park_api;
pub mod reconcile;
pub mod rng;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod types;
pub mod wire;
