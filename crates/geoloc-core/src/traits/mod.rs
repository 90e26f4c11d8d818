//! Core traits for the geolocation system
//!
//! - [`GeoProvider`]: Look up one IP against one third-party service

pub mod provider;

pub use provider::{GeoProvider, GeoProviderFactory, ProviderOutcome};
