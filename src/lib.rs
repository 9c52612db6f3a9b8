//! Hypergraph visualization engine: hyperedge hull regions, background
//! force-directed layout, viewport culling, an incremental data cache and
//! query path playback.

pub mod animation;
pub mod cache;
pub mod config;
pub mod culling;
pub mod hull;
pub mod interchange;
pub mod layout;
pub mod model;
pub mod provider;
