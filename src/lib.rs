//! Recommendation engine for the song-sampling graph.
//!
//! Songs are linked by "A is sampled by B" edges. An implicit-feedback ALS
//! model is fitted over those edges and used to recommend, for every song,
//! other songs it is likely to sample but does not sample yet.

pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
