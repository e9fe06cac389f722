//! Shared domain models and processing infrastructure.
//!
//! This module centralizes the building blocks used across the engine:
//! the message/annotation wire model, the model catalog types, provider
//! interfaces, the pattern matcher, rolling interval counters, and the
//! processing-time annotator.

pub mod annotator;
pub mod config;
pub mod interface;
pub mod interval_counters;
pub mod model;
pub mod pattern;
