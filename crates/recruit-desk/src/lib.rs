//! Recruiting back office: application evaluation, result notifications and job scoring
//! configuration.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
