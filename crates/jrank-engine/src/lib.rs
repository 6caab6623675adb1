//! JRank criteria engine.
//!
//! Scores social engagement events against admin-authored engagement criteria and
//! decides badge eligibility from cumulative activity metrics. The evaluation core in
//! [`criteria`] is a pure function of a catalog snapshot, a fact, and an injected
//! clock; the surrounding modules provide configuration, telemetry, and the
//! caller-side service and HTTP plumbing.

pub mod config;
pub mod criteria;
pub mod error;
pub mod telemetry;
