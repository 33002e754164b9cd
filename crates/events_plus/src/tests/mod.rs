//! Cross-module tests for the binding core
//!
//! - Authoring scenarios: requests, predefined calls and direct delegates end to end
//! - Lifecycle: initialization order, teardown and retagging
//! - Persistence: authored forms and configuration loaded from disk

#[cfg(test)]
pub mod fixtures;

#[cfg(test)]
pub mod scenario_test;

#[cfg(test)]
pub mod lifecycle_test;
