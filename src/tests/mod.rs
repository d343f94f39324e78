//! API-level tests for the LockerZ backend.
//!
//! - **api_tests**: library endpoints through the full router
//! - **error_tests**: error mapping and JSON error bodies
//! - **health_api_tests**: liveness, readiness, metrics and version
//!
//! Unit tests live next to the code in each module.
