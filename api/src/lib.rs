pub mod auth;
pub mod config;
pub mod metrics;

use std::sync::Arc;

use nimbus_core::platform::MiningPlatform;

/// Shared handler state: the platform service plus a few display fields.
#[derive(Clone)]
pub struct ApiState {
    pub platform: Arc<MiningPlatform>,
    pub start_time: i64,
    pub listen: String,
}
