//! Application state management.

use std::sync::Arc;
use std::time::Instant;

use crate::service::TemplateService;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// The request pipeline
    pub service: Arc<TemplateService>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: Arc<TemplateService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
