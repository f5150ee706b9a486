use config::Config;
use std::time::Duration;

pub mod config;
pub mod logging;

// Service-level state shared by all routes.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config) -> Self {
        Self { config: app_config }
    }

    /// Idle interval after which event streams emit a keep-alive comment.
    /// `None` when keep-alive is disabled.
    pub fn keep_alive(&self) -> Option<Duration> {
        match self.config.keep_alive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Delay between two events of the built-in demonstration streams.
    pub fn event_interval(&self) -> Duration {
        Duration::from_millis(self.config.event_interval_ms)
    }
}
