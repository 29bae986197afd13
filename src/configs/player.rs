use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybackConfig {
    /// Consecutive start failures tolerated before the session gives up
    /// and reverts to idle with the remaining queue intact.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Seconds an interactive search prompt stays selectable.
    #[serde(default = "default_select_timeout_secs")]
    pub select_timeout_secs: u64,
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_select_timeout_secs() -> u64 {
    30
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            select_timeout_secs: default_select_timeout_secs(),
        }
    }
}
