use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Simulated latencies used by the booking flow and the consultation room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowTimings {
    pub submit_delay: Duration,
    pub success_redirect_delay: Duration,
    pub connect_delay: Duration,
    pub reply_delay_min: Duration,
    pub reply_delay_max: Duration,
    pub end_redirect_delay: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            submit_delay: Duration::from_millis(1500),
            success_redirect_delay: Duration::from_secs(2),
            connect_delay: Duration::from_secs(2),
            reply_delay_min: Duration::from_secs(1),
            reply_delay_max: Duration::from_secs(3),
            end_redirect_delay: Duration::from_secs(2),
        }
    }
}

impl FlowTimings {
    /// Random delay within `[reply_delay_min, reply_delay_max]`.
    pub fn reply_delay(&self) -> Duration {
        if self.reply_delay_max <= self.reply_delay_min {
            return self.reply_delay_min;
        }
        let min = self.reply_delay_min.as_millis() as u64;
        let max = self.reply_delay_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Where a finished flow sends the user next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    Home,
    MyConsultations,
}
