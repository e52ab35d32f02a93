use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const API_WINDOW: Duration = Duration::from_secs(60);
pub const API_MAX_REQUESTS: u32 = 3000;

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub enum RateLimitType {
    Api,
}

impl RateLimitType {
    pub fn get_max_attempts(&self) -> u32 {
        match self {
            Self::Api => API_MAX_REQUESTS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitCheck {
    pub current_attempts: u32,
    pub is_locked: bool,
}

impl RateLimitCheck {
    pub fn new(attempts: u32, limit_type: RateLimitType) -> Self {
        Self {
            current_attempts: attempts,
            is_locked: attempts >= limit_type.get_max_attempts(),
        }
    }
}

pub fn get_rate_limit_key(limit_type: RateLimitType, identifier: &str) -> String {
    format!(
        "rate_limit:{}:{}",
        match limit_type {
            RateLimitType::Api => "api",
        },
        identifier
    )
}
