use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::Language;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub sensor_api_base: String,
    pub chat_completions_url: String,
    pub weather_url: String,
    pub sheets_api_base: String,
    pub model: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            sensor_api_base: "https://api.nidopro.com".to_string(),
            chat_completions_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            weather_url: "http://api.openweathermap.org/data/2.5/weather".to_string(),
            sheets_api_base: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            model: "deepseek/deepseek-r1-distill-llama-70b:free".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff_ms: 300,
            statuses: vec![500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn sanitize(&mut self) {
        self.max_attempts = self.max_attempts.clamp(1, 10);
        self.initial_backoff_ms = self.initial_backoff_ms.min(10_000);
        self.statuses.retain(|status| (500..=599).contains(status));
        self.statuses.sort_unstable();
        self.statuses.dedup();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub endpoints: EndpointConfig,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    pub cache_ttl_ms: u64,
    #[serde(default = "default_session_idle_ms")]
    pub session_idle_ms: u64,
    pub min_limit: u32,
    pub max_limit: u32,
    pub default_limit: u32,
    pub default_language: Language,
    pub default_from_date: NaiveDate,
}

fn default_session_idle_ms() -> u64 {
    8 * 60 * 60 * 1_000
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            request_timeout_ms: 30_000,
            retry: RetryConfig::default(),
            cache_ttl_ms: 300_000,
            session_idle_ms: default_session_idle_ms(),
            min_limit: 25,
            max_limit: 1_000,
            default_limit: 100,
            default_language: Language::English,
            default_from_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
        }
    }
}

impl DashboardConfig {
    pub fn sanitize(&mut self) {
        self.request_timeout_ms = self.request_timeout_ms.clamp(1_000, 120_000);
        self.cache_ttl_ms = self.cache_ttl_ms.min(86_400_000);
        self.session_idle_ms = self.session_idle_ms.clamp(60_000, 7 * 86_400_000);
        if self.min_limit == 0 {
            self.min_limit = 1;
        }
        if self.max_limit < self.min_limit {
            self.max_limit = self.min_limit;
        }
        self.default_limit = self.default_limit.clamp(self.min_limit, self.max_limit);
        self.retry.sanitize();
    }

    pub fn limit_in_range(&self, limit: u32) -> bool {
        (self.min_limit..=self.max_limit).contains(&limit)
    }
}
