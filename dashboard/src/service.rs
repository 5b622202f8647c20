use std::{collections::BTreeMap, time::Duration};

use envmon_common::{
    normalize,
    prompt::{analysis_messages, chat_messages},
    ChatTopic, DashboardConfig, DeviceProfile, ReadingRecord, ReadingRow, ReadingTable, Session,
    TtlCache, WeatherContext, WeatherSnapshot,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    ai::{ChatClient, CompletionKind},
    config::Secrets,
    error::ApiError,
    http::{HttpClient, RetryPolicy},
    sensor_api::{ReadingQuery, SensorApi},
    sheets::ProfileSheet,
    weather::WeatherApi,
};

pub const NO_DATA_MESSAGE: &str = "No data available for the specified date range.";
pub const NO_LOCATION_WARNING: &str =
    "No farm location set; analysis will run without weather data.";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    device_id: String,
    api_key: String,
    query: ReadingQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AnalysisKey {
    api_key: String,
    prompt: String,
}

/// Result of a readings load. Failures leave `table` empty and fill `error`.
#[derive(Debug, Clone, Default)]
pub struct ReadingsOutcome {
    pub table: ReadingTable,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub reading: Option<ReadingRow>,
    pub weather: Option<WeatherSnapshot>,
    pub analysis: Option<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub enum WeatherRequest {
    #[default]
    Skip,
    ProfileLocation,
    At(String),
}

/// Every outbound capability of the dashboard, plus the memo tables in front
/// of the sensor fetch and the AI analysis.
pub struct Dashboard {
    config: DashboardConfig,
    sensors: SensorApi,
    weather: WeatherApi,
    chat: ChatClient,
    profiles: Option<ProfileSheet>,
    server_ai_key: String,
    readings: Mutex<TtlCache<FetchKey, Vec<ReadingRecord>>>,
    analyses: Mutex<TtlCache<AnalysisKey, String>>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig, secrets: Secrets) -> Result<Self, reqwest::Error> {
        let http = HttpClient::new(
            Duration::from_millis(config.request_timeout_ms),
            RetryPolicy::from_config(&config.retry),
        )?;
        let endpoints = &config.endpoints;

        let profiles = secrets.sheets.as_ref().map(|sheet| {
            ProfileSheet::new(http.clone(), endpoints.sheets_api_base.clone(), sheet)
        });

        Ok(Self {
            sensors: SensorApi::new(http.clone(), endpoints.sensor_api_base.clone()),
            weather: WeatherApi::new(
                http.clone(),
                endpoints.weather_url.clone(),
                secrets.openweathermap_api_key,
            ),
            chat: ChatClient::new(
                http,
                endpoints.chat_completions_url.clone(),
                endpoints.model.clone(),
            ),
            profiles,
            server_ai_key: secrets.openrouter_api_key,
            readings: Mutex::new(TtlCache::new(config.cache_ttl_ms)),
            analyses: Mutex::new(TtlCache::new(config.cache_ttl_ms)),
            config,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn profiles_configured(&self) -> bool {
        self.profiles.is_some()
    }

    fn ai_key<'a>(&'a self, session: &'a Session) -> &'a str {
        session
            .credentials()
            .ai_api_key
            .as_deref()
            .unwrap_or(&self.server_ai_key)
    }

    async fn fetch_records(
        &self,
        session: &Session,
        query: &ReadingQuery,
        now_ms: u64,
    ) -> Result<Vec<ReadingRecord>, ApiError> {
        let credentials = session.credentials();
        let key = FetchKey {
            device_id: credentials.device_id.clone(),
            api_key: credentials.sensor_api_key.clone(),
            query: query.clone(),
        };

        if let Some(records) = self.readings.lock().await.get(&key, now_ms) {
            debug!(device_id = %key.device_id, "sensor data served from cache");
            return Ok(records);
        }

        let records = self
            .sensors
            .fetch(credentials, query, session.requests())
            .await?;
        self.readings
            .lock()
            .await
            .insert(key, records.clone(), now_ms);
        Ok(records)
    }

    pub async fn load_readings(
        &self,
        session: &Session,
        query: &ReadingQuery,
        now_ms: u64,
    ) -> ReadingsOutcome {
        match self.fetch_records(session, query, now_ms).await {
            Ok(records) => ReadingsOutcome {
                table: normalize(records, query.from),
                error: None,
            },
            Err(err) => {
                warn!(device_id = %session.device_id(), "readings unavailable: {err}");
                ReadingsOutcome {
                    table: ReadingTable::default(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    pub async fn analyze(
        &self,
        session: &Session,
        record: &ReadingRecord,
        weather: Option<WeatherContext<'_>>,
        now_ms: u64,
    ) -> Result<String, ApiError> {
        let messages = analysis_messages(record, session.language(), weather);
        let key = AnalysisKey {
            api_key: self.ai_key(session).to_string(),
            prompt: messages
                .iter()
                .map(|message| message.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };

        if let Some(analysis) = self.analyses.lock().await.get(&key, now_ms) {
            debug!("analysis served from cache");
            return Ok(analysis);
        }

        let analysis = self
            .chat
            .complete(
                &key.api_key,
                &messages,
                CompletionKind::Analysis,
                session.requests(),
            )
            .await?;
        self.analyses
            .lock()
            .await
            .insert(key, analysis.clone(), now_ms);
        Ok(analysis)
    }

    /// Fetches the range, picks the newest row and analyzes it. A weather
    /// failure degrades to a weather-less prompt plus a warning.
    pub async fn analyze_latest(
        &self,
        session: &Session,
        query: &ReadingQuery,
        weather: WeatherRequest,
        now_ms: u64,
    ) -> AnalysisOutcome {
        let mut outcome = AnalysisOutcome::default();

        let readings = self.load_readings(session, query, now_ms).await;
        if let Some(error) = readings.error {
            outcome.error = Some(error);
            return outcome;
        }
        let Some(latest) = readings.table.latest().cloned() else {
            outcome.error = Some(NO_DATA_MESSAGE.to_string());
            return outcome;
        };

        let location = match weather {
            WeatherRequest::Skip => None,
            WeatherRequest::At(location) => Some(location),
            WeatherRequest::ProfileLocation => Some(
                session
                    .profile()
                    .map(|profile| profile.location.clone())
                    .unwrap_or_default(),
            ),
        };
        let location = match location.map(|location| location.trim().to_string()) {
            Some(location) if location.is_empty() => {
                outcome.warnings.push(NO_LOCATION_WARNING.to_string());
                None
            }
            other => other,
        };

        if let Some(location) = &location {
            match self.weather.current(location, session.requests()).await {
                Ok(snapshot) => outcome.weather = Some(snapshot),
                Err(err) => {
                    warn!("analysis continues without weather: {err}");
                    outcome.warnings.push(err.to_string());
                }
            }
        }

        let context = outcome
            .weather
            .as_ref()
            .zip(location.as_deref())
            .map(|(snapshot, location)| WeatherContext { snapshot, location });

        match self.analyze(session, &latest.record, context, now_ms).await {
            Ok(analysis) => outcome.analysis = Some(analysis),
            Err(err) => {
                warn!(device_id = %session.device_id(), "analysis unavailable: {err}");
                outcome.error = Some(err.to_string());
            }
        }
        outcome.reading = Some(latest);
        outcome
    }

    /// Topic-constrained chat. Bad input is rejected before any request.
    pub async fn chat(
        &self,
        session: &Session,
        topic_key: &str,
        question: &str,
    ) -> Result<String, ApiError> {
        let topic: ChatTopic = topic_key.parse()?;
        if question.trim().is_empty() {
            return Err(ApiError::EmptyQuestion);
        }

        info!(topic = topic.key(), "chat question submitted");
        self.chat
            .complete(
                self.ai_key(session),
                &chat_messages(topic, question),
                CompletionKind::Chat,
                session.requests(),
            )
            .await
    }

    pub async fn current_weather(
        &self,
        session: &Session,
        location: &str,
    ) -> Result<WeatherSnapshot, ApiError> {
        self.weather.current(location, session.requests()).await
    }

    pub async fn sync_profiles(
        &self,
        session: &Session,
    ) -> Result<BTreeMap<String, DeviceProfile>, ApiError> {
        let sheet = self.profiles.as_ref().ok_or(ApiError::ProfilesUnavailable)?;
        sheet.load(session.requests()).await
    }
}
