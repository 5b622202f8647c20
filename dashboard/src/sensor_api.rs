use chrono::NaiveDate;
use envmon_common::{Credentials, ReadingRecord, RequestCounter};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::ApiError,
    http::{Auth, HttpClient, HttpResponse},
};

const ACTION: &str = "while fetching sensor data";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadingQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Left out of the request when absent; the server picks its own default.
    pub limit: Option<u32>,
}

impl ReadingQuery {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("from", self.from.format("%Y-%m-%d").to_string()),
            ("to", self.to.format("%Y-%m-%d").to_string()),
        ];
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Option<Vec<ReadingRecord>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SensorApi {
    http: HttpClient,
    base_url: String,
}

impl SensorApi {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn data_url(&self, device_id: &str) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| ApiError::BadEndpoint(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::BadEndpoint(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["rest", "v1", "devices", device_id, "data"]);
        Ok(url)
    }

    pub async fn fetch(
        &self,
        credentials: &Credentials,
        query: &ReadingQuery,
        counter: &RequestCounter,
    ) -> Result<Vec<ReadingRecord>, ApiError> {
        let url = self.data_url(&credentials.device_id)?;
        let response = self
            .http
            .get(
                url.as_str(),
                Auth::ApiKeyHeader(&credentials.sensor_api_key),
                &query.query_pairs(),
                counter,
            )
            .await
            .map_err(|err| ApiError::transport(ACTION, err))?;

        let records = interpret(response)?;
        info!(
            device_id = %credentials.device_id,
            records = records.len(),
            "sensor data fetched"
        );
        Ok(records)
    }
}

fn interpret(response: HttpResponse) -> Result<Vec<ReadingRecord>, ApiError> {
    let (label, fallback) = match response.status {
        StatusCode::OK => {
            let envelope: DataEnvelope = response
                .json()
                .map_err(|err| ApiError::decode(ACTION, err))?;
            return Ok(envelope.data.unwrap_or_default());
        }
        StatusCode::BAD_REQUEST => ("Bad Request", "Unknown error"),
        StatusCode::UNAUTHORIZED => ("Unauthorized", "Invalid API Key"),
        StatusCode::NOT_FOUND => ("Not Found", "Device not found"),
        status => {
            warn!(%status, "sensor API returned unexpected status");
            return Err(ApiError::Upstream(format!(
                "Error fetching sensor data: {} - {}",
                status.as_u16(),
                response.body
            )));
        }
    };

    let detail = response
        .json::<ErrorEnvelope>()
        .unwrap_or_default()
        .errors
        .into_iter()
        .next()
        .and_then(|item| item.detail)
        .unwrap_or_else(|| fallback.to_string());

    warn!(status = %response.status, "sensor API rejected request: {detail}");
    Err(ApiError::Upstream(format!("{label}: {detail}")))
}
