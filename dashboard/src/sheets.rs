use std::collections::BTreeMap;

use envmon_common::{rows_to_profiles, DeviceProfile, RequestCounter};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::SheetSecrets,
    error::ApiError,
    http::{Auth, HttpClient},
};

const ACTION: &str = "while loading device profiles";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct ProfileSheet {
    http: HttpClient,
    base_url: String,
    sheet_id: String,
    range: String,
    api_key: String,
}

impl ProfileSheet {
    pub fn new(http: HttpClient, base_url: impl Into<String>, secrets: &SheetSecrets) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            sheet_id: secrets.sheet_id.clone(),
            range: secrets.range.clone(),
            api_key: secrets.api_key.clone(),
        }
    }

    fn values_url(&self) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| ApiError::BadEndpoint(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::BadEndpoint(self.base_url.clone()))?
            .pop_if_empty()
            .extend([self.sheet_id.as_str(), "values", self.range.as_str()]);
        Ok(url)
    }

    pub async fn load(
        &self,
        counter: &RequestCounter,
    ) -> Result<BTreeMap<String, DeviceProfile>, ApiError> {
        let url = self.values_url()?;
        let response = self
            .http
            .get(
                url.as_str(),
                Auth::None,
                &[("key", self.api_key.clone())],
                counter,
            )
            .await
            .map_err(|err| ApiError::transport(ACTION, err))?;

        if response.status != StatusCode::OK {
            warn!(status = %response.status, "profile sheet request failed");
            return Err(ApiError::Upstream(format!(
                "Error loading device profiles: {} - {}",
                response.status.as_u16(),
                response.body
            )));
        }

        let range: ValueRange = response
            .json()
            .map_err(|err| ApiError::decode(ACTION, err))?;
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        let profiles = rows_to_profiles(&rows);
        info!(profiles = profiles.len(), "device profiles loaded");
        Ok(profiles)
    }
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
