use envmon_common::{RequestCounter, WeatherSnapshot};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::ApiError,
    http::{Auth, HttpClient},
};

const ACTION: &str = "while fetching weather data";

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainBlock,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Clone)]
pub struct WeatherApi {
    http: HttpClient,
    url: String,
    api_key: String,
}

impl WeatherApi {
    pub fn new(http: HttpClient, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn current(
        &self,
        location: &str,
        counter: &RequestCounter,
    ) -> Result<WeatherSnapshot, ApiError> {
        let location = location.trim();
        let query = [
            ("q", location.to_string()),
            ("appid", self.api_key.clone()),
            ("units", "metric".to_string()),
        ];

        let response = self
            .http
            .get(&self.url, Auth::None, &query, counter)
            .await
            .map_err(|err| ApiError::transport(ACTION, err))?;

        match response.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                warn!("weather lookup found no location '{location}'");
                return Err(ApiError::UnknownLocation(location.to_string()));
            }
            status => {
                warn!(%status, "weather API returned unexpected status");
                return Err(ApiError::Upstream(format!(
                    "Error fetching weather data: {} - {}",
                    status.as_u16(),
                    response.body
                )));
            }
        }

        let payload: CurrentWeather = response
            .json()
            .map_err(|err| ApiError::decode(ACTION, err))?;
        let description = payload
            .weather
            .into_iter()
            .next()
            .map(|condition| condition.description)
            .unwrap_or_default();

        info!("weather for '{location}': {:.1} °C", payload.main.temp);
        Ok(WeatherSnapshot {
            temperature_c: payload.main.temp,
            description,
        })
    }
}
