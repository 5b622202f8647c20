use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::Router;
use envmon_common::{Credentials, DashboardConfig, Language, Session};
use tokio::net::TcpListener;

use crate::{config::Secrets, service::Dashboard};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Clone, Default)]
pub struct HitCounter(Arc<AtomicUsize>);

impl HitCounter {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn config_for(base: &str) -> DashboardConfig {
    let mut config = DashboardConfig::default();
    config.endpoints.sensor_api_base = base.to_string();
    config.endpoints.chat_completions_url = format!("{base}/api/v1/chat/completions");
    config.endpoints.weather_url = format!("{base}/data/2.5/weather");
    config.endpoints.sheets_api_base = format!("{base}/v4/spreadsheets");
    config.request_timeout_ms = 5_000;
    config.retry.initial_backoff_ms = 1;
    config
}

pub fn test_secrets() -> Secrets {
    Secrets {
        openrouter_api_key: "server-ai-key".to_string(),
        openweathermap_api_key: "weather-key".to_string(),
        sheets: None,
    }
}

pub fn test_dashboard(base: &str) -> Dashboard {
    Dashboard::new(config_for(base), test_secrets()).unwrap()
}

pub fn test_session() -> Session {
    Session::new(
        Credentials {
            device_id: "dev-1".to_string(),
            sensor_api_key: "sensor-key".to_string(),
            ai_api_key: None,
        },
        Language::English,
        0,
    )
}
