use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Instant,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use uuid::Uuid;

use envmon_common::{
    ChartPoint, ChatTopic, Credentials, DashboardConfig, DeviceProfile, Language, Metric,
    MetricCard, ParseError, ReadingRow, Session, WeatherSnapshot,
};

use crate::{
    config::{config_path, load_config, Secrets},
    sensor_api::ReadingQuery,
    service::{Dashboard, WeatherRequest, NO_DATA_MESSAGE},
    session::SessionStore,
};

const SESSION_HEADER: &str = "x-session-token";
const LOGIN_WARNING: &str =
    "Please enter your Device ID, Nidopro API Key, and OpenRouter API Key to proceed.";

#[derive(Clone)]
struct AppState {
    dashboard: Arc<Dashboard>,
    sessions: SessionStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(rename = "deviceId", default)]
    device_id: String,
    #[serde(rename = "sensorApiKey", default)]
    sensor_api_key: String,
    #[serde(rename = "aiApiKey", default)]
    ai_api_key: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: Uuid,
    session: SessionView,
}

#[derive(Debug, Serialize)]
struct QueryDefaults {
    from: NaiveDate,
    #[serde(rename = "limitMin")]
    limit_min: u32,
    #[serde(rename = "limitMax")]
    limit_max: u32,
    #[serde(rename = "limitDefault")]
    limit_default: u32,
}

#[derive(Debug, Serialize)]
struct SessionView {
    #[serde(rename = "deviceId")]
    device_id: String,
    language: Language,
    #[serde(rename = "languageName")]
    language_name: &'static str,
    #[serde(rename = "requestCount")]
    request_count: u64,
    profile: Option<DeviceProfile>,
    #[serde(rename = "profileSyncAvailable")]
    profile_sync_available: bool,
    defaults: QueryDefaults,
}

#[derive(Debug, Deserialize)]
struct LanguageUpdate {
    language: String,
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    from: Option<String>,
    to: Option<String>,
    limit: Option<String>,
    metrics: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReadingsView {
    rows: Vec<ReadingRow>,
    cards: Vec<MetricCard>,
    chart: Vec<ChartPoint>,
    #[serde(rename = "synthesizedTimestamps")]
    synthesized_timestamps: bool,
    warning: Option<String>,
    error: Option<String>,
    #[serde(rename = "requestCount")]
    request_count: u64,
}

#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    #[serde(rename = "includeWeather", default)]
    include_weather: bool,
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalysisView {
    reading: Option<ReadingRow>,
    weather: Option<WeatherSnapshot>,
    analysis: Option<String>,
    warnings: Vec<String>,
    error: Option<String>,
    #[serde(rename = "requestCount")]
    request_count: u64,
}

#[derive(Debug, Serialize)]
struct TopicView {
    key: &'static str,
    name: &'static str,
    focus: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    topic: String,
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize)]
struct ChatView {
    reply: Option<String>,
    error: Option<String>,
    #[serde(rename = "requestCount")]
    request_count: u64,
}

#[derive(Debug, Serialize)]
struct WeatherView {
    location: String,
    weather: Option<WeatherSnapshot>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProfileSyncView {
    profile: Option<DeviceProfile>,
    #[serde(rename = "profilesLoaded")]
    profiles_loaded: usize,
    warning: Option<String>,
    error: Option<String>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            warn!("failed to read .env file: {err}");
        }
    }

    let path = config_path();
    let config = load_config(path.clone())
        .await
        .with_context(|| format!("failed to load dashboard config from {}", path.display()))?;
    let secrets = Secrets::from_env().context("dashboard cannot start")?;
    if secrets.sheets.is_none() {
        info!("profile spreadsheet not configured; profile sync disabled");
    }

    let sessions = SessionStore::new(config.session_idle_ms);
    let dashboard = Dashboard::new(config, secrets).context("failed to build HTTP client")?;
    let app_state = AppState {
        dashboard: Arc::new(dashboard),
        sessions,
    };

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = router(app_state).fallback_service(ServeDir::new(web_root));

    let port = std::env::var("DASHBOARD_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind dashboard server at {addr}"))?;

    info!("dashboard listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/session", get(handle_get_session))
        .route("/api/language", put(handle_put_language))
        .route("/api/readings", get(handle_get_readings))
        .route("/api/analysis", post(handle_post_analysis))
        .route("/api/chat/topics", get(handle_get_topics))
        .route("/api/chat", post(handle_post_chat))
        .route("/api/weather", get(handle_get_weather))
        .route(
            "/api/profile",
            get(handle_get_profile).put(handle_put_profile),
        )
        .route("/api/profile/sync", post(handle_sync_profile))
        .with_state(app_state)
}

async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let device_id = request.device_id.trim();
    let sensor_api_key = request.sensor_api_key.trim();
    if device_id.is_empty() || sensor_api_key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, LOGIN_WARNING);
    }

    let language = match request.language.as_deref() {
        Some(value) => match value.parse::<Language>() {
            Ok(language) => language,
            Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        },
        None => state.dashboard.config().default_language,
    };

    let credentials = Credentials {
        device_id: device_id.to_string(),
        sensor_api_key: sensor_api_key.to_string(),
        ai_api_key: request
            .ai_api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty()),
    };
    let now_ms = monotonic_ms();
    let session = Session::new(credentials, language, now_ms);
    let view = session_view(&state, &session);
    let token = state.sessions.create(session, now_ms).await;
    let active = state.sessions.len().await;

    info!(device_id = %view.device_id, active, "session started");
    Json(LoginResponse {
        token,
        session: view,
    })
    .into_response()
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(token) = session_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "Not logged in");
    };

    match state.sessions.remove(&token).await {
        Some(session) => {
            let age_ms = monotonic_ms().saturating_sub(session.created_ms());
            info!(device_id = %session.device_id(), age_ms, "session ended");
            StatusCode::NO_CONTENT.into_response()
        }
        None => error_response(StatusCode::UNAUTHORIZED, "Not logged in"),
    }
}

async fn handle_get_session(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (_, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    Json(session_view(&state, &session)).into_response()
}

async fn handle_put_language(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<LanguageUpdate>,
) -> impl IntoResponse {
    let (token, _) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };
    let language = match update.language.parse::<Language>() {
        Ok(language) => language,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let updated = state
        .sessions
        .update(&token, |session| {
            session.set_language(language);
            session.clone()
        })
        .await;

    match updated {
        Some(session) => Json(session_view(&state, &session)).into_response(),
        None => error_response(StatusCode::UNAUTHORIZED, "Not logged in"),
    }
}

async fn handle_get_readings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RangeParams>,
) -> impl IntoResponse {
    let (_, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let config = state.dashboard.config();
    let limit = match params.limit.as_deref().map(str::parse::<u32>).transpose() {
        Ok(limit) => limit,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, &limit_message(config)),
    };
    let query = match reading_query(
        config,
        params.from.as_deref(),
        params.to.as_deref(),
        limit,
    ) {
        Ok(query) => query,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };
    let metrics = match chart_metrics(params.metrics.as_deref()) {
        Ok(metrics) => metrics,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let outcome = state
        .dashboard
        .load_readings(&session, &query, monotonic_ms())
        .await;
    let table = outcome.table;
    let warning = (outcome.error.is_none() && table.is_empty()).then(|| NO_DATA_MESSAGE.to_string());

    Json(ReadingsView {
        cards: table.latest_cards(),
        chart: table.chart_view(&metrics),
        synthesized_timestamps: table.has_synthesized_timestamps(),
        rows: table.rows().to_vec(),
        warning,
        error: outcome.error,
        request_count: session.request_count(),
    })
    .into_response()
}

async fn handle_post_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalysisRequest>,
) -> impl IntoResponse {
    let (_, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let query = match reading_query(
        state.dashboard.config(),
        request.from.as_deref(),
        request.to.as_deref(),
        request.limit,
    ) {
        Ok(query) => query,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    let location = request
        .location
        .filter(|location| !location.trim().is_empty());
    let weather = match (request.include_weather, location) {
        (false, _) => WeatherRequest::Skip,
        (true, Some(location)) => WeatherRequest::At(location),
        (true, None) => WeatherRequest::ProfileLocation,
    };

    let outcome = state
        .dashboard
        .analyze_latest(&session, &query, weather, monotonic_ms())
        .await;

    Json(AnalysisView {
        reading: outcome.reading,
        weather: outcome.weather,
        analysis: outcome.analysis,
        warnings: outcome.warnings,
        error: outcome.error,
        request_count: session.request_count(),
    })
    .into_response()
}

async fn handle_get_topics() -> impl IntoResponse {
    let topics: Vec<TopicView> = ChatTopic::ALL
        .into_iter()
        .map(|topic| TopicView {
            key: topic.key(),
            name: topic.display_name(),
            focus: topic.focus(),
        })
        .collect();
    Json(topics)
}

async fn handle_post_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let (_, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let (reply, error) = match state
        .dashboard
        .chat(&session, &request.topic, &request.question)
        .await
    {
        Ok(reply) => (Some(reply), None),
        Err(err) if err.is_invalid_request() => {
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
        Err(err) => {
            warn!(device_id = %session.device_id(), "chat failed: {err}");
            (None, Some(err.to_string()))
        }
    };

    Json(ChatView {
        reply,
        error,
        request_count: session.request_count(),
    })
    .into_response()
}

async fn handle_get_weather(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let (_, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let location = params
        .get("location")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            session
                .profile()
                .map(|profile| profile.location.trim().to_string())
                .filter(|value| !value.is_empty())
        });
    let Some(location) = location else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'location' parameter");
    };

    let (weather, error) = match state.dashboard.current_weather(&session, &location).await {
        Ok(snapshot) => (Some(snapshot), None),
        Err(err) => (None, Some(err.to_string())),
    };

    Json(WeatherView {
        location,
        weather,
        error,
    })
    .into_response()
}

async fn handle_get_profile(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (_, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    Json(current_profile(&session)).into_response()
}

async fn handle_put_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut profile): Json<DeviceProfile>,
) -> impl IntoResponse {
    let (token, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    profile.device_id = session.device_id().to_string();
    let stored = state
        .sessions
        .update(&token, |session| {
            session.set_profile(profile);
            current_profile(session)
        })
        .await;

    match stored {
        Some(profile) => Json(profile).into_response(),
        None => error_response(StatusCode::UNAUTHORIZED, "Not logged in"),
    }
}

async fn handle_sync_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (token, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(response) => return response,
    };
    if !state.dashboard.profiles_configured() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Profile spreadsheet is not configured",
        );
    }

    let profiles = match state.dashboard.sync_profiles(&session).await {
        Ok(profiles) => profiles,
        Err(err) => {
            warn!("profile sync failed: {err}");
            return Json(ProfileSyncView {
                profile: session.profile().cloned(),
                profiles_loaded: 0,
                warning: None,
                error: Some(err.to_string()),
            })
            .into_response();
        }
    };

    let profiles_loaded = profiles.len();
    let profile = state
        .sessions
        .update(&token, |session| {
            session.merge_profiles(profiles);
            session.profile().cloned()
        })
        .await
        .flatten();
    let warning = profile
        .is_none()
        .then(|| format!("No profile found for device {}", session.device_id()));

    Json(ProfileSyncView {
        profile,
        profiles_loaded,
        warning,
        error: None,
    })
    .into_response()
}

fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Uuid, Session), axum::response::Response> {
    let token = session_token(headers)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Not logged in"))?;
    let session = state
        .sessions
        .get(&token, monotonic_ms())
        .await
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Not logged in"))?;
    Ok((token, session))
}

fn session_view(state: &AppState, session: &Session) -> SessionView {
    let config = state.dashboard.config();
    SessionView {
        device_id: session.device_id().to_string(),
        language: session.language(),
        language_name: session.language().display_name(),
        request_count: session.request_count(),
        profile: session.profile().cloned(),
        profile_sync_available: state.dashboard.profiles_configured(),
        defaults: QueryDefaults {
            from: config.default_from_date,
            limit_min: config.min_limit,
            limit_max: config.max_limit,
            limit_default: config.default_limit,
        },
    }
}

fn current_profile(session: &Session) -> DeviceProfile {
    session.profile().cloned().unwrap_or_else(|| DeviceProfile {
        device_id: session.device_id().to_string(),
        ..DeviceProfile::default()
    })
}

fn limit_message(config: &DashboardConfig) -> String {
    format!(
        "Invalid limit value ({}-{})",
        config.min_limit, config.max_limit
    )
}

fn reading_query(
    config: &DashboardConfig,
    from: Option<&str>,
    to: Option<&str>,
    limit: Option<u32>,
) -> Result<ReadingQuery, String> {
    let from = match from.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_date(value, "from")?,
        None => config.default_from_date,
    };
    let to = match to.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_date(value, "to")?,
        None => Utc::now().date_naive(),
    };
    if from > to {
        return Err("'from' date must not be after 'to' date".to_string());
    }
    if let Some(limit) = limit {
        if !config.limit_in_range(limit) {
            return Err(limit_message(config));
        }
    }
    Ok(ReadingQuery { from, to, limit })
}

// Comma-separated metric keys; blank means the default chart series.
fn chart_metrics(value: Option<&str>) -> Result<Vec<Metric>, ParseError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(Metric::CHART.to_vec());
    };

    let mut metrics = Vec::new();
    for key in value.split(',').filter(|key| !key.trim().is_empty()) {
        let metric = key.parse::<Metric>()?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    Ok(metrics)
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid '{field}' date (expected YYYY-MM-DD)"))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::Path,
        http::{header::CONTENT_TYPE, Request},
        response::Response,
    };
    use envmon_common::INVALID_TOPIC_MESSAGE;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{spawn_stub, test_dashboard, HitCounter};

    fn app(base: &str) -> Router {
        let dashboard = test_dashboard(base);
        let sessions = SessionStore::new(dashboard.config().session_idle_ms);
        router(AppState {
            dashboard: Arc::new(dashboard),
            sessions,
        })
    }

    fn offline_app() -> Router {
        app("http://127.0.0.1:1")
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(SESSION_HEADER, token);
        }
        let body = match body {
            Some(body) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &Router) -> String {
        let response = send(
            app,
            "POST",
            "/api/login",
            None,
            Some(json!({"deviceId": "dev-1", "sensorApiKey": "sensor-key"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn session_requires_token() {
        let app = offline_app();

        let missing = send(&app, "GET", "/api/session", None, None).await;
        let unknown = send(
            &app,
            "GET",
            "/api/session",
            Some(&Uuid::new_v4().to_string()),
            None,
        )
        .await;

        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn blank_login_is_rejected_with_warning() {
        let app = offline_app();

        let response = send(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({"deviceId": " ", "sensorApiKey": "k"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], json!(LOGIN_WARNING));
    }

    #[tokio::test]
    async fn login_returns_session_view() {
        let app = offline_app();
        let token = login(&app).await;

        let session = body_json(send(&app, "GET", "/api/session", Some(&token), None).await).await;

        assert_eq!(session["deviceId"], json!("dev-1"));
        assert_eq!(session["language"], json!("en"));
        assert_eq!(session["requestCount"], json!(0));
        assert_eq!(session["defaults"]["limitMin"], json!(25));
        assert_eq!(session["defaults"]["from"], json!("2023-01-01"));
    }

    #[tokio::test]
    async fn language_switch_is_validated() {
        let app = offline_app();
        let token = login(&app).await;

        let bad = send(
            &app,
            "PUT",
            "/api/language",
            Some(&token),
            Some(json!({"language": "fr"})),
        )
        .await;
        let good = send(
            &app,
            "PUT",
            "/api/language",
            Some(&token),
            Some(json!({"language": "ms"})),
        )
        .await;

        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(good).await["languageName"], json!("Bahasa Malaysia"));
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected_locally() {
        let app = offline_app();
        let token = login(&app).await;

        let low = send(&app, "GET", "/api/readings?limit=10", Some(&token), None).await;
        let junk = send(&app, "GET", "/api/readings?limit=lots", Some(&token), None).await;

        assert_eq!(low.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(low).await["error"],
            json!("Invalid limit value (25-1000)")
        );
        assert_eq!(junk.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reversed_date_range_is_rejected() {
        let app = offline_app();
        let token = login(&app).await;

        let response = send(
            &app,
            "GET",
            "/api/readings?from=2024-02-01&to=2024-01-01",
            Some(&token),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn readings_are_normalized_and_counted() {
        async fn device_data(
            State(hits): State<HitCounter>,
            Path(_device_id): Path<String>,
        ) -> Json<Value> {
            hits.hit();
            Json(json!({"data": [
                {"EC": 1.2, "pH": 6.5, "airTemp": 29.1, "airHum": 70},
                {"EC": "n/a"}
            ]}))
        }

        let hits = HitCounter::default();
        let stub = Router::new()
            .route("/rest/v1/devices/{device_id}/data", get(device_data))
            .with_state(hits.clone());
        let app = app(&spawn_stub(stub).await);
        let token = login(&app).await;
        let uri = "/api/readings?from=2024-05-01&to=2024-05-02&limit=100";

        let view = body_json(send(&app, "GET", uri, Some(&token), None).await).await;
        send(&app, "GET", uri, Some(&token), None).await;

        assert_eq!(view["rows"].as_array().unwrap().len(), 2);
        assert_eq!(view["chart"].as_array().unwrap().len(), 1);
        assert_eq!(view["synthesizedTimestamps"], json!(true));
        assert_eq!(view["cards"][0]["value"], json!("N/A"));
        assert_eq!(view["requestCount"], json!(1));
        assert_eq!(view["error"], Value::Null);
        assert_eq!(hits.count(), 1);
    }

    #[tokio::test]
    async fn chart_series_follow_the_requested_metrics() {
        async fn device_data(Path(_device_id): Path<String>) -> Json<Value> {
            Json(json!({"data": [
                {"timestamp": "2024-05-01T08:00:00Z", "EC": 1.2, "pH": 6.5},
                {"timestamp": "2024-05-01T09:00:00Z", "EC": 1.4}
            ]}))
        }

        let stub = Router::new().route("/rest/v1/devices/{device_id}/data", get(device_data));
        let app = app(&spawn_stub(stub).await);
        let token = login(&app).await;
        let uri = "/api/readings?from=2024-05-01&to=2024-05-02&metrics=pH,%20ph";

        let view = body_json(send(&app, "GET", uri, Some(&token), None).await).await;

        assert_eq!(view["chart"].as_array().unwrap().len(), 1);
        assert_eq!(view["chart"][0]["values"], json!({"pH": 6.5}));
        assert_eq!(view["rows"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_chart_metric_is_rejected_locally() {
        let app = offline_app();
        let token = login(&app).await;

        let response = send(
            &app,
            "GET",
            "/api/readings?metrics=EC,ozone",
            Some(&token),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            json!("unknown metric 'ozone'")
        );
    }

    #[tokio::test]
    async fn topics_are_public() {
        let app = offline_app();

        let topics = body_json(send(&app, "GET", "/api/chat/topics", None, None).await).await;

        let keys: Vec<&str> = topics
            .as_array()
            .unwrap()
            .iter()
            .map(|topic| topic["key"].as_str().unwrap())
            .collect();
        assert_eq!(
            keys,
            [
                "irrigation",
                "soil_health",
                "pest_control",
                "crop_management",
                "general_agriculture"
            ]
        );
    }

    #[tokio::test]
    async fn unknown_chat_topic_is_bad_request() {
        let app = offline_app();
        let token = login(&app).await;

        let response = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({"topic": "astrology", "question": "Is Mercury retrograde?"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], json!(INVALID_TOPIC_MESSAGE));
    }

    #[tokio::test]
    async fn unreachable_chat_service_is_reported_not_raised() {
        let app = offline_app();
        let token = login(&app).await;

        let response = send(
            &app,
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({"topic": "irrigation", "question": "How often?"})),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(view["reply"], Value::Null);
        assert!(view["error"]
            .as_str()
            .unwrap()
            .starts_with("An error occurred during AI chat"));
    }

    #[tokio::test]
    async fn profile_edits_stay_in_session() {
        let app = offline_app();
        let token = login(&app).await;

        let saved = send(
            &app,
            "PUT",
            "/api/profile",
            Some(&token),
            Some(json!({"deviceId": "someone-else", "location": "Ipoh", "plantType": "Kale"})),
        )
        .await;
        let fetched = body_json(send(&app, "GET", "/api/profile", Some(&token), None).await).await;

        assert_eq!(saved.status(), StatusCode::OK);
        assert_eq!(fetched["deviceId"], json!("dev-1"));
        assert_eq!(fetched["location"], json!("Ipoh"));
    }

    #[tokio::test]
    async fn logout_wipes_session() {
        let app = offline_app();
        let token = login(&app).await;

        let logout = send(&app, "POST", "/api/logout", Some(&token), None).await;
        let after = send(&app, "GET", "/api/profile", Some(&token), None).await;

        assert_eq!(logout.status(), StatusCode::NO_CONTENT);
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_sync_without_sheet_is_unavailable() {
        let app = offline_app();
        let token = login(&app).await;

        let response = send(&app, "POST", "/api/profile/sync", Some(&token), None).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
