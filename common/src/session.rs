use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::types::{DeviceProfile, Language};

/// Count of successful upstream calls. Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter(Arc<AtomicU64>);

impl RequestCounter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub device_id: String,
    pub sensor_api_key: String,
    /// Falls back to the server's configured key when absent.
    pub ai_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .field("sensor_api_key", &"<redacted>")
            .field(
                "ai_api_key",
                &self.ai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Everything one logged-in user carries. Dropping it is logout.
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
    language: Language,
    requests: RequestCounter,
    profiles: HashMap<String, DeviceProfile>,
    created_ms: u64,
    last_seen_ms: u64,
}

impl Session {
    pub fn new(credentials: Credentials, language: Language, now_ms: u64) -> Self {
        Self {
            credentials,
            language,
            requests: RequestCounter::default(),
            profiles: HashMap::new(),
            created_ms: now_ms,
            last_seen_ms: now_ms,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn device_id(&self) -> &str {
        &self.credentials.device_id
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn requests(&self) -> &RequestCounter {
        &self.requests
    }

    pub fn request_count(&self) -> u64 {
        self.requests.get()
    }

    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = self.last_seen_ms.max(now_ms);
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }

    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.profiles.get(self.device_id())
    }

    /// Stores a profile; an empty device id is taken to mean the session's device.
    pub fn set_profile(&mut self, mut profile: DeviceProfile) {
        if profile.device_id.trim().is_empty() {
            profile.device_id = self.credentials.device_id.clone();
        }
        self.profiles.insert(profile.device_id.clone(), profile);
    }

    pub fn merge_profiles(&mut self, profiles: impl IntoIterator<Item = (String, DeviceProfile)>) {
        self.profiles.extend(profiles);
    }
}
