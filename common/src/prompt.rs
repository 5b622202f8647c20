use serde::{Deserialize, Serialize};

use crate::{
    topics::ChatTopic,
    types::{Language, Metric, ReadingRecord, WeatherSnapshot},
};

pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are an expert in environmental monitoring and agriculture.";
pub const CHAT_SYSTEM_PROMPT: &str = "You are an expert in agriculture.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WeatherContext<'a> {
    pub snapshot: &'a WeatherSnapshot,
    pub location: &'a str,
}

struct Template {
    intro: &'static str,
    ec: &'static str,
    ph: &'static str,
    water_temp: &'static str,
    air_temp: &'static str,
    air_hum: &'static str,
    weather_heading: &'static str,
    weather_heading_at: &'static str,
    weather_temp: &'static str,
    weather_conditions: &'static str,
    closing: &'static str,
}

const ENGLISH: Template = Template {
    intro: "Analyze the following environmental data and identify any potential problems:",
    ec: "EC (Electrical Conductivity)",
    ph: "pH",
    water_temp: "Water Temperature",
    air_temp: "Air Temperature",
    air_hum: "Air Humidity",
    weather_heading: "Current weather at the farm:",
    weather_heading_at: "Current weather at the farm location",
    weather_temp: "Temperature",
    weather_conditions: "Conditions",
    closing: "Provide recommendations or corrective actions if any issues are detected.",
};

const MALAY: Template = Template {
    intro: "Analisis data persekitaran berikut dan kenal pasti sebarang masalah yang berpotensi:",
    ec: "EC (Kekonduksian Elektrik)",
    ph: "pH",
    water_temp: "Suhu Air",
    air_temp: "Suhu Udara",
    air_hum: "Kelembapan Udara",
    weather_heading: "Cuaca semasa di ladang:",
    weather_heading_at: "Cuaca semasa di lokasi ladang",
    weather_temp: "Suhu",
    weather_conditions: "Keadaan",
    closing: "Berikan cadangan atau tindakan pembetulan jika terdapat sebarang isu. Sila jawab dalam Bahasa Malaysia.",
};

fn template(language: Language) -> &'static Template {
    match language {
        Language::English => &ENGLISH,
        Language::BahasaMalaysia => &MALAY,
    }
}

pub fn analysis_prompt(
    record: &ReadingRecord,
    language: Language,
    weather: Option<WeatherContext<'_>>,
) -> String {
    let t = template(language);
    let value = |metric: Metric| record.measurement(metric).to_string();

    let mut prompt = format!(
        "{intro}\n\
         - {ec}: {ec_value} mS/cm\n\
         - {ph}: {ph_value}\n\
         - {water}: {water_value} °C\n\
         - {air}: {air_value} °C\n\
         - {hum}: {hum_value} %\n\n",
        intro = t.intro,
        ec = t.ec,
        ec_value = value(Metric::Ec),
        ph = t.ph,
        ph_value = value(Metric::Ph),
        water = t.water_temp,
        water_value = value(Metric::WaterTemp),
        air = t.air_temp,
        air_value = value(Metric::AirTemp),
        hum = t.air_hum,
        hum_value = value(Metric::AirHum),
    );

    if let Some(weather) = weather {
        let location = weather.location.trim();
        if location.is_empty() {
            prompt.push_str(t.weather_heading);
        } else {
            prompt.push_str(&format!("{} ({location}):", t.weather_heading_at));
        }
        prompt.push_str(&format!(
            "\n- {}: {} °C\n- {}: {}\n\n",
            t.weather_temp,
            weather.snapshot.temperature_c,
            t.weather_conditions,
            weather.snapshot.description
        ));
    }

    prompt.push_str(t.closing);
    prompt
}

pub fn analysis_messages(
    record: &ReadingRecord,
    language: Language,
    weather: Option<WeatherContext<'_>>,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(analysis_prompt(record, language, weather)),
    ]
}

pub fn chat_prompt(topic: ChatTopic, question: &str) -> String {
    format!(
        "You are an expert in agriculture. Focus on the topic: {}\n\
         User question: {}\n\
         Provide a concise and accurate response.",
        topic.focus(),
        question.trim()
    )
}

pub fn chat_messages(topic: ChatTopic, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CHAT_SYSTEM_PROMPT),
        ChatMessage::user(chat_prompt(topic, question)),
    ]
}
