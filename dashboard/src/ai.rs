use envmon_common::{ChatMessage, RequestCounter};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::ApiError,
    http::{Auth, HttpClient},
};

/// Which caller a completion serves; only changes the error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Analysis,
    Chat,
}

impl CompletionKind {
    fn action(self) -> &'static str {
        match self {
            Self::Analysis => "during AI analysis",
            Self::Chat => "during AI chat",
        }
    }

    fn status_prefix(self) -> &'static str {
        match self {
            Self::Analysis => "Error fetching AI analysis",
            Self::Chat => "Error fetching AI response",
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: HttpClient,
    url: String,
    model: String,
}

impl ChatClient {
    pub fn new(http: HttpClient, url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            model: model.into(),
        }
    }

    pub async fn complete(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        kind: CompletionKind,
        counter: &RequestCounter,
    ) -> Result<String, ApiError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .http
            .post_json(&self.url, Auth::Bearer(api_key), &request, counter)
            .await
            .map_err(|err| ApiError::transport(kind.action(), err))?;

        if response.status != StatusCode::OK {
            warn!(status = %response.status, model = %self.model, "chat completion failed");
            return Err(ApiError::Upstream(format!(
                "{}: {} - {}",
                kind.status_prefix(),
                response.status.as_u16(),
                response.body
            )));
        }

        let payload: CompletionResponse = response
            .json()
            .map_err(|err| ApiError::decode(kind.action(), err))?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ApiError::decode(kind.action(), "response carried no choices"))?;

        info!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}
