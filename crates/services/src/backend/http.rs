use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use escape_core::model::{Level, QuestionRecord, ScoreSubmission, StudentId};

use super::{LeaderboardEntry, LoginResponse, PlayerScore, QuizBackend, require_field};
use crate::error::BackendError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5050";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct BackendConfig {
    base_url: Url,
    timeout: Duration,
}

impl BackendConfig {
    /// # Errors
    ///
    /// Returns `BackendError::InvalidBaseUrl` if `base_url` does not parse.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let base_url =
            Url::parse(base_url.trim()).map_err(|_| BackendError::InvalidBaseUrl(base_url.into()))?;
        Ok(Self { base_url, timeout })
    }

    /// Read `ESCAPE_API_URL` and `ESCAPE_API_TIMEOUT_SECS`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidBaseUrl` if the configured URL does not parse.
    pub fn from_env() -> Result<Self, BackendError> {
        let base_url = env::var("ESCAPE_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout = env::var("ESCAPE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        Self::new(&base_url, timeout)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

/// JSON-over-HTTP client for the quiz backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self
            .client
            .get(self.config.endpoint(path))
            .send()
            .await
            .map_err(classify)?;
        read_json(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(self.config.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        read_json(response).await
    }
}

fn classify(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Http(err)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| "Network response was not ok".to_string());
        return Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    response.json().await.map_err(classify)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    student_name: &'a str,
    college_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct RulesResponse {
    #[serde(default)]
    rules: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EligibilityResponse {
    eligible: bool,
}

#[derive(Debug, Deserialize)]
struct Ack {}

#[async_trait]
impl QuizBackend for HttpBackend {
    async fn login(&self, name: &str, college: &str) -> Result<LoginResponse, BackendError> {
        let name = require_field(name, "studentName")?;
        let college = require_field(college, "collegeName")?;
        self.post_json(
            "/api/login",
            &LoginRequest {
                student_name: &name,
                college_name: &college,
            },
        )
        .await
    }

    async fn get_questions(&self, level: Level) -> Result<Vec<QuestionRecord>, BackendError> {
        let mut banks: HashMap<String, Vec<QuestionRecord>> =
            self.get_json("/api/questions").await?;
        Ok(banks.remove(&level.bank_key()).unwrap_or_default())
    }

    async fn submit_score(&self, submission: &ScoreSubmission) -> Result<(), BackendError> {
        let _: Ack = self.post_json("/api/submit-score", submission).await?;
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<String>, BackendError> {
        let body: RulesResponse = self.get_json("/api/rules").await?;
        Ok(body.rules)
    }

    async fn check_eligibility(
        &self,
        student_id: StudentId,
        level: Level,
    ) -> Result<bool, BackendError> {
        let path = format!("/api/check-eligibility?studentID={student_id}&level={level}");
        let body: EligibilityResponse = self.get_json(&path).await?;
        Ok(body.eligible)
    }

    async fn get_player_score(
        &self,
        student_id: StudentId,
        level: Level,
    ) -> Result<Option<PlayerScore>, BackendError> {
        match self
            .get_json(&format!("/api/player-score/{student_id}/{level}"))
            .await
        {
            Ok(score) => Ok(Some(score)),
            Err(BackendError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn get_leaderboard(&self, level: Level) -> Result<Vec<LeaderboardEntry>, BackendError> {
        self.get_json(&format!("/api/leaderboard/{level}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_invalid_url() {
        assert!(matches!(
            BackendConfig::new("not a url", DEFAULT_TIMEOUT),
            Err(BackendError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = BackendConfig::new("http://10.0.0.8:5050/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            config.endpoint("/api/submit-score"),
            "http://10.0.0.8:5050/api/submit-score"
        );
    }

    #[tokio::test]
    async fn login_validates_before_sending() {
        let backend =
            HttpBackend::new(BackendConfig::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT).unwrap())
                .unwrap();
        let err = backend.login("", "MIT").await.unwrap_err();
        assert!(matches!(err, BackendError::MissingField("studentName")));
    }
}
