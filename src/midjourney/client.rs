use crate::config::MidjourneyConfig;
use crate::constants::{MJ_SECRET_HEADER, SUBMIT_OK_CODES};
use crate::midjourney::prompt::{TaskAction, TaskRequest};
use crate::types::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    NotStart,
    Submitted,
    InProgress,
    Failure,
    Success,
    #[serde(other)]
    Unknown,
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub action: TaskAction,
    pub status: TaskStatus,
    /// 0..=100
    pub progress: u8,
    pub image_url: Option<String>,
    pub fail_reason: Option<String>,
}

/// Submission and polling for the image-generation backend.
pub trait TaskClient: Send + Sync {
    /// Submits a task and returns its id.
    fn submit(&self, request: &TaskRequest) -> impl Future<Output = Result<String>> + Send;

    fn fetch(&self, task_id: &str) -> impl Future<Output = Result<TaskSnapshot>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagineBody<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeBody<'a> {
    action: TaskAction,
    task_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u8>,
}

#[derive(Deserialize, Debug)]
struct SubmitResponse {
    code: i64,
    #[serde(default)]
    description: String,
    /// Task id; some deployments send it as a number.
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FetchResponse {
    id: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default)]
    progress: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    fail_reason: Option<String>,
}

/// `"45%"` -> 45. Anything unparsable counts as no progress.
fn parse_progress(raw: &str) -> u8 {
    raw.trim()
        .trim_end_matches('%')
        .parse::<u8>()
        .map(|p| p.min(100))
        .unwrap_or(0)
}

impl SubmitResponse {
    fn into_task_id(self) -> Result<String> {
        if !SUBMIT_OK_CODES.contains(&self.code) {
            return Err(GatewayError::Task(format!(
                "submission rejected (code {}): {}",
                self.code, self.description
            ))
            .into());
        }
        match self.result {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(GatewayError::Task("submission returned no task id".to_string()).into()),
        }
    }
}

impl From<FetchResponse> for TaskSnapshot {
    fn from(resp: FetchResponse) -> Self {
        Self {
            task_id: resp.id,
            action: resp
                .action
                .as_deref()
                .and_then(TaskAction::from_name)
                .unwrap_or(TaskAction::Imagine),
            status: resp.status,
            progress: parse_progress(&resp.progress),
            image_url: resp.image_url.filter(|u| !u.is_empty()),
            fail_reason: resp.fail_reason.filter(|r| !r.is_empty()),
        }
    }
}

/// Client for a midjourney-proxy compatible HTTP API.
#[derive(Clone)]
pub struct HttpTaskClient {
    client: reqwest::Client,
    endpoint: String,
    api_secret: Option<String>,
}

impl HttpTaskClient {
    pub fn new(client: reqwest::Client, config: &MidjourneyConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(GatewayError::Config("midjourney endpoint is not configured".to_string()).into());
        }
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.endpoint, path));
        match &self.api_secret {
            Some(secret) => builder.header(MJ_SECRET_HEADER, secret),
            None => builder,
        }
    }
}

impl TaskClient for HttpTaskClient {
    async fn submit(&self, request: &TaskRequest) -> Result<String> {
        let builder = match request {
            TaskRequest::Imagine { prompt } => self
                .request(reqwest::Method::POST, "/mj/submit/imagine")
                .json(&ImagineBody { prompt }),
            TaskRequest::Change {
                action,
                task_id,
                index,
            } => self
                .request(reqwest::Method::POST, "/mj/submit/change")
                .json(&ChangeBody {
                    action: *action,
                    task_id,
                    index: *index,
                }),
        };

        let resp = builder.send().await?.error_for_status()?;
        let body: SubmitResponse = resp.json().await?;
        let task_id = body.into_task_id()?;
        tracing::info!("[MIDJOURNEY] Submitted {} as task {}", request.action(), task_id);
        Ok(task_id)
    }

    async fn fetch(&self, task_id: &str) -> Result<TaskSnapshot> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/mj/task/{}/fetch", task_id))
            .send()
            .await?
            .error_for_status()?;
        let body: FetchResponse = resp.json().await?;
        Ok(body.into())
    }
}
