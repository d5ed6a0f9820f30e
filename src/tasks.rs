use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// The pipeline tasks the runner knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    FullPool,
    Daily,
    BackfillDaily,
    Watchlist,
    DailyRoutine,
    Auto,
}

impl TaskName {
    pub const ALL: [TaskName; 6] = [
        TaskName::FullPool,
        TaskName::Daily,
        TaskName::BackfillDaily,
        TaskName::Watchlist,
        TaskName::DailyRoutine,
        TaskName::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::FullPool => "full_pool",
            TaskName::Daily => "daily",
            TaskName::BackfillDaily => "backfill_daily",
            TaskName::Watchlist => "watchlist",
            TaskName::DailyRoutine => "daily_routine",
            TaskName::Auto => "auto",
        }
    }

    pub fn parse(raw: &str) -> Option<TaskName> {
        TaskName::ALL.iter().copied().find(|t| t.as_str() == raw)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// One task's status record, passed through as the runner reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStatus {
    pub task: String,
    pub status: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<f64>,
    pub message: Option<String>,
}

/// `Rejected` carries the runner's own status code and detail (404 unknown
/// task, 409 already running) so the proxy can mirror them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started { message: String },
    Rejected { status: u16, detail: String },
}

#[derive(Clone)]
pub struct TaskClient {
    base: String,
    client: reqwest::Client,
}

impl TaskClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build task api client")?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn statuses(&self) -> Result<HashMap<String, TaskStatus>> {
        let resp = self
            .client
            .get(self.endpoint("/tasks/status"))
            .send()
            .await
            .context("task api unreachable")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("task api returned {status}: {body}");
        }
        resp.json::<HashMap<String, TaskStatus>>()
            .await
            .context("parse task status payload")
    }

    pub async fn trigger(&self, task: TaskName) -> Result<TriggerOutcome> {
        let resp = self
            .client
            .post(self.endpoint(&format!("/tasks/{task}")))
            .send()
            .await
            .context("task api unreachable")?;
        let status = resp.status();
        if status.is_success() {
            let body: serde_json::Value =
                resp.json().await.context("parse trigger response")?;
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("task started")
                .to_string();
            return Ok(TriggerOutcome::Started { message });
        }
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let detail = body
            .get("detail")
            .and_then(|v| v.as_str())
            .unwrap_or("task rejected")
            .to_string();
        Ok(TriggerOutcome::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_round_trip() {
        for task in TaskName::ALL {
            assert_eq!(TaskName::parse(task.as_str()), Some(task));
        }
        assert_eq!(TaskName::parse("deploy"), None);
        assert_eq!(TaskName::parse(""), None);
    }

    #[test]
    fn task_name_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(TaskName::BackfillDaily).unwrap(),
            "backfill_daily"
        );
        assert_eq!(TaskName::DailyRoutine.to_string(), "daily_routine");
    }

    #[test]
    fn task_status_parses_runner_payload() {
        let raw = r#"{
            "full_pool": {
                "task": "full_pool",
                "status": "success",
                "started_at": "2024-06-28T01:30:00.120000",
                "finished_at": "2024-06-28T01:31:10.040000",
                "duration_seconds": 70.02,
                "message": null
            },
            "daily": {"task": "daily", "status": "idle"}
        }"#;
        let statuses: HashMap<String, TaskStatus> = serde_json::from_str(raw).unwrap();
        let full_pool = &statuses["full_pool"];
        assert_eq!(full_pool.status, "success");
        assert_eq!(full_pool.duration_seconds, Some(70.02));
        assert_eq!(full_pool.message, None);
        let daily = &statuses["daily"];
        assert_eq!(daily.status, "idle");
        assert_eq!(daily.started_at, None);
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = TaskClient::new("http://127.0.0.1:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base(), "http://127.0.0.1:8000");
        assert_eq!(
            client.endpoint("/tasks/status"),
            "http://127.0.0.1:8000/tasks/status"
        );
    }
}
