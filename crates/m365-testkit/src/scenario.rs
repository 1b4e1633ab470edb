//! End-to-end smoke scenario against a live bridge.
//!
//! The scenario walks through every tool family once, strictly in sequence:
//! accounts, mail, calendar, files and search. It needs real Microsoft 365
//! credentials; without `MICROSOFT_MCP_CLIENT_ID` the whole scenario is
//! skipped rather than failed.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    BridgeCredentials, BridgeError, BridgeSession, HarnessConfig, ScenarioConfig, ToolCaller,
    ToolOutput, config::load_env_file,
};

/// Errors that fail the smoke scenario.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ScenarioError {
    /// A tool reported failure through its error flag.
    #[error("tool `{tool}` returned an error: {message}")]
    ToolFailed { tool: String, message: String },

    /// A tool result lacked a field the scenario depends on.
    #[error("tool `{tool}` returned no usable `{field}`")]
    MissingField { tool: String, field: String },

    /// The downloaded file differs from the uploaded one.
    #[error("downloaded content differs from upload ({expected} bytes sent, {actual} received)")]
    ContentMismatch { expected: usize, actual: usize },

    /// The configured event offsets overflow the calendar.
    #[error(
        "event window out of range ({days_ahead} days ahead, {duration_minutes} minutes long)"
    )]
    InvalidEventWindow {
        days_ahead: i64,
        duration_minutes: i64,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// How a smoke run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokeOutcome {
    /// Required configuration was missing.
    Skipped { reason: String },
    Passed(SmokeReport),
}

/// What a passing run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmokeReport {
    /// Tools invoked, in order.
    pub steps: Vec<String>,
    pub account_count: usize,
    pub event_id: String,
    pub file_id: String,
}

/// The tool-call sequence, parameterised by config and clock.
#[derive(Debug, Clone)]
pub struct SmokeScenario {
    config: ScenarioConfig,
    now: DateTime<Utc>,
}

impl SmokeScenario {
    pub fn new(config: ScenarioConfig) -> Self {
        Self {
            config,
            now: Utc::now(),
        }
    }

    /// Pins the clock used for timestamps and event times.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Runs the scenario against `caller`.
    ///
    /// If a step after the upload fails, the uploaded file is deleted on a
    /// best-effort basis before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first failing step.
    pub async fn run(&self, caller: &dyn ToolCaller) -> Result<SmokeReport, ScenarioError> {
        let (start, end) = self.event_window()?;
        let mut report = SmokeReport::default();
        let stamp = self.now.format("%Y%m%dT%H%M%SZ").to_string();

        let accounts = call_ok(caller, &mut report, "list_accounts", json!({})).await?;
        let accounts = account_list(accounts.first_json());
        report.account_count = accounts.len();
        info!(count = accounts.len(), "listed accounts");

        match self.recipient(&accounts) {
            Some(to) => {
                call_ok(
                    caller,
                    &mut report,
                    "send_email",
                    json!({
                        "to": to,
                        "subject": format!("MCP smoke test {stamp}"),
                        "body": "Sent by the m365 harness smoke scenario.",
                    }),
                )
                .await?;
            }
            None => warn!("no mail recipient configured or discoverable; skipping send_email"),
        }

        call_ok(
            caller,
            &mut report,
            "read_emails",
            json!({ "count": self.config.read_count }),
        )
        .await?;

        let event = call_ok(
            caller,
            &mut report,
            "create_event",
            json!({
                "subject": format!("MCP smoke event {stamp}"),
                "start": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "end": end.to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
        )
        .await?;
        report.event_id = required_id(&event, "create_event")?;

        call_ok(
            caller,
            &mut report,
            "get_calendar_events",
            json!({ "days": self.config.calendar_days }),
        )
        .await?;

        let content = format!("m365 harness smoke file {stamp}\n").into_bytes();
        let upload = call_ok(
            caller,
            &mut report,
            "upload_file",
            json!({
                "path": upload_path(&self.config.upload_dir, &stamp),
                "content_base64": STANDARD.encode(&content),
            }),
        )
        .await?;
        report.file_id = required_id(&upload, "upload_file")?;

        let result = self.after_upload(caller, &mut report, &content).await;
        if result.is_err() {
            warn!(file_id = %report.file_id, "scenario failed after upload; removing test file");
            if let Err(err) = caller
                .call("delete_file", json!({ "file_id": report.file_id }))
                .await
            {
                warn!(error = %err, "cleanup delete_file failed");
            }
        }
        result?;

        Ok(report)
    }

    async fn after_upload(
        &self,
        caller: &dyn ToolCaller,
        report: &mut SmokeReport,
        content: &[u8],
    ) -> Result<(), ScenarioError> {
        let file_id = report.file_id.clone();

        call_ok(caller, report, "list_files", json!({})).await?;

        let download = call_ok(
            caller,
            report,
            "download_file",
            json!({ "file_id": file_id }),
        )
        .await?;
        let downloaded = downloaded_bytes(&download).ok_or_else(|| ScenarioError::MissingField {
            tool: "download_file".to_string(),
            field: "content".to_string(),
        })?;
        if downloaded != content {
            return Err(ScenarioError::ContentMismatch {
                expected: content.len(),
                actual: downloaded.len(),
            });
        }

        call_ok(
            caller,
            report,
            "search",
            json!({ "query": self.config.search_query }),
        )
        .await?;

        call_ok(caller, report, "delete_file", json!({ "file_id": file_id })).await?;
        Ok(())
    }

    /// Start and end of the test event, or an error if the configured offsets
    /// leave the representable date range.
    fn event_window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ScenarioError> {
        let invalid = || ScenarioError::InvalidEventWindow {
            days_ahead: self.config.event_days_ahead,
            duration_minutes: self.config.event_duration_minutes,
        };
        let start = TimeDelta::try_days(self.config.event_days_ahead)
            .and_then(|offset| self.now.checked_add_signed(offset))
            .ok_or_else(invalid)?;
        let end = TimeDelta::try_minutes(self.config.event_duration_minutes)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or_else(invalid)?;
        Ok((start, end))
    }

    fn recipient(&self, accounts: &[Value]) -> Option<String> {
        self.config.mail_to.clone().or_else(|| {
            accounts.first().and_then(|account| {
                ["username", "email"]
                    .iter()
                    .find_map(|key| account.get(key).and_then(Value::as_str))
                    .map(ToString::to_string)
            })
        })
    }
}

/// Loads the environment, skips without credentials, and otherwise runs the
/// scenario against a freshly spawned bridge.
///
/// # Errors
///
/// Returns an error if the bridge cannot be reached or a step fails.
pub async fn run_live(config: &HarnessConfig) -> Result<SmokeOutcome, ScenarioError> {
    load_env_file();
    let Some(credentials) = BridgeCredentials::from_env() else {
        let reason = format!("{} is not set", crate::config::CLIENT_ID_ENV);
        warn!(%reason, "skipping live smoke scenario");
        return Ok(SmokeOutcome::Skipped { reason });
    };

    let session = BridgeSession::connect(&config.launcher, &credentials).await?;
    let result = SmokeScenario::new(config.scenario.clone())
        .run(&session)
        .await;
    if let Err(err) = session.close().await {
        warn!(error = %err, "bridge session did not close cleanly");
    }

    let report = result?;
    info!(steps = report.steps.len(), "smoke scenario passed");
    Ok(SmokeOutcome::Passed(report))
}

async fn call_ok(
    caller: &dyn ToolCaller,
    report: &mut SmokeReport,
    tool: &str,
    arguments: Value,
) -> Result<ToolOutput, ScenarioError> {
    let output = caller.call(tool, arguments).await?;
    if output.is_error {
        return Err(ScenarioError::ToolFailed {
            tool: tool.to_string(),
            message: output.text(),
        });
    }
    info!(tool, "step passed");
    report.steps.push(tool.to_string());
    Ok(output)
}

fn account_list(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(accounts)) => accounts,
        Some(Value::Object(mut map)) => match map.remove("accounts") {
            Some(Value::Array(accounts)) => accounts,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn required_id(output: &ToolOutput, tool: &str) -> Result<String, ScenarioError> {
    output
        .first_json()
        .as_ref()
        .and_then(|value| value.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| ScenarioError::MissingField {
            tool: tool.to_string(),
            field: "id".to_string(),
        })
}

fn upload_path(dir: &str, stamp: &str) -> String {
    format!("{}/mcp-smoke-{stamp}.txt", dir.trim_end_matches('/'))
}

/// Extracts file bytes from a `download_file` result.
///
/// Accepts `{"content_base64": ...}`, `{"content": ...}` or raw text.
fn downloaded_bytes(output: &ToolOutput) -> Option<Vec<u8>> {
    match output.first_json()? {
        Value::Object(map) => {
            if let Some(encoded) = map.get("content_base64").and_then(Value::as_str) {
                return STANDARD.decode(encoded).ok();
            }
            map.get("content")
                .and_then(Value::as_str)
                .map(|text| text.as_bytes().to_vec())
        }
        Value::String(text) => Some(text.into_bytes()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;

    type Handler = Box<dyn Fn(&Value, &FakeState) -> ToolOutput + Send + Sync>;

    #[derive(Default)]
    struct FakeState {
        uploaded: Mutex<Option<String>>,
    }

    /// Scripted bridge: records calls and answers through per-tool handlers.
    struct FakeBridge {
        handlers: HashMap<&'static str, Handler>,
        calls: Mutex<Vec<(String, Value)>>,
        state: FakeState,
    }

    impl FakeBridge {
        fn healthy() -> Self {
            let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
            handlers.insert(
                "list_accounts",
                Box::new(|_, _| {
                    ToolOutput::text_success(
                        json!([{"username": "me@example.com", "account_id": "acct-1"}]).to_string(),
                    )
                }),
            );
            handlers.insert(
                "create_event",
                Box::new(|_, _| ToolOutput::text_success(json!({"id": "evt-1"}).to_string())),
            );
            handlers.insert(
                "upload_file",
                Box::new(|args, state| {
                    let encoded = args["content_base64"].as_str().unwrap().to_string();
                    *state.uploaded.lock().unwrap() = Some(encoded);
                    ToolOutput::text_success(json!({"id": "file-1"}).to_string())
                }),
            );
            handlers.insert(
                "download_file",
                Box::new(|_, state| {
                    let encoded = state.uploaded.lock().unwrap().clone().unwrap_or_default();
                    ToolOutput::text_success(json!({"content_base64": encoded}).to_string())
                }),
            );
            Self {
                handlers,
                calls: Mutex::new(Vec::new()),
                state: FakeState::default(),
            }
        }

        fn with(mut self, tool: &'static str, handler: Handler) -> Self {
            self.handlers.insert(tool, handler);
            self
        }

        fn tools_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(tool, _)| tool.clone())
                .collect()
        }

        fn args_of(&self, tool: &str) -> Value {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| name == tool)
                .map(|(_, args)| args.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl ToolCaller for FakeBridge {
        async fn call(&self, tool: &str, arguments: Value) -> Result<ToolOutput, BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push((tool.to_string(), arguments.clone()));
            Ok(match self.handlers.get(tool) {
                Some(handler) => handler(&arguments, &self.state),
                None => ToolOutput::text_success("{}"),
            })
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    fn scenario() -> SmokeScenario {
        SmokeScenario::new(ScenarioConfig::default()).at(fixed_now())
    }

    #[tokio::test]
    async fn test_healthy_bridge_passes_every_step_in_order() {
        let bridge = FakeBridge::healthy();

        let report = scenario().run(&bridge).await.unwrap();

        let expected = [
            "list_accounts",
            "send_email",
            "read_emails",
            "create_event",
            "get_calendar_events",
            "upload_file",
            "list_files",
            "download_file",
            "search",
            "delete_file",
        ];
        assert_eq!(bridge.tools_called(), expected);
        assert_eq!(report.steps, expected);
        assert_eq!(report.account_count, 1);
        assert_eq!(report.event_id, "evt-1");
        assert_eq!(report.file_id, "file-1");
    }

    #[tokio::test]
    async fn test_event_is_one_hour_seven_days_out() {
        let bridge = FakeBridge::healthy();
        scenario().run(&bridge).await.unwrap();

        let args = bridge.args_of("create_event");
        assert_eq!(args["start"], "2026-03-09T09:30:00Z");
        assert_eq!(args["end"], "2026-03-09T10:30:00Z");
        assert_eq!(args["subject"], "MCP smoke event 20260302T093000Z");
    }

    #[tokio::test]
    async fn test_mail_goes_to_first_account_unless_configured() {
        let bridge = FakeBridge::healthy();
        scenario().run(&bridge).await.unwrap();
        assert_eq!(bridge.args_of("send_email")["to"], "me@example.com");

        let bridge = FakeBridge::healthy();
        let config = ScenarioConfig {
            mail_to: Some("qa@example.com".to_string()),
            ..ScenarioConfig::default()
        };
        SmokeScenario::new(config)
            .at(fixed_now())
            .run(&bridge)
            .await
            .unwrap();
        assert_eq!(bridge.args_of("send_email")["to"], "qa@example.com");
    }

    #[tokio::test]
    async fn test_send_email_is_skipped_without_recipient() {
        let bridge = FakeBridge::healthy().with(
            "list_accounts",
            Box::new(|_, _| ToolOutput::text_success("[]")),
        );

        let report = scenario().run(&bridge).await.unwrap();

        assert_eq!(report.account_count, 0);
        assert!(!bridge.tools_called().contains(&"send_email".to_string()));
    }

    #[tokio::test]
    async fn test_upload_path_and_payload_round_trip() {
        let bridge = FakeBridge::healthy();
        scenario().run(&bridge).await.unwrap();

        let args = bridge.args_of("upload_file");
        assert_eq!(args["path"], "/mcp-smoke-20260302T093000Z.txt");
        let decoded = STANDARD
            .decode(args["content_base64"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, b"m365 harness smoke file 20260302T093000Z\n");
    }

    #[tokio::test]
    async fn test_out_of_range_event_offsets_fail_before_any_call() {
        for (days_ahead, duration_minutes) in [(i64::MAX, 60), (7, i64::MAX), (400_000_000, 60)] {
            let bridge = FakeBridge::healthy();
            let config = ScenarioConfig {
                event_days_ahead: days_ahead,
                event_duration_minutes: duration_minutes,
                ..ScenarioConfig::default()
            };

            let err = SmokeScenario::new(config)
                .at(fixed_now())
                .run(&bridge)
                .await
                .unwrap_err();

            assert!(
                matches!(err, ScenarioError::InvalidEventWindow { .. }),
                "unexpected error: {err:?}"
            );
            assert!(bridge.tools_called().is_empty());
        }
    }

    #[tokio::test]
    async fn test_tool_error_flag_fails_scenario() {
        let bridge = FakeBridge::healthy().with(
            "read_emails",
            Box::new(|_, _| ToolOutput::text_error("Mailbox unavailable")),
        );

        let err = scenario().run(&bridge).await.unwrap_err();

        match err {
            ScenarioError::ToolFailed { tool, message } => {
                assert_eq!(tool, "read_emails");
                assert_eq!(message, "Mailbox unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!bridge.tools_called().contains(&"create_event".to_string()));
    }

    #[tokio::test]
    async fn test_missing_event_id_fails_scenario() {
        let bridge = FakeBridge::healthy().with(
            "create_event",
            Box::new(|_, _| ToolOutput::text_success(json!({"id": ""}).to_string())),
        );

        let err = scenario().run(&bridge).await.unwrap_err();

        assert!(matches!(
            err,
            ScenarioError::MissingField { ref tool, ref field } if tool == "create_event" && field == "id"
        ));
    }

    #[tokio::test]
    async fn test_content_mismatch_fails_and_cleans_up_file() {
        let bridge = FakeBridge::healthy().with(
            "download_file",
            Box::new(|_, _| ToolOutput::text_success(json!({"content": "tampered"}).to_string())),
        );

        let err = scenario().run(&bridge).await.unwrap_err();

        assert!(matches!(err, ScenarioError::ContentMismatch { actual: 8, .. }));
        let called = bridge.tools_called();
        assert_eq!(called.last().map(String::as_str), Some("delete_file"));
        assert!(!called.contains(&"search".to_string()));
    }

    #[tokio::test]
    async fn test_bridge_errors_propagate() {
        struct DeadBridge;

        #[async_trait]
        impl ToolCaller for DeadBridge {
            async fn call(&self, tool: &str, _arguments: Value) -> Result<ToolOutput, BridgeError> {
                Err(BridgeError::Service {
                    tool: tool.to_string(),
                    message: "connection closed".to_string(),
                })
            }
        }

        let err = scenario().run(&DeadBridge).await.unwrap_err();
        assert!(matches!(err, ScenarioError::Bridge(BridgeError::Service { .. })));
    }

    #[test]
    fn test_account_list_accepts_array_or_wrapped_object() {
        assert_eq!(account_list(Some(json!([{"a": 1}]))).len(), 1);
        assert_eq!(account_list(Some(json!({"accounts": [{"a": 1}, {"b": 2}]}))).len(), 2);
        assert!(account_list(Some(json!("nobody"))).is_empty());
        assert!(account_list(None).is_empty());
    }

    #[test]
    fn test_downloaded_bytes_accepts_known_shapes() {
        let encoded = ToolOutput::text_success(json!({"content_base64": "aGk="}).to_string());
        let plain = ToolOutput::text_success(json!({"content": "hi"}).to_string());
        let raw = ToolOutput::text_success("hi");
        let empty = ToolOutput::default();

        assert_eq!(downloaded_bytes(&encoded), Some(b"hi".to_vec()));
        assert_eq!(downloaded_bytes(&plain), Some(b"hi".to_vec()));
        assert_eq!(downloaded_bytes(&raw), Some(b"hi".to_vec()));
        assert_eq!(downloaded_bytes(&empty), None);
    }

    #[test]
    fn test_upload_path_trims_trailing_slash() {
        assert_eq!(upload_path("/", "s"), "/mcp-smoke-s.txt");
        assert_eq!(upload_path("/Documents/", "s"), "/Documents/mcp-smoke-s.txt");
    }
}
