//! Shared helpers for integration tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use auto_iflow::artifact;
use auto_iflow::integrations::SessionSink;
use auto_iflow::session::AgentClient;
use auto_iflow::session::events::AgentMessage;
use auto_iflow::types::{
    AcceptanceMapEntry, ComplexityLevel, FilesToModifySource, ImplementationPlan, NoiseProfile,
    PlanPhase, RiskLevel, Subtask, SubtaskStatus, TaskIntake, TaskType,
};

pub fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

/// Scripted agent client replaying a fixed message sequence, optionally
/// stalling before a given message index.
pub struct ScriptedClient {
    messages: VecDeque<AgentMessage>,
    stall_before: Option<usize>,
    stall: Duration,
    delivered: usize,
}

impl ScriptedClient {
    pub fn new(messages: Vec<AgentMessage>) -> Self {
        Self {
            messages: messages.into(),
            stall_before: None,
            stall: Duration::ZERO,
            delivered: 0,
        }
    }

    pub fn with_stall(mut self, before_index: usize, stall: Duration) -> Self {
        self.stall_before = Some(before_index);
        self.stall = stall;
        self
    }
}

#[async_trait]
impl AgentClient for ScriptedClient {
    async fn send(&mut self, _prompt: &str) -> auto_iflow::Result<()> {
        Ok(())
    }

    async fn next_message(&mut self) -> Option<AgentMessage> {
        if self.stall_before == Some(self.delivered) {
            tokio::time::sleep(self.stall).await;
        }
        self.delivered += 1;
        self.messages.pop_front()
    }
}

/// Sink recording events as strings for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl SessionSink for RecordingSink {
    fn text(&self, chunk: &str) {
        self.events.lock().unwrap().push(format!("text:{chunk}"));
    }

    fn tool_start(&self, name: &str, _input_preview: Option<&str>) {
        self.events.lock().unwrap().push(format!("start:{name}"));
    }

    fn tool_end(&self, name: &str, success: bool, result: Option<&str>, _detail: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("end:{name}:{}:{}", success, result.unwrap_or("")));
    }

    fn note(&self, message: &str) {
        self.events.lock().unwrap().push(format!("note:{message}"));
    }
}

pub fn message(raw: serde_json::Value) -> AgentMessage {
    serde_json::from_value(raw).unwrap()
}

pub fn write_plan(spec_dir: &Utf8Path, statuses: &[(&str, SubtaskStatus)], task_type: TaskType) {
    let plan = ImplementationPlan {
        task_type: Some(task_type),
        phases: vec![PlanPhase {
            phase: 1,
            name: "Build".to_string(),
            subtasks: statuses
                .iter()
                .map(|(id, status)| Subtask {
                    id: (*id).to_string(),
                    description: format!("subtask {id}"),
                    status: *status,
                    verification: None,
                    service: None,
                })
                .collect(),
        }],
        ..Default::default()
    };
    artifact::save_implementation_plan(spec_dir, &plan).unwrap();
}

pub fn write_intake(
    spec_dir: &Utf8Path,
    task_type: TaskType,
    tests_to_run: &[&str],
    acceptance: &[(&str, &str)],
) {
    let intake = TaskIntake {
        task_type,
        complexity: ComplexityLevel::Simple,
        complexity_score: 1,
        risk: RiskLevel::Low,
        noise_profile: NoiseProfile::Low,
        input_files: vec![],
        output_files: vec![],
        files_to_modify: vec![],
        files_to_modify_source: FilesToModifySource::None,
        files_to_modify_inferred: false,
        tests_to_run: tests_to_run.iter().map(|s| (*s).to_string()).collect(),
        acceptance_map: acceptance
            .iter()
            .map(|(criterion, file)| AcceptanceMapEntry {
                criterion: (*criterion).to_string(),
                file: (*file).to_string(),
            })
            .collect(),
        clarifying_questions: vec![],
        ralph_loop: false,
        ralph_loop_max: 3,
    };
    artifact::save_task_intake(spec_dir, &intake).unwrap();
}
