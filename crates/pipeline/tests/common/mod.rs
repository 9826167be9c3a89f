#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use clipforge_comfyui::api::{ComfyUIApiError, WorkflowBackend};
use clipforge_comfyui::history::OutputFile;
use clipforge_pipeline::sink::{JobSink, SinkError};

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// In-memory [`WorkflowBackend`].
///
/// Every submission gets the scripted response (or `{"status": "ok"}`).
/// History responses are served in order and the last one repeats.
#[derive(Default)]
pub struct ScriptedBackend {
    submit_response: Mutex<Option<Value>>,
    submit_status: Mutex<Option<u16>>,
    history: Mutex<VecDeque<Value>>,
    last_history: Mutex<Option<Value>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    history_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit_response(self, response: Value) -> Self {
        *self.submit_response.lock().unwrap() = Some(response);
        self
    }

    pub fn with_submit_error(self, status: u16) -> Self {
        *self.submit_status.lock().unwrap() = Some(status);
        self
    }

    pub fn push_history(&self, history: Value) {
        self.history.lock().unwrap().push_back(history);
    }

    pub fn add_file(&self, filename: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(filename.to_string(), bytes.to_vec());
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowBackend for ScriptedBackend {
    async fn submit_workflow(&self, _body: &Value) -> Result<Value, ComfyUIApiError> {
        if let Some(status) = *self.submit_status.lock().unwrap() {
            return Err(ComfyUIApiError::ApiError {
                status,
                body: "scripted failure".to_string(),
            });
        }
        Ok(self
            .submit_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| json!({"status": "ok"})))
    }

    async fn get_history(&self) -> Result<Value, ComfyUIApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last_history.lock().unwrap();
        if let Some(next) = self.history.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        Ok(last.clone().unwrap_or_else(|| json!({})))
    }

    async fn view(&self, file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError> {
        self.files
            .lock()
            .unwrap()
            .get(&file.filename)
            .cloned()
            .ok_or_else(|| ComfyUIApiError::ApiError {
                status: 404,
                body: "not found".to_string(),
            })
    }
}

/// A history entry whose workflow references `input_{token}.jpg`.
pub fn history_entry(token: &str, video: Option<&str>) -> Value {
    let outputs = match video {
        Some(filename) => json!({
            "31": {"videos": [{"filename": filename, "subfolder": "", "type": "output"}]}
        }),
        None => json!({}),
    };
    json!({
        "prompt": [
            3,
            "prompt",
            {"5": {"class_type": "LoadImage", "inputs": {"image": format!("input_{token}.jpg")}}},
            {},
            []
        ],
        "outputs": outputs,
    })
}

/// MP4-headed bytes.
pub fn mp4_payload(len: usize) -> Vec<u8> {
    let mut bytes = b"\x00\x00\x00\x18ftypmp42".to_vec();
    bytes.resize(len, 7);
    bytes
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Everything a [`RecordingSink`] was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Progress(String),
    Result(Vec<u8>),
    Error(String),
}

/// [`JobSink`] that records every call.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    fail_delivery: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `deliver_result` always fails.
    pub fn failing_delivery() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail_delivery: true,
        }
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Progress(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Number of `deliver_result` plus `deliver_error` calls.
    pub fn deliveries(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| !matches!(e, SinkEvent::Progress(_)))
            .count()
    }

    /// Progress updates recorded after the first delivery.
    pub fn progress_after_delivery(&self) -> usize {
        self.events()
            .iter()
            .skip_while(|e| matches!(e, SinkEvent::Progress(_)))
            .filter(|e| matches!(e, SinkEvent::Progress(_)))
            .count()
    }
}

#[async_trait]
impl JobSink for RecordingSink {
    async fn update_progress(&self, text: &str) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(text.to_string()));
        Ok(())
    }

    async fn deliver_result(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(SinkEvent::Result(payload));
        if self.fail_delivery {
            return Err(SinkError::Other("upload rejected".into()));
        }
        Ok(())
    }

    async fn deliver_error(&self, message: &str) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Error(message.to_string()));
        Ok(())
    }
}
