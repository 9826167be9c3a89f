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

/// In-memory [`WorkflowBackend`] driven by a script of responses.
///
/// History responses are served in order; once the script runs out the
/// last response keeps being returned (or `{}` if none was scripted).
#[derive(Default)]
pub struct ScriptedBackend {
    submit_response: Mutex<Option<Result<Value, ComfyUIApiError>>>,
    history: Mutex<VecDeque<Result<Value, ComfyUIApiError>>>,
    last_history: Mutex<Option<Value>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub submitted: Mutex<Vec<Value>>,
    history_calls: AtomicUsize,
    view_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit_response(self, response: Value) -> Self {
        *self.submit_response.lock().unwrap() = Some(Ok(response));
        self
    }

    pub fn with_submit_error(self, status: u16) -> Self {
        *self.submit_response.lock().unwrap() = Some(Err(api_error(status)));
        self
    }

    pub fn push_history(&self, history: Value) {
        self.history.lock().unwrap().push_back(Ok(history));
    }

    pub fn push_history_error(&self, status: u16) {
        self.history.lock().unwrap().push_back(Err(api_error(status)));
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

    pub fn view_calls(&self) -> usize {
        self.view_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowBackend for ScriptedBackend {
    async fn submit_workflow(&self, body: &Value) -> Result<Value, ComfyUIApiError> {
        self.submitted.lock().unwrap().push(body.clone());
        self.submit_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(json!({"status": "ok"})))
    }

    async fn get_history(&self) -> Result<Value, ComfyUIApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.history.lock().unwrap().pop_front();
        match next {
            Some(Ok(history)) => {
                *self.last_history.lock().unwrap() = Some(history.clone());
                Ok(history)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self
                .last_history
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| json!({}))),
        }
    }

    async fn view(&self, file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(&file.filename)
            .cloned()
            .ok_or_else(|| api_error(404))
    }
}

pub fn api_error(status: u16) -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status,
        body: "scripted failure".to_string(),
    }
}

/// A history entry whose workflow references `input_{token}.jpg`.
pub fn history_entry(token: &str, video: Option<&str>) -> Value {
    let outputs = match video {
        Some(filename) => json!({
            "31": {"gifs": [{"filename": filename, "subfolder": "", "type": "output"}]}
        }),
        None => json!({}),
    };
    json!({
        "prompt": [
            7,
            "prompt",
            {"12": {"class_type": "LoadImage", "inputs": {"image": format!("input_{token}.jpg")}}},
            {},
            []
        ],
        "outputs": outputs,
    })
}

/// PNG-headed bytes large enough to pass as an inline candidate.
pub fn png_payload(len: usize) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.resize(len, 3);
    bytes
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
