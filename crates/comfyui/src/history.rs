//! Correlating ComfyUI history entries with a submitted job.
//!
//! `GET /history` returns every recent execution on the instance, keyed
//! by prompt id, regardless of which client submitted it:
//!
//! ```json
//! {
//!   "<prompt_id>": {
//!     "prompt": [number, "<prompt_id>", { ...workflow... }, {...}, [...]],
//!     "outputs": { "<node_id>": { "gifs": [{"filename": "..", "subfolder": "", "type": "output"}] } }
//!   }
//! }
//! ```
//!
//! An entry belongs to a job only when its workflow references the job's
//! uploaded input file, `input_{token}.jpg`. Nothing else is trusted.

use serde::Deserialize;
use serde_json::Value;

use clipforge_core::correlation::CorrelationToken;

/// Node output lists that may hold produced videos.
pub const VIDEO_OUTPUT_KEYS: [&str; 2] = ["gifs", "videos"];

/// File extensions accepted as a video result.
pub const VIDEO_EXTENSIONS: [&str; 5] = [".mp4", ".webm", ".avi", ".mov", ".gif"];

/// Position of the workflow graph inside an entry's `prompt` array.
const PROMPT_WORKFLOW_INDEX: usize = 2;

/// A produced file as referenced by a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

impl OutputFile {
    pub fn is_video(&self) -> bool {
        let name = self.filename.to_ascii_lowercase();
        VIDEO_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }
}

/// Outcome of scanning one history listing for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryMatch {
    /// No entry references the job's input file yet.
    NotFound,
    /// The job's entry exists but has no video output yet.
    Pending { prompt_id: String },
    /// The job's entry has a video output ready to fetch.
    Completed {
        prompt_id: String,
        output: OutputFile,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History response is not a JSON object")]
    NotAnObject,
}

/// Scan a history listing for the entry belonging to `token`.
///
/// Entries for other jobs are ignored even when they are interleaved
/// with ours or already completed.
pub fn find_job_output(
    history: &Value,
    token: &CorrelationToken,
) -> Result<HistoryMatch, HistoryError> {
    let entries = history.as_object().ok_or(HistoryError::NotAnObject)?;
    let filename = token.input_filename();
    let mut pending = None;

    for (prompt_id, entry) in entries {
        let Some(workflow) = entry
            .get("prompt")
            .and_then(Value::as_array)
            .and_then(|prompt| prompt.get(PROMPT_WORKFLOW_INDEX))
        else {
            continue;
        };

        if !mentions(workflow, &filename) {
            continue;
        }

        match first_video_output(entry) {
            Some(output) => {
                return Ok(HistoryMatch::Completed {
                    prompt_id: prompt_id.clone(),
                    output,
                });
            }
            None => {
                pending.get_or_insert_with(|| prompt_id.clone());
            }
        }
    }

    Ok(match pending {
        Some(prompt_id) => HistoryMatch::Pending { prompt_id },
        None => HistoryMatch::NotFound,
    })
}

/// Whether any string inside `value` contains `needle`.
fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.contains(needle),
        Value::Array(items) => items.iter().any(|item| mentions(item, needle)),
        Value::Object(map) => map.values().any(|item| mentions(item, needle)),
        _ => false,
    }
}

fn first_video_output(entry: &Value) -> Option<OutputFile> {
    let outputs = entry.get("outputs")?.as_object()?;

    outputs
        .values()
        .filter_map(Value::as_object)
        .flat_map(|node| {
            VIDEO_OUTPUT_KEYS
                .iter()
                .filter_map(move |key| node.get(*key).and_then(Value::as_array))
                .flatten()
        })
        .filter_map(|item| OutputFile::deserialize(item).ok())
        .find(OutputFile::is_video)
}
