use thiserror::Error;

use crate::validator::ValidationFailure;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Store error: {0}")]
    Store(#[from] uex_store::StoreError),

    #[error("Invalid parameters: {}", summarize(.0))]
    Validation(Vec<ValidationFailure>),

    #[error("Still loading data, {percent}% complete")]
    NotReady { percent: u8 },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn summarize(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.parameter.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
