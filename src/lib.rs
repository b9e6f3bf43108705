//! A question-answering HTTP service around an ONNX seq2seq model with greedy decoding.

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod llm;
pub mod provision;

pub use app_state::AppState;
pub use error::{Error, Result};
