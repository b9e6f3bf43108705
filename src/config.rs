use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    GoogleDrive,
    /// Hugging Face Hub identifiers of the form `owner/repo:path/in/repo`.
    Hub,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ArtifactConfig {
    pub source: SourceKind,
    pub model_id: String,
    pub model_path: PathBuf,
    pub tokenizer_archive_id: String,
    pub tokenizer_archive_path: PathBuf,
    pub tokenizer_dir: PathBuf,
    /// Files that must exist in `tokenizer_dir` once extraction is done.
    pub tokenizer_expected_files: Vec<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::GoogleDrive,
            model_id: "1s_9yJpwR1o-j6IzTt6J5hwV6yQBt0Y6B".to_string(),
            model_path: PathBuf::from("t5_model.onnx"),
            tokenizer_archive_id: "1-t_JaB7dJiV-dzgv-QCmaiY7ojZSL_3B".to_string(),
            tokenizer_archive_path: PathBuf::from("t5_chatbot.zip"),
            tokenizer_dir: PathBuf::from("t5_chatbot"),
            tokenizer_expected_files: vec!["tokenizer.json".to_string()],
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_input_length: usize,
    pub max_output_length: usize,
    pub pad_token: String,
    pub eos_token: String,
    /// Name of the logits output in the ONNX graph.
    pub logits_output: String,
    /// Wall-clock limit for a single decode. `None` disables it.
    pub request_timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_input_length: 512,
            max_output_length: 50,
            pad_token: "<pad>".to_string(),
            eos_token: "</s>".to_string(),
            logits_output: "logits".to_string(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub artifacts: ArtifactConfig,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::load("config", format!("{}: {e}", path.display())))?;
        serde_json::from_reader::<File, ServiceConfig>(file)
            .map_err(|e| Error::load("config", format!("{}: {e}", path.display())))
    }

    pub fn model_name(&self) -> String {
        self.artifacts
            .model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string())
    }
}
