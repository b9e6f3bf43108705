#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use candle_core::{Device, Tensor};
use rustqa_serve::config::ServiceConfig;
use rustqa_serve::llm::models::{EncoderInput, Seq2SeqModel};
use rustqa_serve::llm::tokenizer::{TextCodec, TOKENIZER_FILE};
use rustqa_serve::provision::ArtifactSource;
use rustqa_serve::{Error, Result};

pub const PAD: u32 = 0;
pub const EOS: u32 = 1;
pub const VOCAB_SIZE: usize = 12;

/// A WordLevel tokenizer shaped like T5's: `</s>` appended to every sequence.
pub const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 1, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 2, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": {
    "type": "TemplateProcessing",
    "single": [
      {"Sequence": {"id": "A", "type_id": 0}},
      {"SpecialToken": {"id": "</s>", "type_id": 0}}
    ],
    "pair": [
      {"Sequence": {"id": "A", "type_id": 0}},
      {"SpecialToken": {"id": "</s>", "type_id": 0}},
      {"Sequence": {"id": "B", "type_id": 0}},
      {"SpecialToken": {"id": "</s>", "type_id": 0}}
    ],
    "special_tokens": {
      "</s>": {"id": "</s>", "ids": [1], "tokens": ["</s>"]}
    }
  },
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "<pad>": 0, "</s>": 1, "<unk>": 2, "What": 3, "4": 4, "is": 5,
      "2": 6, "+": 7, "?": 8, "the": 9, "answer": 10, "four": 11
    },
    "unk_token": "<unk>"
  }
}"#;

pub fn write_tokenizer(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(TOKENIZER_FILE), TOKENIZER_JSON).unwrap();
}

pub fn config(max_output_length: usize) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.generation.max_output_length = max_output_length;
    config
}

pub fn codec(config: &ServiceConfig) -> TextCodec {
    let dir = tempfile::tempdir().unwrap();
    write_tokenizer(dir.path());
    TextCodec::from_dir(dir.path(), &config.generation).unwrap()
}

/// Deterministic stand-in for the ONNX session.
///
/// At decoder position `p` the logits favour `script[p]` (the last entry is
/// repeated past the end), and every decoder context it is called with is
/// recorded.
pub struct ScriptedModel {
    script: Vec<u32>,
    calls: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_log(&self) -> Arc<Mutex<Vec<Vec<i64>>>> {
        Arc::clone(&self.calls)
    }
}

impl Seq2SeqModel for ScriptedModel {
    fn forward(&self, input: &EncoderInput, decoder_input_ids: &[i64]) -> Result<Tensor> {
        assert_eq!(input.input_ids().len(), input.attention_mask().len());
        self.calls.lock().unwrap().push(decoder_input_ids.to_vec());

        let positions = decoder_input_ids.len();
        let mut data = vec![0f32; positions * VOCAB_SIZE];
        for p in 0..positions {
            let favoured = self.script[p.min(self.script.len() - 1)] as usize;
            data[p * VOCAB_SIZE + favoured] = 10.0;
        }
        Ok(Tensor::from_vec(data, (1, positions, VOCAB_SIZE), &Device::Cpu)?)
    }
}

/// Fails the first `failures` calls, then answers `4, </s>`.
pub struct FlakyModel {
    failures: usize,
    calls: AtomicUsize,
    inner: ScriptedModel,
}

impl FlakyModel {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            inner: ScriptedModel::new(vec![4, EOS]),
        }
    }
}

impl Seq2SeqModel for FlakyModel {
    fn forward(&self, input: &EncoderInput, decoder_input_ids: &[i64]) -> Result<Tensor> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(Error::inference("input name mismatch: decoder_input_ids"));
        }
        self.inner.forward(input, decoder_input_ids)
    }
}

/// Writes fixed bytes and counts how often it was asked to.
pub struct CountingSource {
    payloads: Vec<(String, Vec<u8>)>,
    fetches: AtomicUsize,
}

impl CountingSource {
    pub fn new(payloads: Vec<(&str, Vec<u8>)>) -> Self {
        Self {
            payloads: payloads
                .into_iter()
                .map(|(id, bytes)| (id.to_string(), bytes))
                .collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn fetch(&self, identifier: &str, destination: &Path) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (_, bytes) = self
            .payloads
            .iter()
            .find(|(id, _)| id == identifier)
            .ok_or_else(|| Error::provisioning(destination, format!("unknown id {identifier}")))?;
        std::fs::write(destination, bytes)?;
        Ok(())
    }
}

/// Zip up `(name, contents)` pairs in memory.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
