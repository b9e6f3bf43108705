use std::time::Duration;

use tracing::info;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::llm::inference::{DecodeControl, DecodingStrategy, GreedyDecoder};
use crate::llm::models::{OnnxSeq2Seq, Seq2SeqModel};
use crate::llm::tokenizer::TextCodec;
use crate::provision::Provisioned;

/// Everything a request needs, built once at startup and read-only afterwards.
pub struct AppState {
    pub model: Box<dyn Seq2SeqModel>,
    pub codec: TextCodec,
    pub decoder: Box<dyn DecodingStrategy>,
    pub model_name: String,
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn load(paths: &Provisioned, config: &ServiceConfig) -> Result<Self> {
        let generation = &config.generation;
        let model = OnnxSeq2Seq::load(&paths.model_path, &generation.logits_output)?;
        let codec = TextCodec::from_dir(&paths.tokenizer_dir, generation)?;
        info!(
            pad_id = codec.pad_id(),
            eos_id = codec.eos_id(),
            "Loaded tokenizer from {}",
            paths.tokenizer_dir.display()
        );

        Ok(Self::new(Box::new(model), codec, config))
    }

    /// Assemble a state around an already constructed model, e.g. a stub in tests.
    pub fn new(model: Box<dyn Seq2SeqModel>, codec: TextCodec, config: &ServiceConfig) -> Self {
        let decoder = GreedyDecoder::new(
            codec.pad_id(),
            codec.eos_id(),
            config.generation.max_output_length,
        );
        Self {
            model,
            codec,
            decoder: Box::new(decoder),
            model_name: config.model_name(),
            request_timeout: config.generation.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn decode_control(&self) -> DecodeControl {
        match self.request_timeout {
            Some(timeout) => DecodeControl::new().with_timeout(timeout),
            None => DecodeControl::new(),
        }
    }

    /// Encode `question`, decode an answer and turn it back into text.
    ///
    /// Blocking: callers on an async runtime should move this onto a blocking thread.
    pub fn answer(&self, question: &str, control: &DecodeControl) -> Result<String> {
        let input = self.codec.encode(question)?;
        let generation = self.decoder.decode(self.model.as_ref(), &input, control)?;
        tracing::debug!(
            input_tokens = input.len(),
            output_tokens = generation.tokens.len(),
            halt = ?generation.halt,
            "generated"
        );
        self.codec.decode(&generation.tokens)
    }
}
