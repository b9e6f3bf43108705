use std::path::Path;

use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::llm::models::EncoderInput;

pub const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct TextCodec {
    tokenizer: Tokenizer,
    pad_id: u32,
    eos_id: u32,
}

impl TextCodec {
    pub fn from_dir(dir: &Path, config: &GenerationConfig) -> Result<Self> {
        let path = dir.join(TOKENIZER_FILE);
        let tokenizer = Tokenizer::from_file(&path)
            .map_err(|e| Error::load("tokenizer", format!("{}: {e}", path.display())))?;
        Self::new(tokenizer, config)
    }

    pub fn new(mut tokenizer: Tokenizer, config: &GenerationConfig) -> Result<Self> {
        let pad_id = special_id(&tokenizer, &config.pad_token)?;
        let eos_id = special_id(&tokenizer, &config.eos_token)?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_input_length,
                ..Default::default()
            }))
            .map_err(|e| Error::load("tokenizer", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            pad_id,
            pad_token: config.pad_token.clone(),
            ..Default::default()
        }));

        Ok(Self {
            tokenizer,
            pad_id,
            eos_id,
        })
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn eos_id(&self) -> u32 {
        self.eos_id
    }

    pub fn encode(&self, text: &str) -> Result<EncoderInput> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::inference(format!("encode: {e}")))?;

        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mut attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        // The encoder cannot take a zero-length sequence.
        if input_ids.is_empty() {
            input_ids.push(self.eos_id as i64);
            attention_mask.push(1);
        }

        EncoderInput::new(input_ids, attention_mask)
    }

    /// Text for `ids` with padding, end markers and other special tokens dropped.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::inference(format!("decode: {e}")))
    }
}

fn special_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| Error::load("tokenizer", format!("vocabulary has no `{token}` token")))
}
