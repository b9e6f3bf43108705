use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use candle_core::{Device, Tensor};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Value;
use tracing::info;

use crate::error::{Error, Result};

const INPUT_NAMES: [&str; 3] = ["input_ids", "attention_mask", "decoder_input_ids"];

/// Tokenized question fed unchanged to the encoder at every decoding step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInput {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl EncoderInput {
    pub fn new(input_ids: Vec<i64>, attention_mask: Vec<i64>) -> Result<Self> {
        if input_ids.len() != attention_mask.len() {
            return Err(Error::inference(format!(
                "attention mask has {} entries for {} input ids",
                attention_mask.len(),
                input_ids.len()
            )));
        }
        Ok(Self {
            input_ids,
            attention_mask,
        })
    }

    pub fn input_ids(&self) -> &[i64] {
        &self.input_ids
    }

    pub fn attention_mask(&self) -> &[i64] {
        &self.attention_mask
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// An encoder/decoder language model evaluated one decoder step at a time.
pub trait Seq2SeqModel: Send + Sync {
    /// Logits for every decoder position, shaped `(1, decoder_input_ids.len(), vocab_size)`.
    fn forward(&self, input: &EncoderInput, decoder_input_ids: &[i64]) -> Result<Tensor>;
}

/// A seq2seq graph exported to ONNX and run through ONNX Runtime.
///
/// Running an `ort` session needs exclusive access, so calls are serialised
/// on a mutex; the lock is held for a single forward pass.
pub struct OnnxSeq2Seq {
    session: Mutex<Session>,
    logits_output: String,
}

impl OnnxSeq2Seq {
    pub fn load(path: &Path, logits_output: &str) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::load("model", format!("{} does not exist", path.display())));
        }

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| Error::load("model", e))?;

        for name in INPUT_NAMES {
            if !session.inputs.iter().any(|input| input.name == name) {
                return Err(Error::load("model", format!("graph has no `{name}` input")));
            }
        }
        if !session.outputs.iter().any(|output| output.name == logits_output) {
            return Err(Error::load(
                "model",
                format!("graph has no `{logits_output}` output"),
            ));
        }

        info!("Loaded ONNX model from {}", path.display());
        Ok(Self {
            session: Mutex::new(session),
            logits_output: logits_output.to_string(),
        })
    }
}

impl Seq2SeqModel for OnnxSeq2Seq {
    fn forward(&self, input: &EncoderInput, decoder_input_ids: &[i64]) -> Result<Tensor> {
        let input_ids = row(input.input_ids())?;
        let attention_mask = row(input.attention_mask())?;
        let decoder_input_ids = row(decoder_input_ids)?;

        let mut session = lock_session(&self.session);

        let outputs = session.run(ort::inputs![
            "input_ids" => Value::from_array(input_ids)?,
            "attention_mask" => Value::from_array(attention_mask)?,
            "decoder_input_ids" => Value::from_array(decoder_input_ids)?,
        ])?;

        let logits = outputs[self.logits_output.as_str()].try_extract_array::<f32>()?;
        let shape = logits.shape().to_vec();
        let data: Vec<f32> = logits.iter().copied().collect();
        Ok(Tensor::from_vec(data, shape, &Device::Cpu)?)
    }
}

// The session keeps no state a panicking run could leave half-updated.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn row(values: &[i64]) -> Result<Array2<i64>> {
    Array2::from_shape_vec((1, values.len()), values.to_vec()).map_err(Error::inference)
}
