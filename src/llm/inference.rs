//! Autoregressive decoding over a [`Seq2SeqModel`].
//!
//! Decoding is a two-state machine: every [`GreedyDecoder::step`] runs the
//! model once and either asks to continue or halts with a reason. The loop
//! around it lives in [`DecodingStrategy::decode`], so another strategy can be
//! dropped in behind the same trait without the request handler noticing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::{IndexOp, Tensor};

use crate::error::{Error, Result};
use crate::llm::models::{EncoderInput, Seq2SeqModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The end-of-sequence id was produced. It is kept as the last generated token.
    EndOfSequence,
    LengthLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halt(HaltReason),
}

/// Per-request decoding state. Never shared between requests.
#[derive(Debug)]
pub struct DecodingState<'a> {
    input: &'a EncoderInput,
    decoder_context: Vec<i64>,
    generated: Vec<u32>,
}

impl<'a> DecodingState<'a> {
    pub fn new(input: &'a EncoderInput, start_id: u32) -> Self {
        Self {
            input,
            decoder_context: vec![start_id as i64],
            generated: Vec::new(),
        }
    }

    pub fn decoder_context(&self) -> &[i64] {
        &self.decoder_context
    }

    pub fn generated(&self) -> &[u32] {
        &self.generated
    }

    fn finish(self, halt: HaltReason) -> Generation {
        Generation {
            tokens: self.generated,
            halt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub tokens: Vec<u32>,
    pub halt: HaltReason,
}

/// Deadline and cancellation checked before every model invocation.
#[derive(Debug, Clone, Default)]
pub struct DecodeControl {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl DecodeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn check(&self, steps: usize) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled { steps });
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::Timeout { steps });
        }
        Ok(())
    }
}

pub trait DecodingStrategy: Send + Sync {
    fn decode(
        &self,
        model: &dyn Seq2SeqModel,
        input: &EncoderInput,
        control: &DecodeControl,
    ) -> Result<Generation>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyDecoder {
    pub pad_id: u32,
    pub eos_id: u32,
    pub max_output_length: usize,
}

impl GreedyDecoder {
    pub fn new(pad_id: u32, eos_id: u32, max_output_length: usize) -> Self {
        Self {
            pad_id,
            eos_id,
            max_output_length,
        }
    }

    pub fn step(&self, model: &dyn Seq2SeqModel, state: &mut DecodingState<'_>) -> Result<Step> {
        let logits = model.forward(state.input, &state.decoder_context)?;
        let next_id = last_position_argmax(&logits)?;

        state.generated.push(next_id);
        if next_id == self.eos_id {
            return Ok(Step::Halt(HaltReason::EndOfSequence));
        }

        state.decoder_context.push(next_id as i64);
        if state.generated.len() >= self.max_output_length {
            return Ok(Step::Halt(HaltReason::LengthLimit));
        }
        Ok(Step::Continue)
    }
}

impl DecodingStrategy for GreedyDecoder {
    fn decode(
        &self,
        model: &dyn Seq2SeqModel,
        input: &EncoderInput,
        control: &DecodeControl,
    ) -> Result<Generation> {
        let mut state = DecodingState::new(input, self.pad_id);
        if self.max_output_length == 0 {
            return Ok(state.finish(HaltReason::LengthLimit));
        }

        loop {
            control.check(state.generated.len())?;
            match self.step(model, &mut state)? {
                Step::Continue => continue,
                Step::Halt(reason) => {
                    tracing::debug!(?reason, tokens = state.generated.len(), "decoding halted");
                    return Ok(state.finish(reason));
                }
            }
        }
    }
}

/// Index of the largest logit at the last decoder position (first index on ties).
pub fn last_position_argmax(logits: &Tensor) -> Result<u32> {
    let (batch, positions, vocab) = logits
        .dims3()
        .map_err(|e| Error::inference(format!("logits must be (batch, positions, vocab): {e}")))?;
    if batch != 1 || positions == 0 || vocab == 0 {
        return Err(Error::inference(format!(
            "unexpected logits shape ({batch}, {positions}, {vocab})"
        )));
    }

    let next_token = logits.i((0, positions - 1))?.argmax(0)?.to_scalar::<u32>()?;
    Ok(next_token)
}
