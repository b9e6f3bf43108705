//! Greedy decoding against scripted models.

mod common;

use common::{FlakyModel, ScriptedModel, EOS, PAD};
use rustqa_serve::llm::inference::{
    DecodeControl, DecodingState, DecodingStrategy, GreedyDecoder, HaltReason, Step,
};
use rustqa_serve::llm::models::EncoderInput;
use rustqa_serve::Error;

fn question() -> EncoderInput {
    EncoderInput::new(vec![3, 5, 6, 7, 6, 8, 1], vec![1; 7]).unwrap()
}

#[test]
fn test_halts_on_eos_and_keeps_it() {
    let model = ScriptedModel::new(vec![4, EOS]);
    let decoder = GreedyDecoder::new(PAD, EOS, 50);

    let generation = decoder
        .decode(&model, &question(), &DecodeControl::new())
        .unwrap();

    assert_eq!(generation.tokens, vec![4, EOS]);
    assert_eq!(generation.halt, HaltReason::EndOfSequence);
    // No model call after the step that produced eos.
    assert_eq!(model.call_log().lock().unwrap().len(), 2);
}

#[test]
fn test_never_eos_stops_at_length_limit() {
    let model = ScriptedModel::new(vec![9, 10, 11]);
    let decoder = GreedyDecoder::new(PAD, EOS, 6);

    let generation = decoder
        .decode(&model, &question(), &DecodeControl::new())
        .unwrap();

    assert_eq!(generation.tokens, vec![9, 10, 11, 11, 11, 11]);
    assert_eq!(generation.halt, HaltReason::LengthLimit);
    assert!(!generation.tokens.contains(&EOS));
    assert_eq!(model.call_log().lock().unwrap().len(), 6);
}

#[test]
fn test_decoder_context_grows_by_one_per_step() {
    let model = ScriptedModel::new(vec![4, 9, 10, EOS]);
    let decoder = GreedyDecoder::new(PAD, EOS, 50);

    decoder
        .decode(&model, &question(), &DecodeControl::new())
        .unwrap();

    let calls = model.call_log().lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            vec![PAD as i64],
            vec![PAD as i64, 4],
            vec![PAD as i64, 4, 9],
            vec![PAD as i64, 4, 9, 10],
        ]
    );
}

#[test]
fn test_step_state_machine() {
    let model = ScriptedModel::new(vec![4, 9, EOS]);
    let decoder = GreedyDecoder::new(PAD, EOS, 50);
    let input = question();
    let mut state = DecodingState::new(&input, PAD);

    assert_eq!(state.decoder_context(), &[PAD as i64]);
    assert!(state.generated().is_empty());

    for i in 1..=2 {
        assert_eq!(decoder.step(&model, &mut state).unwrap(), Step::Continue);
        assert_eq!(state.decoder_context().len(), i + 1);
        assert_eq!(state.generated().len(), i);
    }

    assert_eq!(
        decoder.step(&model, &mut state).unwrap(),
        Step::Halt(HaltReason::EndOfSequence)
    );
    assert_eq!(state.generated(), &[4, 9, EOS]);
}

#[test]
fn test_decoding_is_deterministic() {
    let decoder = GreedyDecoder::new(PAD, EOS, 20);
    let first = decoder
        .decode(&ScriptedModel::new(vec![11, 4, 10, 4]), &question(), &DecodeControl::new())
        .unwrap();
    let second = decoder
        .decode(&ScriptedModel::new(vec![11, 4, 10, 4]), &question(), &DecodeControl::new())
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_output_never_exceeds_bound() {
    for bound in [1, 2, 7, 50] {
        let model = ScriptedModel::new(vec![4]);
        let generation = GreedyDecoder::new(PAD, EOS, bound)
            .decode(&model, &question(), &DecodeControl::new())
            .unwrap();
        assert_eq!(generation.tokens.len(), bound);
        assert_eq!(model.call_log().lock().unwrap().len(), bound);
    }
}

#[test]
fn test_zero_length_bound_never_calls_model() {
    let model = ScriptedModel::new(vec![4]);
    let generation = GreedyDecoder::new(PAD, EOS, 0)
        .decode(&model, &question(), &DecodeControl::new())
        .unwrap();
    assert!(generation.tokens.is_empty());
    assert!(model.call_log().lock().unwrap().is_empty());
}

#[test]
fn test_inference_failure_fails_the_decode() {
    let err = GreedyDecoder::new(PAD, EOS, 50)
        .decode(&FlakyModel::new(1), &question(), &DecodeControl::new())
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}

#[test]
fn test_cancelled_decode_stops() {
    let control = DecodeControl::new();
    control.cancel();
    let model = ScriptedModel::new(vec![4]);
    let err = GreedyDecoder::new(PAD, EOS, 50)
        .decode(&model, &question(), &control)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { steps: 0 }));
    assert!(model.call_log().lock().unwrap().is_empty());
}
