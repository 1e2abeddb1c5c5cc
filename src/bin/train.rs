//! Two-stage training on synthetic interaction data
//!
//! Stage one pretrains a full encoder-decoder pair and checkpoints it. Stage
//! two builds a fresh engine with the same geometry, transfers only the
//! pretrained decoder, and trains the new encoder against the frozen decoder.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin train --release
//! ```

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::{Device, Kind, Tensor};

use motion_forecast::{Seq2Seq, Seq2SeqConfig, TrainableScope};

const KEYPOINTS: i64 = 6;
const CONTEXT_SIZE: i64 = 12;
const HIDDEN_UNITS: i64 = 64;
const BATCH_SIZE: i64 = 8;
const INP_LENGTH: i64 = 12;
const TIME_STEPS: i64 = 12;
const LEARNING_RATE: f64 = 1e-3;
const PRETRAIN_STEPS: usize = 200;
const TRANSFER_STEPS: usize = 200;
const PRETRAIN_DIR: &str = "checkpoints/pretrain";
const CHECKPOINT_DIR: &str = "checkpoints/seq2seq";

/// Generate one training window pair of smooth sinusoidal trajectories
///
/// Every channel is a sine wave with a random phase and frequency, sampled
/// continuously across the input/target boundary so the future actually
/// depends on the past.
fn synthetic_windows(rng: &mut StdRng) -> (Tensor, Tensor) {
    let width = KEYPOINTS + CONTEXT_SIZE;
    let total = INP_LENGTH + TIME_STEPS;

    let mut values = Vec::with_capacity((BATCH_SIZE * total * width) as usize);
    for _ in 0..BATCH_SIZE {
        let params: Vec<(f32, f32)> = (0..width)
            .map(|_| (rng.gen_range(0.1..0.5), rng.gen_range(0.0..std::f32::consts::TAU)))
            .collect();
        for t in 0..total {
            for &(freq, phase) in &params {
                values.push((freq * t as f32 + phase).sin());
            }
        }
    }

    let full = Tensor::from_slice(&values)
        .reshape([BATCH_SIZE, total, width])
        .to_kind(Kind::Float)
        .to_device(Device::cuda_if_available());
    let input = full.narrow(1, 0, INP_LENGTH);
    let target = full.narrow(1, INP_LENGTH, TIME_STEPS);
    (input, target)
}

fn base_config() -> Seq2SeqConfig {
    Seq2SeqConfig::new()
        .keypoints(KEYPOINTS)
        .context_size(CONTEXT_SIZE)
        .enc_units(HIDDEN_UNITS)
        .dec_units(HIDDEN_UNITS)
        .batch_size(BATCH_SIZE)
        .learning_rate(LEARNING_RATE)
        .inp_length(INP_LENGTH)
        .time_steps(TIME_STEPS)
        .autoregressive(true)
}

fn train_loop(
    model: &mut Seq2Seq<motion_forecast::GruEncoder, motion_forecast::AttentionDecoder>,
    steps: usize,
    rng: &mut StdRng,
) -> Result<()> {
    for step in 0..steps {
        let (input, target) = synthetic_windows(rng);
        let stats = model.train_step(&input, &target)?;
        if step % 20 == 0 {
            tracing::info!(
                "  step {:4}/{} | loss: {:.6}",
                step + 1,
                steps,
                stats.reconstruction_loss
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut rng = StdRng::seed_from_u64(42);

    // Stage one: pretrain the full pair so the decoder learns the output
    // dynamics.
    tracing::info!("Stage 1: pretraining encoder and decoder");
    let pretrain_config = base_config()
        .trainable(TrainableScope::EncoderAndDecoder)
        .checkpoint_dir(PRETRAIN_DIR);
    let mut pretrained = Seq2Seq::from_config(pretrain_config)?;
    train_loop(&mut pretrained, PRETRAIN_STEPS, &mut rng)?;
    let index = pretrained.save_checkpoint(PRETRAIN_DIR)?;
    tracing::info!("Pretraining done, saved checkpoint {index} under {PRETRAIN_DIR}");

    // Stage two: fresh engine, transferred decoder, encoder-only updates.
    tracing::info!("Stage 2: transferring the decoder, training a new encoder");
    let transfer_config = base_config()
        .trainable(TrainableScope::Encoder)
        .checkpoint_dir(CHECKPOINT_DIR)
        .pretrained_dir(PRETRAIN_DIR);
    let mut model = Seq2Seq::from_config(transfer_config)?;
    model.load_pretrained_decoder(PRETRAIN_DIR)?;
    train_loop(&mut model, TRANSFER_STEPS, &mut rng)?;
    let index = model.save_checkpoint(CHECKPOINT_DIR)?;
    tracing::info!("Transfer training done, saved checkpoint {index} under {CHECKPOINT_DIR}");

    Ok(())
}
