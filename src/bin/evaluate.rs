//! Evaluate a trained forecasting checkpoint on synthetic held-out data
//!
//! Restores the latest checkpoint written by the `train` binary and runs the
//! evaluation harness over freshly generated interaction sequences. A missing
//! or mismatched checkpoint is fatal.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin evaluate --release
//! ```

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::{Device, Kind, Tensor};

use motion_forecast::{
    Evaluator, LogMetricsSink, NullVisualizer, Seq2Seq, Seq2SeqConfig, SequenceBatch,
};

const KEYPOINTS: i64 = 6;
const CONTEXT_SIZE: i64 = 12;
const HIDDEN_UNITS: i64 = 64;
const INP_LENGTH: i64 = 12;
const TIME_STEPS: i64 = 12;
const CHECKPOINT_DIR: &str = "checkpoints/seq2seq";
const EVAL_BATCHES: usize = 4;
const SAMPLES_PER_BATCH: i64 = 8;

/// Generate one held-out batch of sinusoidal agent trajectories
fn synthetic_batch(rng: &mut StdRng) -> Result<SequenceBatch> {
    let total = INP_LENGTH + TIME_STEPS;

    let mut agent = |width: i64| -> Tensor {
        let mut values = Vec::with_capacity((SAMPLES_PER_BATCH * total * width) as usize);
        for _ in 0..SAMPLES_PER_BATCH {
            let params: Vec<(f32, f32)> = (0..width)
                .map(|_| (rng.gen_range(0.1..0.5), rng.gen_range(0.0..std::f32::consts::TAU)))
                .collect();
            for t in 0..total {
                for &(freq, phase) in &params {
                    values.push((freq * t as f32 + phase).sin());
                }
            }
        }
        Tensor::from_slice(&values)
            .reshape([SAMPLES_PER_BATCH, total, width])
            .to_kind(Kind::Float)
            .to_device(Device::cuda_if_available())
    };

    let subject = agent(KEYPOINTS);
    let left = agent(CONTEXT_SIZE / 2);
    let right = agent(CONTEXT_SIZE / 2);
    SequenceBatch::new(subject, left, right)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Seq2SeqConfig::new()
        .keypoints(KEYPOINTS)
        .context_size(CONTEXT_SIZE)
        .enc_units(HIDDEN_UNITS)
        .dec_units(HIDDEN_UNITS)
        .inp_length(INP_LENGTH)
        .time_steps(TIME_STEPS)
        .autoregressive(true)
        .checkpoint_dir(CHECKPOINT_DIR);

    let mut model = Seq2Seq::from_config(config)?;
    model.restore_full(CHECKPOINT_DIR)?;
    tracing::info!("Restored model from {CHECKPOINT_DIR}");

    let mut rng = StdRng::seed_from_u64(7);
    let mut batches = Vec::with_capacity(EVAL_BATCHES);
    for _ in 0..EVAL_BATCHES {
        batches.push(synthetic_batch(&mut rng)?);
    }

    let mut visualizer = NullVisualizer;
    let mut metrics = LogMetricsSink;
    let report = Evaluator::new(&model).run(batches, &mut visualizer, &mut metrics)?;

    tracing::info!(
        "Evaluation complete: {} samples, mean error {:.6}, std {:.6}",
        report.samples,
        report.mean_error,
        report.std_error
    );

    Ok(())
}
