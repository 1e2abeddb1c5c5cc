//! Evaluation harness
//!
//! Drives batched inference over a held-out dataset, computes per-sample
//! error, and forwards artifacts to the visualization and metrics-export
//! collaborators. The harness only orchestrates; rendering and durable
//! metric storage live behind the collaborator traits.

use anyhow::{ensure, Result};
use serde::Serialize;
use tch::{Kind, Tensor};

use crate::data::{drop_subject_channels, split_windows, SequenceBatch};
use crate::engine::Seq2Seq;
use crate::model::{Decode, Encode};

/// Renders ground-truth/prediction triples to some artifact
///
/// Receives per-agent sequences of shape `(time, keypoints)` and an output
/// path stem; the harness never inspects the rendered output.
pub trait Visualizer {
    /// Render one sample window
    fn render(
        &mut self,
        subject: &Tensor,
        left: &Tensor,
        right: &Tensor,
        prediction: Option<&Tensor>,
        stem: &str,
    ) -> Result<()>;
}

/// Visualizer that discards everything
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {
    fn render(
        &mut self,
        _subject: &Tensor,
        _left: &Tensor,
        _right: &Tensor,
        _prediction: Option<&Tensor>,
        _stem: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Receives the per-sample error mapping and summary statistics
pub trait MetricsSink {
    /// Export per-sample errors plus their mean and standard deviation
    fn export(&mut self, per_sample: &[(String, f64)], mean: f64, std: f64) -> Result<()>;
}

/// Metrics sink that reports through the log
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn export(&mut self, per_sample: &[(String, f64)], mean: f64, std: f64) -> Result<()> {
        tracing::info!("evaluation: mean error {:.6}, std {:.6}", mean, std);
        for (id, error) in per_sample {
            tracing::debug!("  {id}: {error:.6}");
        }
        Ok(())
    }
}

/// Summary of one evaluation run
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    /// Mean normalized per-sample error
    pub mean_error: f64,

    /// Population standard deviation of the normalized errors
    pub std_error: f64,

    /// Number of evaluated samples
    pub samples: usize,
}

/// Evaluation harness over a trained engine
pub struct Evaluator<'m, E, D> {
    model: &'m Seq2Seq<E, D>,
}

impl<'m, E, D> Evaluator<'m, E, D>
where
    E: Encode,
    D: Decode,
{
    /// Create a harness around a trained engine
    pub fn new(model: &'m Seq2Seq<E, D>) -> Self {
        Self { model }
    }

    /// Evaluate every sample of every batch
    ///
    /// Each sample's concatenated sequence is split at `inp_length` into an
    /// input window and a target window; in ground-truth-fed mode only the
    /// partner channels of the input window reach the encoder. The per-sample
    /// error is the mean MSE of the predicted subject future, normalized by
    /// `keypoints * result_rows` for the running mean/std.
    pub fn run(
        &self,
        batches: impl IntoIterator<Item = SequenceBatch>,
        visualizer: &mut dyn Visualizer,
        metrics: &mut dyn MetricsSink,
    ) -> Result<EvalReport> {
        let config = self.model.config();
        let keypoints = config.keypoints;
        let inp_length = config.inp_length;
        let auto = config.autoregressive;

        let mut errors = Vec::new();
        let mut per_sample = Vec::new();

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            ensure!(
                batch.keypoints() == keypoints,
                "batch subject width {} does not match configured keypoints {}",
                batch.keypoints(),
                keypoints
            );
            ensure!(
                batch.left.size()[2] + batch.right.size()[2] == config.context_size,
                "partner channel width {} does not match configured context size {}",
                batch.left.size()[2] + batch.right.size()[2],
                config.context_size
            );

            for i in 0..batch.num_samples() {
                let stem = format!("batch_{batch_idx}_sample_{i}");
                let target_len = batch.time_len() - inp_length;

                let subject_future = batch.subject_future(i, inp_length);
                let left_future = batch.left.narrow(0, i, 1).narrow(1, inp_length, target_len);
                let right_future = batch.right.narrow(0, i, 1).narrow(1, inp_length, target_len);

                visualizer.render(
                    &subject_future.squeeze_dim(0),
                    &left_future.squeeze_dim(0),
                    &right_future.squeeze_dim(0),
                    None,
                    &format!("{stem}_input"),
                )?;

                let full = batch.sample_full(i);
                let (input_window, target_window) = split_windows(&full, inp_length)?;
                let input_seq = if auto {
                    input_window
                } else {
                    drop_subject_channels(&input_window, keypoints)
                };

                let predicted = self.model.run_inference(&input_seq, &target_window, auto)?;

                let error: f64 = (&predicted - &subject_future)
                    .pow_tensor_scalar(2)
                    .mean(Kind::Float)
                    .try_into()?;
                let normalized = error / (keypoints * predicted.size()[1]) as f64;

                errors.push(normalized);
                per_sample.push((stem.clone(), error));

                visualizer.render(
                    &subject_future.squeeze_dim(0),
                    &left_future.squeeze_dim(0),
                    &right_future.squeeze_dim(0),
                    Some(&predicted.squeeze_dim(0)),
                    &format!("{stem}_output"),
                )?;

                tracing::debug!("{stem}: error {error:.6} (normalized {normalized:.6})");
            }
        }

        let (mean, std) = mean_std(&errors);
        metrics.export(&per_sample, mean, std)?;
        tracing::info!(
            "evaluated {} samples: mean error {:.6}, std {:.6}",
            errors.len(),
            mean,
            std
        );

        Ok(EvalReport { mean_error: mean, std_error: std, samples: errors.len() })
    }
}

/// Mean and population standard deviation of a sample list
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use tch::Device;

    use super::*;
    use crate::config::Seq2SeqConfig;

    struct CountingVisualizer {
        calls: usize,
        with_prediction: usize,
    }

    impl Visualizer for CountingVisualizer {
        fn render(
            &mut self,
            _subject: &Tensor,
            _left: &Tensor,
            _right: &Tensor,
            prediction: Option<&Tensor>,
            _stem: &str,
        ) -> Result<()> {
            self.calls += 1;
            if prediction.is_some() {
                self.with_prediction += 1;
            }
            Ok(())
        }
    }

    struct CapturingSink {
        exported: Option<(usize, f64, f64)>,
    }

    impl MetricsSink for CapturingSink {
        fn export(&mut self, per_sample: &[(String, f64)], mean: f64, std: f64) -> Result<()> {
            self.exported = Some((per_sample.len(), mean, std));
            Ok(())
        }
    }

    fn eval_batch(samples: i64) -> SequenceBatch {
        let shape = [samples, 8, 3];
        SequenceBatch::new(
            Tensor::randn(shape, (Kind::Float, Device::Cpu)),
            Tensor::randn(shape, (Kind::Float, Device::Cpu)),
            Tensor::randn(shape, (Kind::Float, Device::Cpu)),
        )
        .unwrap()
    }

    #[test]
    fn test_harness_visits_every_sample() {
        let config = Seq2SeqConfig::new()
            .keypoints(3)
            .context_size(6)
            .enc_units(16)
            .dec_units(16)
            .batch_size(1)
            .inp_length(5)
            .time_steps(3)
            .autoregressive(true);
        let model = Seq2Seq::from_config(config).unwrap();

        let mut visualizer = CountingVisualizer { calls: 0, with_prediction: 0 };
        let mut sink = CapturingSink { exported: None };

        let report = Evaluator::new(&model)
            .run(vec![eval_batch(2), eval_batch(1)], &mut visualizer, &mut sink)
            .unwrap();

        assert_eq!(report.samples, 3);
        assert!(report.mean_error >= 0.0);
        assert!(report.std_error >= 0.0);

        // Two renders per sample: ground truth and prediction
        assert_eq!(visualizer.calls, 6);
        assert_eq!(visualizer.with_prediction, 3);

        let (count, mean, _) = sink.exported.unwrap();
        assert_eq!(count, 3);
        assert!(mean.is_finite());
    }

    #[test]
    fn test_harness_rejects_mismatched_widths() {
        let config = Seq2SeqConfig::new()
            .keypoints(4)
            .context_size(6)
            .enc_units(16)
            .dec_units(16)
            .inp_length(5);
        let model = Seq2Seq::from_config(config).unwrap();

        let mut visualizer = NullVisualizer;
        let mut sink = LogMetricsSink;
        let result =
            Evaluator::new(&model).run(vec![eval_batch(1)], &mut visualizer, &mut sink);

        assert!(result.is_err());
    }

    /// Encoder double without a variable store
    struct StubEncoder {
        input_size: i64,
        units: i64,
    }

    impl Encode for StubEncoder {
        fn forward(&self, input: &Tensor, hidden: &Tensor, _train: bool) -> (Tensor, Tensor) {
            let (batch, time) = (input.size()[0], input.size()[1]);
            let output = Tensor::zeros([batch, time, self.units], (Kind::Float, Device::Cpu));
            (output, hidden.shallow_clone())
        }

        fn zero_state(&self, batch_size: i64) -> Tensor {
            Tensor::zeros([1, batch_size, self.units], (Kind::Float, Device::Cpu))
        }

        fn hidden_size(&self) -> i64 {
            self.units
        }

        fn num_layers(&self) -> i64 {
            1
        }

        fn input_size(&self) -> i64 {
            self.input_size
        }
    }

    /// Decoder double without a variable store
    struct StubDecoder {
        input_size: i64,
        output_size: i64,
        units: i64,
    }

    impl Decode for StubDecoder {
        fn forward(
            &self,
            input: &Tensor,
            hidden: &Tensor,
            enc_output: &Tensor,
            _train: bool,
        ) -> (Tensor, Tensor, Tensor) {
            let batch = input.size()[0];
            let prediction = Tensor::zeros([batch, self.output_size], (Kind::Float, Device::Cpu));
            (prediction, hidden.shallow_clone(), enc_output.zeros_like())
        }

        fn output_size(&self) -> i64 {
            self.output_size
        }

        fn input_size(&self) -> i64 {
            self.input_size
        }

        fn hidden_size(&self) -> i64 {
            self.units
        }

        fn num_layers(&self) -> i64 {
            1
        }
    }

    #[test]
    fn test_harness_accepts_inference_only_components() {
        let config = Seq2SeqConfig::new()
            .keypoints(3)
            .context_size(6)
            .enc_units(16)
            .dec_units(16)
            .inp_length(5)
            .time_steps(3)
            .autoregressive(true);
        let encoder = StubEncoder { input_size: 9, units: 16 };
        let decoder = StubDecoder { input_size: 9, output_size: 3, units: 16 };
        let model = Seq2Seq::for_inference(config, encoder, decoder).unwrap();

        let mut visualizer = NullVisualizer;
        let mut sink = CapturingSink { exported: None };
        let report =
            Evaluator::new(&model).run(vec![eval_batch(2)], &mut visualizer, &mut sink).unwrap();

        assert_eq!(report.samples, 2);
        assert!(report.mean_error.is_finite());
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);

        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }
}
