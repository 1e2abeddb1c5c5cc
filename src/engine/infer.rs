//! Autoregressive and ground-truth-fed inference
//!
//! Inference reuses the training path's encode step and rollout routine; the
//! only differences are the evaluation-mode flag and the input-composition
//! policy. Everything runs without gradient tracking.

use anyhow::{ensure, Result};
use tch::Tensor;

use super::rollout::{self, Autoregressive, ComposeInput, GroundTruthContext, SelfFeedback};
use super::Seq2Seq;
use crate::data::check_sequence;
use crate::model::{Decode, Encode};

impl<E, D> Seq2Seq<E, D>
where
    E: Encode,
    D: Decode,
{
    /// Predict the subject agent's future over the target window
    ///
    /// # Arguments
    ///
    /// * `input_seq` - Encoder input window `(batch, inp_length, encoder_input_size)`
    /// * `target_seq` - Future window `(batch, time_steps, feature)` supplying
    ///   the other agents' ground-truth context (and, in ground-truth mode,
    ///   the full decoder input)
    /// * `autoregressive` - Feed the subject channel back from the model's own
    ///   predictions instead of drawing everything from `target_seq`
    ///
    /// # Returns
    /// Predicted sequence of shape `(batch, time_steps, output_size)`.
    pub fn run_inference(
        &self,
        input_seq: &Tensor,
        target_seq: &Tensor,
        autoregressive: bool,
    ) -> Result<Tensor> {
        let output_size = self.decoder.output_size();
        let (in_batch, in_len) =
            check_sequence(input_seq, self.encoder.input_size(), "input sequence")?;
        let target_size = target_seq.size();
        ensure!(
            target_size.len() == 3 && target_size[1] >= 1,
            "target sequence must be rank-3 with at least one timestep, got {target_size:?}"
        );
        ensure!(
            target_size[0] == in_batch,
            "input batch {} does not match target batch {}",
            in_batch,
            target_size[0]
        );
        ensure!(
            target_size[2] >= output_size,
            "target feature width {} is narrower than the predicted width {}",
            target_size[2],
            output_size
        );
        ensure!(
            in_len == self.config.inp_length,
            "input window length {} does not match configured inp_length {}",
            in_len,
            self.config.inp_length
        );
        let time_steps = target_size[1];
        ensure!(
            time_steps == self.config.time_steps,
            "target window length {} does not match configured time_steps {}",
            time_steps,
            self.config.time_steps
        );

        let auto_composer;
        let gt_composer;
        let composer: &dyn ComposeInput = if autoregressive {
            ensure!(
                input_seq.size()[2] >= output_size,
                "autoregressive inference needs the subject channel in the input sequence"
            );
            auto_composer = Autoregressive { input_seq, target: target_seq, output_size };
            &auto_composer
        } else {
            gt_composer = GroundTruthContext { target: target_seq, output_size };
            &gt_composer
        };

        tch::no_grad(|| {
            let (enc_output, enc_hidden) = self.encode(input_seq, false);
            let mut trace = Vec::with_capacity(time_steps as usize);
            rollout::run(&self.decoder, &enc_output, &enc_hidden, time_steps, composer, false, |_, prediction| {
                trace.push(prediction.unsqueeze(1));
            })?;
            Ok(Tensor::cat(&trace, 1))
        })
    }

    /// Generate a sequence by pure self-feedback
    ///
    /// The first decoder input is a zero frame; every later input is the
    /// previous prediction. Used when no ground-truth context exists at all,
    /// so the decoder input width must equal its output width.
    pub fn generate(&self, input_seq: &Tensor, time_steps: i64) -> Result<Tensor> {
        ensure!(
            self.decoder.input_size() == self.decoder.output_size(),
            "self-feedback generation requires decoder input width {} to equal output width {}",
            self.decoder.input_size(),
            self.decoder.output_size()
        );
        let (batch, in_len) =
            check_sequence(input_seq, self.encoder.input_size(), "input sequence")?;
        ensure!(
            in_len == self.config.inp_length,
            "input window length {} does not match configured inp_length {}",
            in_len,
            self.config.inp_length
        );
        ensure!(time_steps >= 1, "generation requires at least one timestep, got {time_steps}");

        let zero_frame = Tensor::zeros(
            [batch, self.decoder.input_size()],
            (tch::Kind::Float, input_seq.device()),
        );

        tch::no_grad(|| {
            let (enc_output, enc_hidden) = self.encode(input_seq, false);
            let mut trace = Vec::with_capacity(time_steps as usize);
            let composer = SelfFeedback { zero_frame: &zero_frame };
            rollout::run(&self.decoder, &enc_output, &enc_hidden, time_steps, &composer, false, |_, prediction| {
                trace.push(prediction.unsqueeze(1));
            })?;
            Ok(Tensor::cat(&trace, 1))
        })
    }
}

#[cfg(test)]
mod tests {
    use tch::{Device, Kind};

    use super::*;
    use crate::config::Seq2SeqConfig;
    use crate::engine::Seq2Seq;

    fn forecasting_config(autoregressive: bool) -> Seq2SeqConfig {
        Seq2SeqConfig::new()
            .keypoints(3)
            .context_size(6)
            .enc_units(16)
            .dec_units(16)
            .batch_size(1)
            .inp_length(4)
            .time_steps(5)
            .autoregressive(autoregressive)
    }

    #[test]
    fn test_inference_shape_law() {
        for auto in [true, false] {
            let model = Seq2Seq::from_config(forecasting_config(auto)).unwrap();
            let input =
                Tensor::randn([1, 4, model.encoder().input_size()], (Kind::Float, Device::Cpu));
            let target = Tensor::randn([1, 5, 9], (Kind::Float, Device::Cpu));

            let predicted = model.run_inference(&input, &target, auto).unwrap();
            assert_eq!(predicted.size(), vec![1, 5, 3]);
            assert!(!predicted.requires_grad());
        }
    }

    #[test]
    fn test_generate_shape() {
        let config = Seq2SeqConfig::new()
            .keypoints(4)
            .context_size(0)
            .enc_units(16)
            .dec_units(16)
            .batch_size(2)
            .inp_length(3);
        let model = Seq2Seq::from_config(config).unwrap();
        let input = Tensor::randn([2, 3, 4], (Kind::Float, Device::Cpu));

        let generated = model.generate(&input, 7).unwrap();
        assert_eq!(generated.size(), vec![2, 7, 4]);
    }

    #[test]
    fn test_inference_rejects_malformed_windows() {
        let model = Seq2Seq::from_config(forecasting_config(true)).unwrap();

        // Wrong encoder width
        let input = Tensor::randn([1, 4, 5], (Kind::Float, Device::Cpu));
        let target = Tensor::randn([1, 5, 9], (Kind::Float, Device::Cpu));
        assert!(model.run_inference(&input, &target, true).is_err());

        // Target narrower than the predicted width
        let input = Tensor::randn([1, 4, 9], (Kind::Float, Device::Cpu));
        let target = Tensor::randn([1, 5, 2], (Kind::Float, Device::Cpu));
        assert!(model.run_inference(&input, &target, true).is_err());
    }

    #[test]
    fn test_window_lengths_checked_against_config() {
        // Configured for inp_length 4, time_steps 5
        let model = Seq2Seq::from_config(forecasting_config(true)).unwrap();

        // Input window shorter than the configured inp_length
        let input = Tensor::randn([1, 3, 9], (Kind::Float, Device::Cpu));
        let target = Tensor::randn([1, 5, 9], (Kind::Float, Device::Cpu));
        assert!(model.run_inference(&input, &target, true).is_err());

        // Target window longer than the configured time_steps
        let input = Tensor::randn([1, 4, 9], (Kind::Float, Device::Cpu));
        let target = Tensor::randn([1, 6, 9], (Kind::Float, Device::Cpu));
        assert!(model.run_inference(&input, &target, true).is_err());

        // Generation checks the input window too
        let config = Seq2SeqConfig::new()
            .keypoints(4)
            .context_size(0)
            .enc_units(16)
            .dec_units(16)
            .inp_length(3);
        let model = Seq2Seq::from_config(config).unwrap();
        let input = Tensor::randn([1, 5, 4], (Kind::Float, Device::Cpu));
        assert!(model.generate(&input, 4).is_err());
    }

    #[test]
    fn test_generate_requires_matching_widths() {
        // Forecasting decoder consumes 9-wide frames but predicts 3-wide ones
        let model = Seq2Seq::from_config(forecasting_config(true)).unwrap();
        let input = Tensor::randn([1, 4, 9], (Kind::Float, Device::Cpu));

        assert!(model.generate(&input, 5).is_err());
    }
}
