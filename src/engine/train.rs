//! Teacher-forced training step
//!
//! One call is one optimizer update: encode the input sequence, unroll the
//! decoder with teacher forcing, accumulate per-timestep MSE inside the
//! autodiff scope, and apply gradients to the trainable parameter groups
//! only. The transferred decoder stays frozen under the default scope because
//! no optimizer is ever built over its variables.

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use tch::{Kind, Reduction, Tensor};

use super::rollout::{self, TeacherForcing};
use super::Seq2Seq;
use crate::data::check_sequence;
use crate::model::{Decode, Encode, Parameterized};

/// Metrics from a single training step
#[derive(Debug, Clone, Serialize)]
pub struct TrainStats {
    /// Per-timestep reconstruction loss, averaged over the rollout
    pub reconstruction_loss: f64,

    /// Number of decoder timesteps in the rollout
    pub time_steps: i64,
}

impl<E, D> Seq2Seq<E, D>
where
    E: Encode + Parameterized,
    D: Decode + Parameterized,
{
    /// Run one teacher-forced training step over a batch
    ///
    /// # Arguments
    ///
    /// * `input_seq` - Encoder input `(batch, inp_length, encoder_input_size)`
    /// * `target_seq` - Ground-truth future frames
    ///   `(batch, time_steps, keypoints + context_size)`; the loss compares
    ///   predictions against the leading `output_size` channels
    ///
    /// # Returns
    /// The averaged reconstruction loss for the step. Gradients flow through
    /// the summed per-step loss; the average is for reporting only. A
    /// non-finite loss is fatal and no update is applied.
    pub fn train_step(&mut self, input_seq: &Tensor, target_seq: &Tensor) -> Result<TrainStats> {
        let output_size = self.decoder.output_size();
        let (in_batch, in_len) =
            check_sequence(input_seq, self.encoder.input_size(), "input sequence")?;
        let (batch, time_steps) = check_sequence(
            target_seq,
            self.config.keypoints + self.config.context_size,
            "target sequence",
        )?;
        ensure!(
            in_batch == batch,
            "input batch {in_batch} does not match target batch {batch}"
        );
        ensure!(
            batch == self.config.batch_size,
            "batch size {} does not match configured batch size {}",
            batch,
            self.config.batch_size
        );
        ensure!(
            in_len == self.config.inp_length,
            "input window length {} does not match configured inp_length {}",
            in_len,
            self.config.inp_length
        );
        ensure!(
            time_steps == self.config.time_steps,
            "target window length {} does not match configured time_steps {}",
            time_steps,
            self.config.time_steps
        );

        let (enc_output, enc_hidden) = self.encode(input_seq, true);

        // When the decoder sees only partner context, the subject channels of
        // each fed-back frame are dropped before it.
        let skip = (self.config.keypoints + self.config.context_size) - self.decoder.input_size();
        ensure!(
            skip >= 0,
            "decoder input width {} exceeds the target frame width {}",
            self.decoder.input_size(),
            self.config.keypoints + self.config.context_size
        );

        let mut total = Tensor::zeros([], (Kind::Float, target_seq.device()));
        rollout::run(
            &self.decoder,
            &enc_output,
            &enc_hidden,
            time_steps,
            &TeacherForcing { target: target_seq, skip },
            true,
            |t, prediction| {
                let truth = target_seq.select(1, t).narrow(1, 0, output_size);
                let step_loss = prediction.mse_loss(&truth, Reduction::Mean);
                total = &total + step_loss;
            },
        )?;

        let reconstruction_loss =
            f64::try_from(&total).context("failed to read loss value")? / time_steps as f64;
        ensure!(
            reconstruction_loss.is_finite(),
            "non-finite reconstruction loss {reconstruction_loss}; aborting before the update"
        );

        for optimizer in &mut self.optimizers {
            optimizer.zero_grad();
        }
        total.backward();
        for optimizer in &mut self.optimizers {
            optimizer.step();
        }

        tracing::debug!(
            "train step: reconstruction_loss={:.6} over {} timesteps",
            reconstruction_loss,
            time_steps
        );
        Ok(TrainStats { reconstruction_loss, time_steps })
    }
}
