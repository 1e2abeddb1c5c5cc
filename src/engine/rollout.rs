//! Shared decoder rollout
//!
//! Training and inference both unroll the decoder one timestep at a time; the
//! only difference between them is how each step's input is composed. The
//! rollout here is a single routine parameterized by an input-composition
//! policy, which keeps hidden-state propagation structurally identical across
//! the teacher-forced, autoregressive, and ground-truth-fed paths.

use anyhow::{ensure, Result};
use tch::Tensor;

use crate::model::Decode;

/// Input-composition policy for one rollout
///
/// `prev` is the prediction from step `t - 1` (`None` at `t = 0`).
pub(crate) trait ComposeInput {
    /// Compose the decoder input for step `t`, shape `(batch, input_size)`
    fn compose(&self, t: i64, prev: Option<&Tensor>) -> Tensor;
}

/// Training policy: zeros at `t = 0`, then the ground-truth target at `t - 1`
///
/// The decoder never sees its own prior prediction during training. `skip`
/// drops that many leading channels from each target frame; it is zero for
/// reconstruction setups (the decoder consumes whole target frames) and the
/// predicted width for ground-truth-fed forecasting setups.
pub(crate) struct TeacherForcing<'a> {
    pub target: &'a Tensor,
    pub skip: i64,
}

impl ComposeInput for TeacherForcing<'_> {
    fn compose(&self, t: i64, _prev: Option<&Tensor>) -> Tensor {
        let frame = self.target.select(1, if t == 0 { 0 } else { t - 1 });
        let width = frame.size()[1];
        let frame = frame.narrow(1, self.skip, width - self.skip);
        if t == 0 {
            frame.zeros_like()
        } else {
            frame
        }
    }
}

/// Ground-truth-fed inference policy
///
/// Every step draws its input from the supplied target sequence, keeping only
/// the non-predicted agents' channels.
pub(crate) struct GroundTruthContext<'a> {
    pub target: &'a Tensor,
    pub output_size: i64,
}

impl ComposeInput for GroundTruthContext<'_> {
    fn compose(&self, t: i64, _prev: Option<&Tensor>) -> Tensor {
        let frame = self.target.select(1, t);
        let width = frame.size()[1];
        frame.narrow(1, self.output_size, width - self.output_size)
    }
}

/// Autoregressive inference policy
///
/// The predicted agent's channel starts from the last known input frame and
/// is fed back from the model's own predictions afterwards; the other agents'
/// channels come from the target sequence at the current step.
pub(crate) struct Autoregressive<'a> {
    pub input_seq: &'a Tensor,
    pub target: &'a Tensor,
    pub output_size: i64,
}

impl ComposeInput for Autoregressive<'_> {
    fn compose(&self, t: i64, prev: Option<&Tensor>) -> Tensor {
        let own = match prev {
            Some(prediction) => prediction.shallow_clone(),
            None => {
                let last = self.input_seq.size()[1] - 1;
                self.input_seq.select(1, last).narrow(1, 0, self.output_size)
            }
        };
        let frame = self.target.select(1, t);
        let width = frame.size()[1];
        let context = frame.narrow(1, self.output_size, width - self.output_size);
        Tensor::cat(&[own, context], 1)
    }
}

/// Free-running generation policy: zeros at `t = 0`, then pure self-feedback
pub(crate) struct SelfFeedback<'a> {
    pub zero_frame: &'a Tensor,
}

impl ComposeInput for SelfFeedback<'_> {
    fn compose(&self, _t: i64, prev: Option<&Tensor>) -> Tensor {
        match prev {
            Some(prediction) => prediction.shallow_clone(),
            None => self.zero_frame.zeros_like(),
        }
    }
}

/// Unroll the decoder for `time_steps` steps
///
/// Invokes `on_step(t, prediction)` once per step, in order; step `t + 1`
/// never begins before step `t` completes because the hidden state and (for
/// autoregressive policies) the previous prediction are hard dependencies.
/// Per-iteration tensors are dropped at the end of each iteration.
pub(crate) fn run<D, C, F>(
    decoder: &D,
    enc_output: &Tensor,
    enc_hidden: &Tensor,
    time_steps: i64,
    composer: &C,
    train: bool,
    mut on_step: F,
) -> Result<()>
where
    D: Decode + ?Sized,
    C: ComposeInput + ?Sized,
    F: FnMut(i64, Tensor),
{
    ensure!(time_steps >= 1, "rollout requires at least one timestep, got {time_steps}");

    let mut hidden = enc_hidden.shallow_clone();
    let mut prev: Option<Tensor> = None;

    for t in 0..time_steps {
        let input = composer.compose(t, prev.as_ref());
        if t == 0 {
            ensure!(
                input.size()[1] == decoder.input_size(),
                "composed decoder input width {} does not match the decoder's expected width {}",
                input.size()[1],
                decoder.input_size()
            );
        }

        let (prediction, next_hidden, _attention) =
            decoder.forward(&input, &hidden, enc_output, train);
        hidden = next_hidden;

        prev = Some(prediction.shallow_clone());
        on_step(t, prediction);
    }

    Ok(())
}
