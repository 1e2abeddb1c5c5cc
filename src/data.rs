//! Sequence batches and slicing helpers
//!
//! A dataset collaborator yields batches of three agents' keypoint sequences
//! over a shared time window. The helpers here concatenate agents along the
//! feature axis and split the result into input and target windows; actual
//! dataset loading lives outside this crate.

use anyhow::{ensure, Result};
use tch::Tensor;

/// One batch of aligned per-agent keypoint sequences
///
/// Each tensor has shape `(batch, time, keypoints)`; `subject` is the agent
/// whose future the model predicts, `left` and `right` are the interaction
/// partners providing context.
#[derive(Debug)]
pub struct SequenceBatch {
    /// Predicted agent's sequence
    pub subject: Tensor,

    /// Left partner's sequence
    pub left: Tensor,

    /// Right partner's sequence
    pub right: Tensor,
}

impl SequenceBatch {
    /// Create a batch, checking that all three sequences are aligned
    pub fn new(subject: Tensor, left: Tensor, right: Tensor) -> Result<Self> {
        ensure!(
            subject.size().len() == 3 && left.size().len() == 3 && right.size().len() == 3,
            "agent sequences must be rank-3 (batch, time, keypoints)"
        );
        ensure!(
            subject.size()[..2] == left.size()[..2] && subject.size()[..2] == right.size()[..2],
            "agent sequences must share batch and time dimensions: subject {:?}, left {:?}, right {:?}",
            subject.size(),
            left.size(),
            right.size()
        );
        Ok(Self { subject, left, right })
    }

    /// Number of samples in the batch
    pub fn num_samples(&self) -> i64 {
        self.subject.size()[0]
    }

    /// Shared time-axis length
    pub fn time_len(&self) -> i64 {
        self.subject.size()[1]
    }

    /// Subject keypoint width
    pub fn keypoints(&self) -> i64 {
        self.subject.size()[2]
    }

    /// All three agents concatenated along the feature axis, one sample
    ///
    /// Channel layout is `[subject | left | right]`, shape `(1, time, total)`.
    pub fn sample_full(&self, i: i64) -> Tensor {
        Tensor::cat(
            &[
                self.subject.narrow(0, i, 1),
                self.left.narrow(0, i, 1),
                self.right.narrow(0, i, 1),
            ],
            2,
        )
    }

    /// The subject's future frames for one sample, shape `(1, time - inp_length, keypoints)`
    pub fn subject_future(&self, i: i64, inp_length: i64) -> Tensor {
        self.subject.narrow(0, i, 1).narrow(1, inp_length, self.time_len() - inp_length)
    }
}

/// Split a sequence into input and target windows at `inp_length`
pub fn split_windows(seq: &Tensor, inp_length: i64) -> Result<(Tensor, Tensor)> {
    let time = seq.size()[1];
    ensure!(
        inp_length >= 1 && inp_length < time,
        "inp_length {} must leave a non-empty target window in a {}-step sequence",
        inp_length,
        time
    );
    Ok((seq.narrow(1, 0, inp_length), seq.narrow(1, inp_length, time - inp_length)))
}

/// Drop the subject's leading channels, keeping only partner context
pub fn drop_subject_channels(seq: &Tensor, keypoints: i64) -> Tensor {
    let width = seq.size()[2];
    seq.narrow(2, keypoints, width - keypoints)
}

/// Validate that `seq` is a rank-3 sequence with the expected feature width
///
/// Returns `(batch, time)` on success. This is the fail-fast boundary for
/// malformed batches; nothing downstream truncates or pads.
pub(crate) fn check_sequence(seq: &Tensor, feature_width: i64, what: &str) -> Result<(i64, i64)> {
    let size = seq.size();
    ensure!(size.len() == 3, "{what} must be rank-3 (batch, time, feature), got {size:?}");
    ensure!(
        size[2] == feature_width,
        "{what} feature width {} does not match expected width {}",
        size[2],
        feature_width
    );
    ensure!(size[1] >= 1, "{what} must contain at least one timestep");
    Ok((size[0], size[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn batch(samples: i64, time: i64, keypoints: i64) -> SequenceBatch {
        let shape = [samples, time, keypoints];
        SequenceBatch::new(
            Tensor::randn(shape, (Kind::Float, Device::Cpu)),
            Tensor::randn(shape, (Kind::Float, Device::Cpu)),
            Tensor::randn(shape, (Kind::Float, Device::Cpu)),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_alignment_checked() {
        let a = Tensor::zeros([2, 10, 5], (Kind::Float, Device::Cpu));
        let b = Tensor::zeros([2, 8, 5], (Kind::Float, Device::Cpu));
        let c = Tensor::zeros([2, 10, 5], (Kind::Float, Device::Cpu));
        assert!(SequenceBatch::new(a, b, c).is_err());
    }

    #[test]
    fn test_sample_full_layout() {
        let b = batch(3, 10, 4);
        let full = b.sample_full(1);
        assert_eq!(full.size(), vec![1, 10, 12]);

        // Leading channels are the subject's
        let head = full.narrow(2, 0, 4);
        let diff: f64 =
            (&head - b.subject.narrow(0, 1, 1)).abs().max().try_into().unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_split_windows() {
        let b = batch(1, 10, 4);
        let full = b.sample_full(0);
        let (input, target) = split_windows(&full, 6).unwrap();

        assert_eq!(input.size(), vec![1, 6, 12]);
        assert_eq!(target.size(), vec![1, 4, 12]);

        // Window boundaries that leave no target are rejected
        assert!(split_windows(&full, 10).is_err());
        assert!(split_windows(&full, 0).is_err());
    }

    #[test]
    fn test_drop_subject_channels() {
        let b = batch(1, 5, 4);
        let full = b.sample_full(0);
        let context = drop_subject_channels(&full, 4);
        assert_eq!(context.size(), vec![1, 5, 8]);
    }

    #[test]
    fn test_check_sequence() {
        let seq = Tensor::zeros([2, 6, 9], (Kind::Float, Device::Cpu));
        assert_eq!(check_sequence(&seq, 9, "input").unwrap(), (2, 6));
        assert!(check_sequence(&seq, 8, "input").is_err());

        let flat = Tensor::zeros([2, 6], (Kind::Float, Device::Cpu));
        assert!(check_sequence(&flat, 6, "input").is_err());
    }
}
