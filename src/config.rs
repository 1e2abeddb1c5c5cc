//! Model configuration and hyperparameters
//!
//! This module defines the configuration for the sequence-to-sequence
//! forecasting model and provides validation and builder pattern methods.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Which parameter groups receive optimizer updates
///
/// The decoder is usually transferred from a pretrained autoencoder and kept
/// frozen, so the default scope updates the encoder only. The scope is an
/// explicit list of update targets; it never relies on trainability flags
/// baked into the network modules themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainableScope {
    /// Update encoder parameters only (frozen transferred decoder)
    Encoder,

    /// Update both encoder and decoder parameters
    EncoderAndDecoder,
}

/// Configuration for the sequence-to-sequence forecasting model
///
/// Default values match the small synthetic-data experiments; real motion
/// capture runs override the widths and window lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seq2SeqConfig {
    /// Feature width of the predicted agent's keypoint vector (decoder output width)
    pub keypoints: i64,

    /// Combined feature width of the non-predicted agents' channels
    ///
    /// Zero for pure reconstruction experiments where the decoder consumes
    /// and reproduces the target frames directly.
    pub context_size: i64,

    /// Number of hidden units in the encoder GRU
    pub enc_units: i64,

    /// Number of hidden units in the decoder GRU
    pub dec_units: i64,

    /// Number of stacked GRU layers in the encoder
    pub enc_layers: i64,

    /// Number of stacked GRU layers in the decoder
    pub dec_layers: i64,

    /// Encoder dropout rate (applied between stacked layers in training mode)
    pub enc_dropout: f64,

    /// Decoder dropout rate (applied between stacked layers in training mode)
    pub dec_dropout: f64,

    /// Batch size used for training rollouts
    pub batch_size: i64,

    /// Learning rate for the Adam optimizer
    pub learning_rate: f64,

    /// Number of timesteps in the input window
    pub inp_length: i64,

    /// Number of timesteps the decoder rolls out over
    pub time_steps: i64,

    /// Whether inference feeds the model's own predictions back as input
    pub autoregressive: bool,

    /// Parameter groups updated during training
    pub trainable: TrainableScope,

    /// Directory where training checkpoints are written
    pub checkpoint_dir: String,

    /// Directory holding the pretrained autoencoder checkpoint, if any
    pub pretrained_dir: Option<String>,
}

impl Default for Seq2SeqConfig {
    fn default() -> Self {
        Self {
            keypoints: 57,
            context_size: 0,
            enc_units: 256,
            dec_units: 256,
            enc_layers: 1,
            dec_layers: 1,
            enc_dropout: 0.0,
            dec_dropout: 0.0,
            batch_size: 32,
            learning_rate: 1e-3,
            inp_length: 30,
            time_steps: 30,
            autoregressive: true,
            trainable: TrainableScope::Encoder,
            checkpoint_dir: "checkpoints/seq2seq".to_string(),
            pretrained_dir: None,
        }
    }
}

impl Seq2SeqConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Feature width of one predicted output frame
    pub fn output_size(&self) -> i64 {
        self.keypoints
    }

    /// Feature width the encoder consumes per frame
    ///
    /// Autoregressive runs see the full concatenated frame; ground-truth-fed
    /// runs see only the non-predicted agents' channels. Pure reconstruction
    /// experiments (`context_size == 0`) always see the target frame itself.
    pub fn encoder_input_size(&self) -> i64 {
        if self.autoregressive || self.context_size == 0 {
            self.keypoints + self.context_size
        } else {
            self.context_size
        }
    }

    /// Feature width the decoder consumes per step
    pub fn decoder_input_size(&self) -> i64 {
        // Same composition rule as the encoder: the decoder input is either
        // (own channel, context channels) or context channels alone.
        self.encoder_input_size()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.keypoints <= 0 {
            anyhow::bail!("keypoints must be positive");
        }
        if self.context_size < 0 {
            anyhow::bail!("context_size must be non-negative");
        }
        if self.enc_units <= 0 || self.dec_units <= 0 {
            anyhow::bail!("hidden unit counts must be positive");
        }
        if self.enc_layers <= 0 || self.dec_layers <= 0 {
            anyhow::bail!("layer counts must be positive");
        }
        if !(0.0..1.0).contains(&self.enc_dropout) || !(0.0..1.0).contains(&self.dec_dropout) {
            anyhow::bail!("dropout rates must be in [0, 1)");
        }
        if self.batch_size <= 0 {
            anyhow::bail!("batch_size must be positive");
        }
        if self.learning_rate <= 0.0 {
            anyhow::bail!("learning_rate must be positive");
        }
        if self.inp_length < 1 {
            anyhow::bail!("inp_length must be at least 1");
        }
        if self.time_steps < 1 {
            anyhow::bail!("time_steps must be at least 1");
        }
        Ok(())
    }

    /// Set the predicted agent's keypoint width
    pub fn keypoints(mut self, keypoints: i64) -> Self {
        self.keypoints = keypoints;
        self
    }

    /// Set the combined width of the non-predicted agents' channels
    pub fn context_size(mut self, context_size: i64) -> Self {
        self.context_size = context_size;
        self
    }

    /// Set encoder hidden units
    pub fn enc_units(mut self, units: i64) -> Self {
        self.enc_units = units;
        self
    }

    /// Set decoder hidden units
    pub fn dec_units(mut self, units: i64) -> Self {
        self.dec_units = units;
        self
    }

    /// Set encoder layer count
    pub fn enc_layers(mut self, layers: i64) -> Self {
        self.enc_layers = layers;
        self
    }

    /// Set decoder layer count
    pub fn dec_layers(mut self, layers: i64) -> Self {
        self.dec_layers = layers;
        self
    }

    /// Set encoder dropout rate
    pub fn enc_dropout(mut self, rate: f64) -> Self {
        self.enc_dropout = rate;
        self
    }

    /// Set decoder dropout rate
    pub fn dec_dropout(mut self, rate: f64) -> Self {
        self.dec_dropout = rate;
        self
    }

    /// Set training batch size
    pub fn batch_size(mut self, size: i64) -> Self {
        self.batch_size = size;
        self
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set input window length
    pub fn inp_length(mut self, length: i64) -> Self {
        self.inp_length = length;
        self
    }

    /// Set rollout length
    pub fn time_steps(mut self, steps: i64) -> Self {
        self.time_steps = steps;
        self
    }

    /// Set the autoregressive input-composition flag
    pub fn autoregressive(mut self, auto: bool) -> Self {
        self.autoregressive = auto;
        self
    }

    /// Set the trainable parameter scope
    pub fn trainable(mut self, scope: TrainableScope) -> Self {
        self.trainable = scope;
        self
    }

    /// Set the checkpoint output directory
    pub fn checkpoint_dir(mut self, dir: impl Into<String>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Set the pretrained autoencoder directory
    pub fn pretrained_dir(mut self, dir: impl Into<String>) -> Self {
        self.pretrained_dir = Some(dir.into());
        self
    }
}
