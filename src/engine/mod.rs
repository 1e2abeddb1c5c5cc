//! Sequence-to-sequence training and inference engine
//!
//! [`Seq2Seq`] owns an encoder, a decoder, and the optimizers for whichever
//! parameter groups are trainable. It is generic over the recurrent cell
//! architecture: the engine only relies on the [`Encode`] and [`Decode`]
//! capabilities, plus [`Parameterized`] for optimizer construction and
//! checkpoint persistence.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use tch::{nn, nn::OptimizerConfig, Tensor};

use crate::checkpoint::{self, GROUP_DECODER, GROUP_ENCODER};
use crate::config::{Seq2SeqConfig, TrainableScope};
use crate::model::{AttentionDecoder, Decode, Encode, GruEncoder, Parameterized};

pub(crate) mod rollout;

mod infer;
mod train;

pub use train::TrainStats;

/// Encoder–decoder forecasting engine
///
/// # Type Parameters
///
/// * `E` - Encoder component
/// * `D` - Decoder component
pub struct Seq2Seq<E, D> {
    config: Seq2SeqConfig,
    encoder: E,
    decoder: D,
    optimizers: Vec<nn::Optimizer>,
}

impl Seq2Seq<GruEncoder, AttentionDecoder> {
    /// Build the engine with GRU components derived from the configuration
    pub fn from_config(config: Seq2SeqConfig) -> Result<Self> {
        config.validate()?;
        let encoder = GruEncoder::new(
            config.encoder_input_size(),
            config.enc_units,
            config.enc_layers,
            config.enc_dropout,
        );
        let decoder = AttentionDecoder::new(
            config.decoder_input_size(),
            config.output_size(),
            config.dec_units,
            config.dec_layers,
            config.dec_dropout,
        );
        Self::with_components(config, encoder, decoder)
    }
}

impl<E, D> Seq2Seq<E, D> {
    /// Get the configuration
    pub fn config(&self) -> &Seq2SeqConfig {
        &self.config
    }

    /// Get reference to the encoder
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Get reference to the decoder
    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<E, D> Seq2Seq<E, D>
where
    E: Encode + Parameterized,
    D: Decode + Parameterized,
{
    /// Build the engine around caller-supplied components
    ///
    /// One Adam optimizer is created per trainable parameter group; groups
    /// outside the scope never receive an update, which is what keeps a
    /// transferred decoder frozen.
    pub fn with_components(config: Seq2SeqConfig, encoder: E, decoder: D) -> Result<Self> {
        let trainable = config.trainable;
        let learning_rate = config.learning_rate;
        let mut engine = Self::for_inference(config, encoder, decoder)?;

        engine.optimizers.push(
            nn::Adam::default()
                .build(engine.encoder.var_store(), learning_rate)
                .context("failed to build encoder optimizer")?,
        );
        if trainable == TrainableScope::EncoderAndDecoder {
            engine.optimizers.push(
                nn::Adam::default()
                    .build(engine.decoder.var_store(), learning_rate)
                    .context("failed to build decoder optimizer")?,
            );
        }

        tracing::info!(
            "seq2seq engine ready: enc {}x{} units, dec {}x{} units, trainable {:?}",
            engine.encoder.num_layers(),
            engine.encoder.hidden_size(),
            engine.decoder.num_layers(),
            engine.decoder.hidden_size(),
            trainable
        );

        Ok(engine)
    }

    /// Serialize every registered parameter group into a new checkpoint record
    ///
    /// Previous records under `dir` are left intact. Returns the new record's
    /// index. Optimizer state is not persisted; restoration tolerates its
    /// absence.
    pub fn save_checkpoint(&self, dir: impl AsRef<Path>) -> Result<u64> {
        let record = checkpoint::create(dir.as_ref())?;
        record.save_group(GROUP_ENCODER, self.encoder.var_store())?;
        record.save_group(GROUP_DECODER, self.decoder.var_store())?;
        tracing::info!("saved checkpoint {} under {}", record.index(), dir.as_ref().display());
        Ok(record.index())
    }

    /// Restore every registered parameter group from the latest record under `dir`
    ///
    /// Fails when no record exists or any group's shapes drift from the live
    /// model; the caller must treat failure as fatal rather than continue
    /// with a half-initialized model.
    pub fn restore_full(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.restore_subset(&[GROUP_ENCODER, GROUP_DECODER], dir)
    }

    /// Restore only the named parameter groups from the latest record under `dir`
    ///
    /// Groups not named keep their current (e.g. freshly initialized) values.
    /// This is the transfer-learning path: a decoder pretrained inside an
    /// autoencoder is loaded into a new pairing while the encoder starts from
    /// scratch.
    pub fn restore_subset(&mut self, groups: &[&str], dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let record = checkpoint::latest(dir)?
            .with_context(|| format!("no checkpoint found under {}", dir.display()))?;

        for &name in groups {
            match name {
                GROUP_ENCODER => record.load_group(name, self.encoder.var_store_mut())?,
                GROUP_DECODER => record.load_group(name, self.decoder.var_store_mut())?,
                other => anyhow::bail!("unknown parameter group '{other}'"),
            }
        }
        tracing::info!(
            "restored groups {:?} from checkpoint {} under {}",
            groups,
            record.index(),
            dir.display()
        );
        Ok(())
    }

    /// Load a pretrained decoder from an autoencoder checkpoint directory
    ///
    /// Only the decoder group is restored; the encoder keeps its random
    /// initialization. A missing or mismatched checkpoint is fatal because a
    /// wrong decoder invalidates the transfer premise.
    pub fn load_pretrained_decoder(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        self.restore_subset(&[GROUP_DECODER], dir)
            .context("failed to load pretrained decoder")
    }
}

impl<E, D> Seq2Seq<E, D>
where
    E: Encode,
    D: Decode,
{
    /// Build an inference-only engine with no optimizers
    ///
    /// The decoder's hidden state is seeded from the encoder's final state,
    /// so their hidden geometry must match. Components need not expose a
    /// variable store, so test doubles and exported networks can be driven
    /// through the inference and evaluation paths; such an engine cannot be
    /// trained or checkpointed.
    pub fn for_inference(config: Seq2SeqConfig, encoder: E, decoder: D) -> Result<Self> {
        config.validate()?;
        ensure!(
            encoder.hidden_size() == decoder.hidden_size()
                && encoder.num_layers() == decoder.num_layers(),
            "decoder hidden geometry ({} units x {} layers) must match the encoder's ({} x {})",
            decoder.hidden_size(),
            decoder.num_layers(),
            encoder.hidden_size(),
            encoder.num_layers()
        );
        Ok(Self { config, encoder, decoder, optimizers: Vec::new() })
    }

    /// Run the encoder over `input_seq` from a fresh zero state
    ///
    /// This is the single encode path shared by training and inference; the
    /// two differ only in the `train` flag.
    pub(crate) fn encode(&self, input_seq: &Tensor, train: bool) -> (Tensor, Tensor) {
        let batch = input_seq.size()[0];
        let hidden = self.encoder.zero_state(batch);
        self.encoder.forward(input_seq, &hidden, train)
    }
}
