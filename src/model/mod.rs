//! Encoder and decoder network components
//!
//! The training and inference engines are generic over the recurrent cell
//! architecture: anything that can encode a sequence into (per-step outputs,
//! final hidden state) and decode one step at a time can be plugged in. The
//! concrete implementations here are stacked GRUs, with Bahdanau attention on
//! the decoder side.

use tch::{nn, Tensor};

mod decoder;
mod encoder;

pub use decoder::AttentionDecoder;
pub use encoder::GruEncoder;

/// Sequence encoder capability
///
/// Consumes a full `(batch, time, feature)` input sequence and produces
/// per-step outputs plus a final hidden state that seeds the decoder.
pub trait Encode {
    /// Run the encoder over `input` starting from `hidden`
    ///
    /// # Arguments
    ///
    /// * `input` - Input sequence `(batch, time, feature)`
    /// * `hidden` - Initial hidden state `(layers, batch, units)`
    /// * `train` - Whether dropout/regularization is active
    ///
    /// # Returns
    /// `(output, hidden)` where `output` is `(batch, time, units)` and
    /// `hidden` is the final state `(layers, batch, units)`.
    fn forward(&self, input: &Tensor, hidden: &Tensor, train: bool) -> (Tensor, Tensor);

    /// Fresh zero hidden state for a rollout over `batch_size` sequences
    fn zero_state(&self, batch_size: i64) -> Tensor;

    /// Hidden units per layer
    fn hidden_size(&self) -> i64;

    /// Number of stacked layers
    fn num_layers(&self) -> i64;

    /// Feature width of one input frame
    fn input_size(&self) -> i64;
}

/// Single-step sequence decoder capability
///
/// Consumes one timestep's input, the previous hidden state, and the full
/// encoder output; produces one prediction, the updated hidden state, and an
/// attention artifact.
pub trait Decode {
    /// Run one decoder step
    ///
    /// # Arguments
    ///
    /// * `input` - One composed input frame `(batch, input_size)`
    /// * `hidden` - Previous hidden state `(layers, batch, units)`
    /// * `enc_output` - Encoder output `(batch, time, units)`
    /// * `train` - Whether dropout/regularization is active
    ///
    /// # Returns
    /// `(prediction, hidden, attention)` where `prediction` is
    /// `(batch, output_size)` and `attention` is `(batch, time, 1)`.
    fn forward(
        &self,
        input: &Tensor,
        hidden: &Tensor,
        enc_output: &Tensor,
        train: bool,
    ) -> (Tensor, Tensor, Tensor);

    /// Feature width of one prediction
    fn output_size(&self) -> i64;

    /// Feature width of one composed input frame
    fn input_size(&self) -> i64;

    /// Hidden units per layer
    fn hidden_size(&self) -> i64;

    /// Number of stacked layers
    fn num_layers(&self) -> i64;
}

/// Access to a component's variable store
///
/// Required for optimizer construction and checkpoint persistence; components
/// used purely for inference (e.g. test doubles) only need [`Encode`] or
/// [`Decode`].
pub trait Parameterized {
    /// Variable store holding this component's parameters
    fn var_store(&self) -> &nn::VarStore;

    /// Mutable variable store (for checkpoint restoration)
    fn var_store_mut(&mut self) -> &mut nn::VarStore;
}
