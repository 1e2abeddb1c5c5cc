//! Attention-based GRU decoder
//!
//! One decoder invocation consumes a single composed input frame, the
//! previous hidden state, and the full encoder output; it produces one
//! prediction, the updated hidden state, and the attention weights over the
//! encoder steps (Bahdanau-style additive attention).

use tch::{
    nn::{self, GRUState, Module, RNN},
    Device, Kind, Tensor,
};

use super::{Decode, Parameterized};

/// Multi-layer GRU decoder with additive attention and a linear output head
pub struct AttentionDecoder {
    vs: nn::VarStore,
    attn_enc: nn::Linear,
    attn_query: nn::Linear,
    attn_score: nn::Linear,
    layers: Vec<nn::GRU>,
    head: nn::Linear,
    input_size: i64,
    output_size: i64,
    units: i64,
    num_layers: i64,
    dropout: f64,
    device: Device,
}

impl AttentionDecoder {
    /// Create a new decoder
    ///
    /// # Arguments
    ///
    /// * `input_size` - Feature width of one composed input frame
    /// * `output_size` - Feature width of one prediction
    /// * `units` - Hidden units per layer (must match the encoder's)
    /// * `num_layers` - Number of stacked GRU layers
    /// * `dropout` - Dropout rate applied between layers in training mode
    pub fn new(input_size: i64, output_size: i64, units: i64, num_layers: i64, dropout: f64) -> Self {
        let device = Device::cuda_if_available();
        tracing::debug!("AttentionDecoder using device: {:?}", device);
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let attn_enc = nn::linear(&root / "attn" / "enc", units, units, Default::default());
        let attn_query = nn::linear(&root / "attn" / "query", units, units, Default::default());
        let attn_score = nn::linear(&root / "attn" / "score", units, 1, Default::default());

        // First GRU layer consumes the attention context concatenated with
        // the composed input frame.
        let mut layers = Vec::with_capacity(num_layers as usize);
        for i in 0..num_layers {
            let in_dim = if i == 0 { units + input_size } else { units };
            layers.push(nn::gru(&root / format!("layer{i}"), in_dim, units, Default::default()));
        }

        let head = nn::linear(&root / "head", units, output_size, Default::default());

        Self {
            vs,
            attn_enc,
            attn_query,
            attn_score,
            layers,
            head,
            input_size,
            output_size,
            units,
            num_layers,
            dropout,
            device,
        }
    }

    /// Get the device this decoder is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.device
    }

    /// Attention weights over encoder steps for the given query state
    ///
    /// `query` is the top-layer hidden state `(batch, units)`; returns
    /// weights `(batch, time, 1)` that sum to one along the time axis.
    fn attention(&self, query: &Tensor, enc_output: &Tensor) -> Tensor {
        let query = query.unsqueeze(1);
        let score = self
            .attn_score
            .forward(&(self.attn_enc.forward(enc_output) + self.attn_query.forward(&query)).tanh());
        score.softmax(1, Kind::Float)
    }
}

impl Decode for AttentionDecoder {
    fn forward(
        &self,
        input: &Tensor,
        hidden: &Tensor,
        enc_output: &Tensor,
        train: bool,
    ) -> (Tensor, Tensor, Tensor) {
        let query = hidden.select(0, self.num_layers - 1);
        let weights = self.attention(&query, enc_output);
        let context = (&weights * enc_output).sum_dim_intlist(1, false, Kind::Float);

        let mut x = Tensor::cat(&[context, input.shallow_clone()], 1).unsqueeze(1);
        let mut states = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate() {
            let state = GRUState(hidden.narrow(0, i as i64, 1));
            let (out, GRUState(next_state)) = layer.seq_init(&x, &state);
            states.push(next_state);

            x = if train && self.dropout > 0.0 && i + 1 < self.layers.len() {
                out.dropout(self.dropout, true)
            } else {
                out
            };
        }

        let prediction = self.head.forward(&x.squeeze_dim(1));
        (prediction, Tensor::cat(&states, 0), weights)
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
        self.num_layers
    }
}

impl Parameterized for AttentionDecoder {
    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_inputs(decoder: &AttentionDecoder, batch: i64, time: i64) -> (Tensor, Tensor, Tensor) {
        let device = decoder.device();
        let input = Tensor::randn([batch, decoder.input_size()], (Kind::Float, device));
        let hidden =
            Tensor::randn([decoder.num_layers(), batch, decoder.hidden_size()], (Kind::Float, device));
        let enc_output = Tensor::randn([batch, time, decoder.hidden_size()], (Kind::Float, device));
        (input, hidden, enc_output)
    }

    #[test]
    fn test_step_shapes() {
        let decoder = AttentionDecoder::new(12, 4, 32, 2, 0.0);
        let (input, hidden, enc_output) = step_inputs(&decoder, 3, 8);

        let (prediction, next_hidden, attention) =
            decoder.forward(&input, &hidden, &enc_output, false);

        assert_eq!(prediction.size(), vec![3, 4]);
        assert_eq!(next_hidden.size(), vec![2, 3, 32]);
        assert_eq!(attention.size(), vec![3, 8, 1]);
    }

    #[test]
    fn test_attention_weights_sum_to_one() {
        let decoder = AttentionDecoder::new(6, 6, 16, 1, 0.0);
        let (input, hidden, enc_output) = step_inputs(&decoder, 2, 5);

        let (_, _, attention) = decoder.forward(&input, &hidden, &enc_output, false);
        let sums = attention.sum_dim_intlist(1, false, Kind::Float);

        let max_err: f64 = (sums - 1.0).abs().max().try_into().unwrap();
        assert!(max_err < 1e-5);
    }

    #[test]
    fn test_hidden_state_updates() {
        let decoder = AttentionDecoder::new(6, 6, 16, 1, 0.0);
        let (input, hidden, enc_output) = step_inputs(&decoder, 2, 5);

        let (_, next_hidden, _) = decoder.forward(&input, &hidden, &enc_output, false);
        let diff: f64 = (&next_hidden - &hidden).abs().max().try_into().unwrap();
        assert!(diff > 0.0);
    }
}
