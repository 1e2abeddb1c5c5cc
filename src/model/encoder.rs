//! Stacked GRU sequence encoder
//!
//! The encoder consumes a fixed-length multi-agent sequence and produces
//! per-step outputs plus a final hidden state. Layers are built as individual
//! single-layer GRUs so dropout between layers can honor a per-call training
//! flag instead of being baked in at construction time.

use tch::{
    nn::{self, GRUState, RNN},
    Device, Kind, Tensor,
};

use super::{Encode, Parameterized};

/// Multi-layer GRU encoder
pub struct GruEncoder {
    vs: nn::VarStore,
    layers: Vec<nn::GRU>,
    input_size: i64,
    units: i64,
    num_layers: i64,
    dropout: f64,
    device: Device,
}

impl GruEncoder {
    /// Create a new encoder
    ///
    /// # Arguments
    ///
    /// * `input_size` - Feature width of one input frame
    /// * `units` - Hidden units per layer
    /// * `num_layers` - Number of stacked GRU layers
    /// * `dropout` - Dropout rate applied between layers in training mode
    pub fn new(input_size: i64, units: i64, num_layers: i64, dropout: f64) -> Self {
        let device = Device::cuda_if_available();
        tracing::debug!("GruEncoder using device: {:?}", device);
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let mut layers = Vec::with_capacity(num_layers as usize);
        for i in 0..num_layers {
            let in_dim = if i == 0 { input_size } else { units };
            layers.push(nn::gru(&root / format!("layer{i}"), in_dim, units, Default::default()));
        }

        Self { vs, layers, input_size, units, num_layers, dropout, device }
    }

    /// Get the device this encoder is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.device
    }
}

impl Encode for GruEncoder {
    fn forward(&self, input: &Tensor, hidden: &Tensor, train: bool) -> (Tensor, Tensor) {
        let mut x = input.shallow_clone();
        let mut states = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate() {
            let state = GRUState(hidden.narrow(0, i as i64, 1));
            let (out, GRUState(next_state)) = layer.seq_init(&x, &state);
            states.push(next_state);

            // Inter-layer dropout only; the last layer's output feeds attention
            x = if train && self.dropout > 0.0 && i + 1 < self.layers.len() {
                out.dropout(self.dropout, true)
            } else {
                out
            };
        }

        (x, Tensor::cat(&states, 0))
    }

    fn zero_state(&self, batch_size: i64) -> Tensor {
        Tensor::zeros([self.num_layers, batch_size, self.units], (Kind::Float, self.device))
    }

    fn hidden_size(&self) -> i64 {
        self.units
    }

    fn num_layers(&self) -> i64 {
        self.num_layers
    }

    fn input_size(&self) -> i64 {
        self.input_size
    }
}

impl Parameterized for GruEncoder {
    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }
}
