//! # Motion Forecast
//!
//! Sequence-to-sequence keypoint trajectory forecasting in Rust + libtorch
//! (via tch-rs).
//!
//! The crate trains an encoder–decoder model that predicts one agent's future
//! keypoint trajectory from a concatenated multi-agent input sequence. The
//! decoder is typically transferred from a separately pretrained autoencoder
//! and kept frozen while only the encoder learns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motion_forecast::{Seq2Seq, Seq2SeqConfig};
//!
//! let config = Seq2SeqConfig::new().keypoints(57).enc_units(256).dec_units(256);
//! let mut model = Seq2Seq::from_config(config)?;
//! model.load_pretrained_decoder("checkpoints/autoencoder")?;
//! # anyhow::Ok(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Model configuration and trainable-scope selection
pub mod config;

/// Encoder/decoder capability traits and GRU implementations
pub mod model;

/// Checkpoint records and named parameter-group persistence
pub mod checkpoint;

/// Training and inference engine
pub mod engine;

/// Evaluation harness and reporting collaborator traits
pub mod eval;

/// Sequence batches and window/channel slicing helpers
pub mod data;

pub use config::{Seq2SeqConfig, TrainableScope};
pub use data::SequenceBatch;
pub use engine::{Seq2Seq, TrainStats};
pub use eval::{EvalReport, Evaluator, LogMetricsSink, MetricsSink, NullVisualizer, Visualizer};
pub use model::{AttentionDecoder, Decode, Encode, GruEncoder, Parameterized};

/// Current version of motion-forecast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
