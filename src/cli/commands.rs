// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `score`, and all
// their configurable flags. Enum-valued flags parse through
// FromStr, so a bad value is rejected before anything runs.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::{
    annealing::AnnealingShape,
    model::EncoderActivation,
    scoring::InvalidMoleculePolicy,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the fingerprint → SELFIES model
    Train(TrainArgs),

    /// Score a saved checkpoint on the scoring subset
    Score(ScoreArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Name of the run; outputs go to <models-dir>/<run-name>
    #[arg(long, default_value = "gru_vae")]
    pub run_name: String,

    /// JSON-lines dataset of {"selfies", "fps"} records
    #[arg(long, default_value = "data/train_data/dataset.jsonl")]
    pub data_path: String,

    #[arg(long, default_value = "models")]
    pub models_dir: String,

    /// One SMARTS pattern per line, line i ↔ fingerprint bit i
    #[arg(long, default_value = "data/KlekFP_keys.txt")]
    pub keys_path: String,

    /// Alphabet file (one symbol per line); built-in alphabet if absent
    #[arg(long)]
    pub alphabet_path: Option<String>,

    /// Checkpoint to load weights from before training
    #[arg(long)]
    pub resume_from: Option<String>,

    /// Train on the WGPU backend instead of NdArray
    #[arg(long)]
    pub use_gpu: bool,

    /// Fraction of records used for training
    #[arg(long, default_value_t = 0.8)]
    pub train_size: f64,

    #[arg(long, default_value_t = 42)]
    pub random_seed: u64,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Token length every SELFIES is padded to
    #[arg(long, default_value_t = 128)]
    pub pad_to_len: usize,

    #[arg(long, default_value_t = 150)]
    pub epochs: usize,

    /// Number of the first epoch; epochs divisible by 10 are scored and checkpointed
    #[arg(long, default_value_t = 1)]
    pub start_epoch: usize,

    #[arg(long, default_value_t = 2e-4)]
    pub learn_rate: f64,

    /// Scale applied to the KL divergence before annealing
    #[arg(long, default_value_t = 0.1)]
    pub kld_weight: f64,

    /// Leave the KL term out of the backward pass
    #[arg(long)]
    pub no_kld_backward: bool,

    /// Disable KL annealing
    #[arg(long)]
    pub no_kld_annealing: bool,

    /// Epoch count over which the KL weight ramps from 0 to 1
    #[arg(long, default_value_t = 30)]
    pub annealing_max_epoch: usize,

    /// linear, cosine or logistic
    #[arg(long, default_value = "cosine")]
    pub annealing_shape: AnnealingShape,

    /// Start the annealing counter at start_epoch instead of 0
    #[arg(long)]
    pub resume_annealing: bool,

    /// Fingerprint length; must equal the number of key patterns
    #[arg(long, default_value_t = 4860)]
    pub fp_len: usize,

    /// Latent dimension
    #[arg(long, default_value_t = 32)]
    pub encoding_size: usize,

    /// GRU hidden size
    #[arg(long, default_value_t = 512)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 1)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Probability of feeding the true token to the next decoder step
    #[arg(long, default_value_t = 0.5)]
    pub teacher_ratio: f64,

    #[arg(long, default_value_t = 1024)]
    pub fc1_size: usize,

    #[arg(long, default_value_t = 1024)]
    pub fc2_size: usize,

    #[arg(long, default_value_t = 512)]
    pub fc3_size: usize,

    /// relu, gelu, tanh or silu
    #[arg(long, default_value = "relu")]
    pub encoder_activation: EncoderActivation,

    /// zero-score or exclude
    #[arg(long, default_value = "zero-score")]
    pub invalid_policy: InvalidMoleculePolicy,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            run_name:            a.run_name,
            data_path:           a.data_path,
            models_dir:          a.models_dir,
            keys_path:           a.keys_path,
            alphabet_path:       a.alphabet_path,
            resume_from:         a.resume_from,
            use_gpu:             a.use_gpu,
            train_size:          a.train_size,
            random_seed:         a.random_seed,
            batch_size:          a.batch_size,
            num_workers:         a.num_workers,
            pad_to_len:          a.pad_to_len,
            epochs:              a.epochs,
            start_epoch:         a.start_epoch,
            learn_rate:          a.learn_rate,
            kld_weight:          a.kld_weight,
            kld_backward:        !a.no_kld_backward,
            kld_annealing:       !a.no_kld_annealing,
            annealing_max_epoch: a.annealing_max_epoch,
            annealing_shape:     a.annealing_shape,
            resume_annealing:    a.resume_annealing,
            fp_len:              a.fp_len,
            encoding_size:       a.encoding_size,
            hidden_size:         a.hidden_size,
            num_layers:          a.num_layers,
            dropout:             a.dropout,
            teacher_ratio:       a.teacher_ratio,
            fc1_size:            a.fc1_size,
            fc2_size:            a.fc2_size,
            fc3_size:            a.fc3_size,
            encoder_activation:  a.encoder_activation,
            invalid_policy:      a.invalid_policy,
        }
    }
}

/// All arguments for the `score` command
#[derive(Args, Debug)]
pub struct ScoreArgs {
    #[arg(long)]
    pub run_name: String,

    /// Checkpoint epoch to load
    #[arg(long)]
    pub epoch: usize,

    #[arg(long, default_value = "models")]
    pub models_dir: String,
}
