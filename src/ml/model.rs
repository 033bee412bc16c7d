// ============================================================
// Layer 5 — Fingerprint Encoder / SELFIES Decoder
// ============================================================
// Variational encoder over the fingerprint, GRU decoder over
// SELFIES symbols.
//
//   fingerprint [B, fp_len]
//       │  fc1 → act → dropout → fc2 → act → fc3 → act
//       ▼
//   mu, logvar [B, encoding]      kld = mean_B(-½ Σ(1 + logvar - mu² - e^logvar))
//       │  z = mu + e^(logvar/2)·ε   (train)   z = mu   (eval)
//       ▼
//   h0 = relu(fc_hidden(z))  → initial state of every GRU layer
//       │
//       ▼
//   for each position n:
//       input  = embed(previous symbol)      step 0 uses [nop]
//       h      = GRU stack(input, h)
//       p[n]   = softmax(fc_out(h))
//       next   = target[n] with prob teacher_ratio (teacher forcing)
//                argmax(p[n]) otherwise
//
// Teacher forcing draws from the caller's seeded StdRng; passing
// no generator decodes free-running.
//
// Train vs eval is decided by the backend: on the autodiff
// backend the latent is sampled and dropout is active, on the
// inner backend (`model.valid()`) both are disabled.
//
// Reference: Kingma & Welling (2014) Auto-Encoding Variational Bayes
//            Cho et al. (2014) GRU
//            Burn Book §3 (Building Blocks)

use std::fmt;
use std::str::FromStr;

use burn::{
    module::Ignored,
    nn::{
        gru::{Gru, GruConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation, Distribution},
};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::domain::error::GenError;

// ─── Encoder activation ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderActivation {
    #[default]
    Relu,
    Gelu,
    Tanh,
    Silu,
}

impl EncoderActivation {
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            EncoderActivation::Relu => activation::relu(x),
            EncoderActivation::Gelu => activation::gelu(x),
            EncoderActivation::Tanh => activation::tanh(x),
            EncoderActivation::Silu => activation::silu(x),
        }
    }
}

impl FromStr for EncoderActivation {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relu" => Ok(EncoderActivation::Relu),
            "gelu" => Ok(EncoderActivation::Gelu),
            "tanh" => Ok(EncoderActivation::Tanh),
            "silu" => Ok(EncoderActivation::Silu),
            other  => Err(GenError::config(format!("unknown encoder activation '{other}'"))),
        }
    }
}

impl fmt::Display for EncoderActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderActivation::Relu => "relu",
            EncoderActivation::Gelu => "gelu",
            EncoderActivation::Tanh => "tanh",
            EncoderActivation::Silu => "silu",
        };
        f.write_str(name)
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct EncoderDecoderConfig {
    pub fp_len:        usize,
    pub encoding_size: usize,
    pub hidden_size:   usize,
    pub num_layers:    usize,
    /// Alphabet size
    pub output_size:   usize,
    pub fc1_size:      usize,
    pub fc2_size:      usize,
    pub fc3_size:      usize,
    #[config(default = 0.2)]
    pub dropout:       f64,
    #[config(default = 0.5)]
    pub teacher_ratio: f64,
    #[config(default = "EncoderActivation::Relu")]
    pub encoder_activation: EncoderActivation,
}

impl EncoderDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderDecoder<B> {
        let gru_layers = (0..self.num_layers.max(1))
            .map(|_| GruConfig::new(self.hidden_size, self.hidden_size, true).init(device))
            .collect();
        EncoderDecoder {
            fc1:        LinearConfig::new(self.fp_len, self.fc1_size).init(device),
            fc2:        LinearConfig::new(self.fc1_size, self.fc2_size).init(device),
            fc3:        LinearConfig::new(self.fc2_size, self.fc3_size).init(device),
            fc_mu:      LinearConfig::new(self.fc3_size, self.encoding_size).init(device),
            fc_logvar:  LinearConfig::new(self.fc3_size, self.encoding_size).init(device),
            fc_hidden:  LinearConfig::new(self.encoding_size, self.hidden_size).init(device),
            embedding:  EmbeddingConfig::new(self.output_size, self.hidden_size).init(device),
            gru_layers,
            fc_out:     LinearConfig::new(self.hidden_size, self.output_size).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            activation: Ignored(self.encoder_activation),
            teacher_ratio: self.teacher_ratio,
        }
    }
}

// ─── Model ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderDecoder<B: Backend> {
    pub fc1:           Linear<B>,
    pub fc2:           Linear<B>,
    pub fc3:           Linear<B>,
    pub fc_mu:         Linear<B>,
    pub fc_logvar:     Linear<B>,
    pub fc_hidden:     Linear<B>,
    pub embedding:     Embedding<B>,
    pub gru_layers:    Vec<Gru<B>>,
    pub fc_out:        Linear<B>,
    pub dropout:       Dropout,
    pub activation:    Ignored<EncoderActivation>,
    pub teacher_ratio: f64,
}

pub struct ModelOutput<B: Backend> {
    /// [batch, seq_len, alphabet], rows sum to 1
    pub probs: Tensor<B, 3>,
    /// Scalar, mean over the batch
    pub kld:   Tensor<B, 1>,
}

impl<B: Backend> EncoderDecoder<B> {
    /// fingerprints: [batch, fp_len] → (z [batch, encoding], kld)
    pub fn encode(&self, fingerprints: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let act = &self.activation.0;
        let x = act.apply(self.fc1.forward(fingerprints));
        let x = self.dropout.forward(x);
        let x = act.apply(self.fc2.forward(x));
        let x = act.apply(self.fc3.forward(x));

        let mu     = self.fc_mu.forward(x.clone());
        let logvar = self.fc_logvar.forward(x);

        let kld = (logvar.clone() + 1.0 - mu.clone().powf_scalar(2.0) - logvar.clone().exp())
            .sum_dim(1)
            .mul_scalar(-0.5)
            .mean();

        let z = if B::ad_enabled() {
            let eps = Tensor::random(mu.dims(), Distribution::Normal(0.0, 1.0), &mu.device());
            mu + logvar.mul_scalar(0.5).exp() * eps
        } else {
            mu
        };
        (z, kld)
    }

    /// targets: [batch, seq_len]; their length sets the decode length.
    /// `teacher_forcing` is the generator for the per-step coin flips,
    /// `None` for free-running decoding.
    pub fn forward(
        &self,
        fingerprints:        Tensor<B, 2>,
        targets:             Tensor<B, 2, Int>,
        mut teacher_forcing: Option<&mut StdRng>,
    ) -> ModelOutput<B> {
        let [batch_size, seq_len] = targets.dims();
        let device = fingerprints.device();
        let (z, kld) = self.encode(fingerprints);

        let h0 = activation::relu(self.fc_hidden.forward(z));
        let mut states: Vec<Tensor<B, 2>> = vec![h0; self.gru_layers.len()];

        let mut input = Tensor::<B, 2, Int>::zeros([batch_size, 1], &device);
        let mut steps = Vec::with_capacity(seq_len);

        for n in 0..seq_len {
            let mut x = self.embedding.forward(input);
            for (layer, state) in self.gru_layers.iter().zip(states.iter_mut()) {
                // GRU state is [batch, 1, hidden]
                let out = layer.forward(x, Some(state.clone().unsqueeze_dim(1)));
                *state  = out.clone().reshape([batch_size, out.dims()[2]]);
                x       = self.dropout.forward(out);
            }
            let probs = activation::softmax(self.fc_out.forward(x), 2);

            let forced = teacher_forcing
                .as_deref_mut()
                .is_some_and(|rng| rng.gen::<f64>() < self.teacher_ratio);
            input = if forced {
                targets.clone().slice([0..batch_size, n..n + 1])
            } else {
                probs.clone().argmax(2).reshape([batch_size, 1])
            };
            steps.push(probs);
        }

        ModelOutput { probs: Tensor::cat(steps, 1), kld }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;

    fn tiny() -> EncoderDecoderConfig {
        EncoderDecoderConfig::new(4, 3, 8, 2, 31, 8, 8, 8)
    }

    #[test]
    fn test_output_shapes_and_normalisation() {
        let device = Default::default();
        let model: EncoderDecoder<NdArray> = tiny().init(&device);
        let fps  = Tensor::<NdArray, 2>::ones([2, 4], &device);
        let tgt  = Tensor::<NdArray, 2, Int>::zeros([2, 5], &device);
        let out  = model.forward(fps, tgt, None);
        assert_eq!(out.probs.dims(), [2, 5, 31]);

        let sums: Vec<f32> = out.probs.sum_dim(2).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
        let kld: f64 = out.kld.into_scalar().elem();
        assert!(kld.is_finite() && kld >= -1e-6);
    }

    #[test]
    fn test_eval_mode_is_deterministic() {
        let device = Default::default();
        let model: EncoderDecoder<Autodiff<NdArray>> = tiny().init(&device);
        let valid = model.valid();
        let fps = Tensor::<NdArray, 2>::ones([1, 4], &device);
        let tgt = Tensor::<NdArray, 2, Int>::zeros([1, 6], &device);
        let a: Vec<f32> = valid.forward(fps.clone(), tgt.clone(), None).probs.into_data().to_vec().unwrap();
        let b: Vec<f32> = valid.forward(fps, tgt, None).probs.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_teacher_forcing_follows_seed() {
        use rand::SeedableRng;

        let device = Default::default();
        let model: EncoderDecoder<NdArray> = tiny().with_teacher_ratio(0.5).init(&device);
        let fps = Tensor::<NdArray, 2>::ones([2, 4], &device);
        let tgt = Tensor::<NdArray, 2, Int>::from_data([[3, 7, 1, 9, 2, 5, 4, 8], [6, 2, 8, 1, 3, 3, 7, 0]], &device);

        let run = |seed: u64| -> Vec<f32> {
            let mut rng = StdRng::seed_from_u64(seed);
            model
                .forward(fps.clone(), tgt.clone(), Some(&mut rng))
                .probs
                .into_data()
                .to_vec()
                .unwrap()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_stacked_layers_with_larger_batch() {
        let device = Default::default();
        let cfg = EncoderDecoderConfig::new(4, 3, 8, 3, 31, 8, 8, 8);
        let model: EncoderDecoder<NdArray> = cfg.init(&device);
        let fps = Tensor::<NdArray, 2>::zeros([5, 4], &device);
        let tgt = Tensor::<NdArray, 2, Int>::zeros([5, 3], &device);
        assert_eq!(model.forward(fps, tgt, None).probs.dims(), [5, 3, 31]);
    }

    #[test]
    fn test_activation_parsing() {
        assert_eq!("GELU".parse::<EncoderActivation>().unwrap(), EncoderActivation::Gelu);
        assert!("swish".parse::<EncoderActivation>().is_err());
    }
}
