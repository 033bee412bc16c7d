// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All training-time tensor code lives here.
//
//   model.rs     — GRU encoder-decoder: fingerprint → latent
//                  (reparameterised, KL term) → SELFIES token
//                  probabilities, teacher forcing optional
//
//   annealing.rs — KL weight schedule (linear/cosine/logistic)
//
//   loss.rs      — token-level reconstruction loss
//
//   scoring.rs   — decode generated SELFIES, mean QED and
//                  fingerprint recovery over a loader
//
//   trainer.rs   — epoch state machine: train, validate, score,
//                  persist metrics, checkpoint
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Kingma & Welling (2014) Auto-Encoding Variational Bayes
//            Bowman et al. (2016) Generating Sentences from a Continuous Space

pub mod annealing;

pub mod loss;

pub mod model;

pub mod scoring;

pub mod trainer;
