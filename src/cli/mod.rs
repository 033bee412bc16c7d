// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train` — trains the model and writes metrics/checkpoints
//   2. `score` — re-scores a saved checkpoint
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ScoreArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "selfies-vae",
    version = "0.1.0",
    about = "Train a fingerprint-to-SELFIES generator and score its reconstructions."
)]
pub struct Cli {
    /// The subcommand to run (train or score)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Score(args) => run_score(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting run '{}' on {}", args.run_name, args.data_path);
    let run = format!("{}/{}", args.models_dir, args.run_name);

    TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Metrics and checkpoints in {run}");
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<()> {
    use crate::application::score_use_case::ScoreUseCase;

    let use_case = ScoreUseCase::new(&args.models_dir, &args.run_name, args.epoch)?;
    let summary  = use_case.score()?;

    println!("\nRun '{}', epoch {}", args.run_name, args.epoch);
    println!("  mean QED            {:.4}", summary.mean_qed);
    println!("  mean fp recovery    {:.4}", summary.mean_fp_recon);
    println!("  valid molecules     {:.1}%", summary.valid_fraction * 100.0);
    println!("  batches             {}", summary.batches);
    Ok(())
}
