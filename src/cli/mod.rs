//! CLI module for the model experiment engine
//!
//! - `serve`: run the HTTP admin API
//! - `bucket`: print the stable traffic bucket of a caller

pub mod bucket;
pub mod serve;

use clap::{Parser, Subcommand};

/// Model experiment engine - A/B testing for fraud model variants
#[derive(Parser)]
#[command(name = "model-experiment-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve,

    /// Print the bucket (0-99) a caller lands in for an experiment
    Bucket(bucket::BucketArgs),
}
