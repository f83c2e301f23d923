//! Bucket command - computes stable assignment buckets offline

use clap::Args;

use crate::domain::experiment::AssignmentHash;
use crate::infrastructure::experiment::ConsistentHasher;

#[derive(Args, Debug)]
pub struct BucketArgs {
    /// Caller (customer) identifier
    #[arg(long)]
    pub caller_id: String,

    /// Experiment identifier
    #[arg(long)]
    pub experiment_id: String,
}

/// Print the bucket so assignments can be checked across deployments
pub fn run(args: BucketArgs) -> anyhow::Result<()> {
    let bucket = ConsistentHasher::bucket(
        AssignmentHash::default(),
        &args.caller_id,
        &args.experiment_id,
    );

    println!(
        "{} {} {} {}",
        AssignmentHash::default(),
        args.experiment_id,
        args.caller_id,
        bucket
    );

    Ok(())
}
