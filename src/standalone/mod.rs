use anyhow::{bail, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

pub mod engine;

/// Default number of reduce partitions.
pub const DEFAULT_REDUCERS: u32 = 11;

/// Default target size of a map input split.
pub const DEFAULT_SPLIT_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// `<INPUT> <OUTPUT>`, or `<IGNORED> <INPUT> <OUTPUT>`. INPUT is a file,
    /// a directory, or a glob spec.
    #[arg(num_args = 2..=3, required = true, value_name = "PATHS")]
    pub paths: Vec<String>,

    /// Name of the workload
    #[arg(short, long, default_value = "season-goals")]
    pub workload: String,

    /// Number of reduce partitions (and output files)
    #[arg(short, long, default_value_t = DEFAULT_REDUCERS)]
    pub reducers: u32,

    /// Target size in bytes of a map input split
    #[arg(long, default_value_t = DEFAULT_SPLIT_SIZE)]
    pub split_size: u64,

    /// Skip the local combine pass after each map task
    #[arg(long)]
    pub no_combine: bool,

    /// Spill map output to parquet files instead of keeping it in memory
    #[arg(long)]
    pub spill: bool,

    /// Key away goals under the home team (reproduces the first version's output)
    #[arg(long)]
    pub legacy_away_key: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// How map output reaches the reduce tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShuffleMode {
    Memory,
    Spill,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: String,
    /// Auxiliary arguments passed to the workload.
    pub args: Vec<String>,
    pub n_reduce: u32,
    pub split_size: u64,
    pub combine: bool,
    pub shuffle: ShuffleMode,
}

impl Job {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            workload: "season-goals".into(),
            output: output.into(),
            args: Vec::new(),
            n_reduce: DEFAULT_REDUCERS,
            split_size: DEFAULT_SPLIT_SIZE,
            combine: true,
            shuffle: ShuffleMode::Memory,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_reduce == 0 {
            bail!("at least one reducer is required");
        }
        if self.split_size == 0 {
            bail!("split size must be positive");
        }
        Ok(())
    }
}

impl TryFrom<Args> for Job {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        // the three-argument form carries a leading argument we do not use
        let (input, output) = match args.paths.as_slice() {
            [input, output] | [_, input, output] => (input.clone(), output.clone()),
            other => bail!("expected 2 or 3 paths, got {}", other.len()),
        };
        let mut aux = Vec::new();
        if args.legacy_away_key {
            aux.push("--legacy-away-key".to_string());
        }
        let job = Job {
            input,
            workload: args.workload,
            output,
            args: aux,
            n_reduce: args.reducers,
            split_size: args.split_size,
            combine: !args.no_combine,
            shuffle: if args.spill {
                ShuffleMode::Spill
            } else {
                ShuffleMode::Memory
            },
        };
        job.validate()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(argv: &[&str]) -> Result<Job> {
        let args = Args::try_parse_from(std::iter::once("season-avg").chain(argv.iter().copied()))?;
        Job::try_from(args)
    }

    #[test]
    fn two_paths() {
        let job = job(&["in.csv", "out"]).unwrap();
        assert_eq!(job.input, "in.csv");
        assert_eq!(job.output, "out");
        assert_eq!(job.n_reduce, DEFAULT_REDUCERS);
        assert!(job.combine);
        assert_eq!(job.shuffle, ShuffleMode::Memory);
        assert!(job.args.is_empty());
    }

    #[test]
    fn three_paths_ignore_the_first() {
        let job = job(&["local", "in.csv", "out"]).unwrap();
        assert_eq!(job.input, "in.csv");
        assert_eq!(job.output, "out");
    }

    #[test]
    fn flags_map_onto_job() {
        let job = job(&["in", "out", "-r", "3", "--no-combine", "--spill", "--legacy-away-key"]).unwrap();
        assert_eq!(job.n_reduce, 3);
        assert!(!job.combine);
        assert_eq!(job.shuffle, ShuffleMode::Spill);
        assert_eq!(job.args, vec!["--legacy-away-key".to_string()]);
    }

    #[test]
    fn rejects_bad_arity_and_zero_reducers() {
        assert!(job(&["only-one"]).is_err());
        assert!(job(&["a", "b", "c", "d"]).is_err());
        assert!(job(&["in", "out", "-r", "0"]).is_err());
    }
}
