use clap::{Parser, Subcommand};
use jobwatch::config::HumanDuration;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobwatch")]
#[command(about = "Submit remote jobs and follow them to completion", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides JOBWATCH_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a job and poll it until it finishes (Ctrl+C cancels it)
    Run(RunArgs),
    /// Fetch the current status of a job once
    Status(JobArgs),
    /// Ask the service to cancel a job
    Cancel(JobArgs),
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Search term to run the job for
    #[arg(long)]
    pub search_term: String,

    /// Number of results to collect (1-50)
    #[arg(long, default_value_t = 10)]
    pub count: u32,

    /// Override controller.poll_interval, e.g. `500ms` or `2s`
    #[arg(long)]
    pub poll_interval: Option<HumanDuration>,

    /// Emit one JSON object per state change instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct JobArgs {
    /// Job identifier returned at submission
    pub job_id: String,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "jobwatch",
            "run",
            "--search-term",
            "rust",
            "--count",
            "5",
            "--poll-interval",
            "500ms",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.search_term, "rust");
                assert_eq!(args.count, 5);
                assert_eq!(
                    args.poll_interval.map(|d| d.as_duration()),
                    Some(Duration::from_millis(500))
                );
                assert!(!args.json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["jobwatch", "status", "job-1", "--config", "alt.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Commands::Status(ref args) if args.job_id == "job-1"));
    }

    #[test]
    fn test_run_requires_search_term() {
        assert!(Cli::try_parse_from(["jobwatch", "run"]).is_err());
    }
}
