//! Command dispatch logic for criticality

use super::{BatchArgs, CollectArgs, EnumerateArgs, InitArgs, init_config, process_batch, process_collect, process_enumerate};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "criticality", version, author, long_about = None)]
#[command(about = "Collect criticality signals for open-source repositories")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect signals and scores for a list of repositories
    Collect(Box<CollectArgs>),
    /// List repositories by searching one creation day at a time
    Enumerate(Box<EnumerateArgs>),
    /// Collect a long list of repositories in resumable shards
    Batch(Box<BatchArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand. It's designed to be called from main.rs with the program arguments.
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::Collect(collect_args) => process_collect(host, collect_args).await,
        Command::Enumerate(enumerate_args) => process_enumerate(host, enumerate_args).await,
        Command::Batch(batch_args) => process_batch(host, batch_args).await,
        Command::Init(init_args) => init_config(host, init_args),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn collect_defaults() {
        let cli = Cli::try_parse_from(["criticality", "collect", "in.txt", "-"]).unwrap();
        let Command::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(args.format, crate::output::Format::Csv);
        assert!(args.job_id.is_empty());
        assert!(!args.scoring.scoring_disable);
    }

    #[test]
    fn scoring_disable_conflicts_with_config() {
        let _ = Cli::try_parse_from(["criticality", "collect", "in", "out", "--scoring-disable", "--scoring-config", "s.toml"]).unwrap_err();
    }

    #[test]
    fn enumerate_defaults() {
        let cli = Cli::try_parse_from(["criticality", "enumerate", "out.txt"]).unwrap();
        let Command::Enumerate(args) = cli.command else {
            panic!("expected enumerate");
        };
        assert_eq!(args.start_date.to_string(), "2008-01-01");
        assert_eq!((args.min_stars, args.star_overlap), (10, 5));
        assert_eq!(args.query, "is:public");
        assert_eq!(args.format, crate::output::UrlFormat::Text);
        assert_eq!(args.marker_type.to_string(), "full");
    }

    #[test]
    fn force_conflicts_with_append() {
        let _ = Cli::try_parse_from(["criticality", "enumerate", "out.txt", "--force", "--append"]).unwrap_err();
        let _ = Cli::try_parse_from(["criticality", "collect", "in", "out", "--force", "--append"]).unwrap_err();
    }

    #[test]
    fn batch_rejects_empty_shards() {
        let _ = Cli::try_parse_from(["criticality", "batch", "in", "out", "--shard-size", "0"]).unwrap_err();

        let cli = Cli::try_parse_from(["criticality", "batch", "in", "out"]).unwrap();
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.shard_size.get(), 1000);
    }
}
