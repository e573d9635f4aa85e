use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    feedback::{DEFAULT_ALPHA, DEFAULT_BETA, DEFAULT_GAMMA},
    search::{DEFAULT_LAMBDA, DEFAULT_TOPK},
};

#[derive(Debug, Parser)]
#[command(
    name = "cranbert",
    about = "Hybrid lexical and semantic search over the Cranfield collection"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding corpus.jsonl, queries.jsonl and qrels.jsonl
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    /// Override the sentence encoder model ID
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load or build the lexical and semantic indexes
    Index(IndexArgs),
    /// Rank the corpus against a query
    Search(SearchArgs),
    /// Re-rank with Rocchio relevance feedback
    Feedback(FeedbackArgs),
    /// Score the benchmark queries against their relevance judgments
    Eval(EvalArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Manage the sentence encoder model configuration
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Discard stored indexes and build both from the corpus
    #[arg(long)]
    pub rebuild: bool,
}

// -- Model --

#[derive(Debug, Subcommand)]
pub enum ModelAction {
    /// Show the currently resolved model
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a default model ID in config.redb
    Set {
        /// HuggingFace model ID
        model: String,
    },
    /// Clear the stored model setting (revert to default)
    Clear,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOPK)]
    pub count: usize,

    /// Weight of the semantic score (0 = lexical only, 1 = semantic only)
    #[arg(short, long, default_value_t = DEFAULT_LAMBDA)]
    pub lambda: f32,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Feedback --

#[derive(Debug, Parser)]
pub struct FeedbackArgs {
    /// The original query
    pub query: String,

    /// IDs of documents judged relevant
    #[arg(short, long, num_args = 1.., required = true)]
    pub relevant: Vec<String>,

    /// IDs of documents judged non-relevant
    #[arg(long, num_args = 1..)]
    pub non_relevant: Vec<String>,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOPK)]
    pub count: usize,

    /// Weight of the semantic score (0 = lexical only, 1 = semantic only)
    #[arg(short, long, default_value_t = DEFAULT_LAMBDA)]
    pub lambda: f32,

    /// Weight of the original query
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    pub alpha: f32,

    /// Weight of the relevant centroid
    #[arg(long, default_value_t = DEFAULT_BETA)]
    pub beta: f32,

    /// Weight of the non-relevant centroid
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    pub gamma: f32,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Eval --

#[derive(Debug, Parser)]
pub struct EvalArgs {
    /// Rank cutoff for P@k and nDCG@k
    #[arg(short, default_value_t = DEFAULT_TOPK)]
    pub k: usize,

    /// Weight of the semantic score (0 = lexical only, 1 = semantic only)
    #[arg(short, long, default_value_t = DEFAULT_LAMBDA)]
    pub lambda: f32,

    /// Re-rank each query with feedback from its own judgments
    #[arg(long)]
    pub feedback: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "cranbert",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["cranbert", "search", "shock waves"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "shock waves");
                assert_eq!(args.count, 10);
                assert_eq!(args.lambda, 0.5);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_feedback_ids_and_weights() {
        let cli = Cli::parse_from([
            "cranbert", "feedback", "wing flutter", "--relevant", "12", "51",
            "--beta", "0.5", "-l", "0",
        ]);
        match cli.command {
            Command::Feedback(args) => {
                assert_eq!(args.relevant, vec!["12", "51"]);
                assert!(args.non_relevant.is_empty());
                assert_eq!(args.alpha, 1.0);
                assert_eq!(args.beta, 0.5);
                assert_eq!(args.gamma, 0.0);
                assert_eq!(args.lambda, 0.0);
            }
            _ => panic!("expected feedback command"),
        }
    }

    #[test]
    fn feedback_requires_relevant_ids() {
        assert!(Cli::try_parse_from(["cranbert", "feedback", "wing"]).is_err());
    }

    #[test]
    fn parse_eval_with_global_flags() {
        let cli = Cli::parse_from([
            "cranbert", "eval", "-k", "5", "--feedback", "--data-dir", "/tmp/x", "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Command::Eval(args) => {
                assert_eq!(args.k, 5);
                assert!(args.feedback);
            }
            _ => panic!("expected eval command"),
        }
    }
}
