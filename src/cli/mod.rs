//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "scriptrag",
    version,
    author = "neur0map",
    about = "Ask questions about movie screenplays, answered from the scripts themselves",
    long_about = "ScriptRag chunks extracted screenplays into overlapping token windows, embeds them \
                  into a persistent vector index, and answers questions with a language model grounded \
                  in the nearest passages."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/scriptrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk and embed every extracted document
    Ingest {
        /// Directory of extracted {title, text} JSON files (defaults to <data_dir>/extracted)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Re-chunk and re-embed even unchanged documents
        #[arg(short, long)]
        force: bool,
    },

    /// Chunk extracted documents into the chunk store only
    Chunk {
        /// Directory of extracted {title, text} JSON files (defaults to <data_dir>/extracted)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Re-chunk even unchanged documents
        #[arg(short, long)]
        force: bool,
    },

    /// Embed everything in the chunk store into the index
    Embed {
        /// Re-embed even unchanged documents
        #[arg(short, long)]
        force: bool,
    },

    /// Ask one question
    Ask {
        /// Question to ask
        question: String,

        /// Number of passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the passages the answer was grounded on
        #[arg(long)]
        show_context: bool,
    },

    /// Interactive question loop (type 'exit' to quit)
    Repl,

    /// Retrieve passages without generating an answer
    Search {
        /// Search query text
        query: String,

        /// Number of passages to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show indexed records for one document
    Inspect {
        /// Document title
        #[arg(short, long)]
        title: String,

        /// Include embedding vectors
        #[arg(long)]
        with_vectors: bool,
    },

    /// Run the HTTP query service
    Serve {
        /// Address to bind (defaults to server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show index statistics
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_parses_top_k() {
        let cli = Cli::parse_from(["scriptrag", "ask", "Who is Mal?", "-k", "5", "--show-context"]);
        match cli.command {
            Commands::Ask {
                question,
                top_k,
                show_context,
            } => {
                assert_eq!(question, "Who is Mal?");
                assert_eq!(top_k, Some(5));
                assert!(show_context);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["scriptrag", "stats", "--profile", "online", "-v"]);
        assert_eq!(cli.profile.as_deref(), Some("online"));
        assert!(cli.verbose);
    }
}
