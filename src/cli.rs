use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Question answering over regulatory documents", long_about = None)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add documents to the index.
    ///
    /// PDF files are read page by page. Any other file is read as UTF-8 text
    /// with pages separated by form feed characters.
    Ingest {
        /// PDF or text files to ingest
        #[clap(required = true)]
        paths: Vec<PathBuf>,

        /// Words per chunk (overrides config)
        #[clap(long)]
        chunk_size: Option<usize>,

        /// Words shared by consecutive chunks (overrides config)
        #[clap(long)]
        overlap: Option<usize>,
    },

    /// Print the chunks closest to a query
    Search {
        query: String,

        /// Number of chunks
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as json
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Answer a question from the indexed documents
    Ask {
        query: String,

        /// Number of chunks given to the model
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show index statistics
    Info {},

    /// Delete the index
    Reset {
        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
}
