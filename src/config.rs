use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "weft", about = "Small distributed filesystem with a single naming server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single-process cluster and drive it from an interactive shell
    Shell {
        /// Root directory of a storage server; repeat for more servers
        #[arg(long = "store", required = true)]
        stores: Vec<PathBuf>,

        /// Append logs to this file instead of stderr only
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}
