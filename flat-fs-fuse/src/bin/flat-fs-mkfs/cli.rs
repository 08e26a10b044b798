use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file to create
    #[arg(long, short)]
    pub image: PathBuf,

    /// Volume size in blocks
    #[arg(long, short, default_value_t = 4096)]
    pub blocks: usize,

    /// Host directory whose regular files are copied into the root directory
    #[arg(long, short)]
    pub source: Option<PathBuf>,
}
