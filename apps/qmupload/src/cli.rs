//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// Upload or download a VM image to or from a QManager server.
///
/// Uploads are checked for a supported image extension and gzipped unless
/// already compressed. When downloading, the remote file named after the
/// base name of FILE_PATH is saved at FILE_PATH; without FILE_PATH the
/// user's files are listed to choose from.
#[derive(Parser, Debug)]
#[command(name = "qmupload")]
#[command(version)]
pub struct Cli {
    /// Download a file from QManager.
    #[arg(short, long)]
    pub download: bool,

    /// No interactive confirmation.
    #[arg(short = 'n', long)]
    pub no_confirm: bool,

    /// Be quiet: no progress output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Use the shared storage area.
    #[arg(short, long)]
    pub shared: bool,

    /// Upload the file as-is, without gzipping it first.
    #[arg(long)]
    pub no_compress: bool,

    /// Give up after this many confirmation polls.
    #[arg(long, value_name = "N")]
    pub max_polls: Option<u32>,

    /// Control-plane HTTP port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Configuration file (default: ~/.config/qmanager/config.json).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log transfer details to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// User to transfer the file as.
    pub user_name: String,

    /// Local file. For uploads a directory selects its first `*.gz` file.
    #[arg(required_unless_present = "download")]
    pub file_path: Option<PathBuf>,

    /// QManager server name or address.
    pub qmanager_server: Option<String>,
}

impl Cli {
    pub fn operation(&self) -> &'static str {
        if self.download { "Download" } else { "Upload" }
    }
}
