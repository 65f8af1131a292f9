//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lgsync - Synchronize Logitech gaming-software profiles with a host.
///
/// Watches the profiles directory, keeps an in-memory registry of
/// parsed profiles and streams list/current-profile/key-state updates
/// to stdout as the active profile changes.
#[derive(Parser, Debug)]
#[command(name = "lgsync", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines (stderr) and notifications as JSON (stdout)
    #[arg(long, global = true, env = "LGSYNC_JSON")]
    pub json: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the synchronization engine until interrupted
    Run(RunArgs),

    /// Parse one profile file and print it
    Parse(ParseArgs),

    /// Parse a profiles directory and list what it contains
    List(ListArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Profiles directory (defaults to the platform's install location)
    #[arg(long, short = 'd', env = "LGSYNC_PROFILES_DIR")]
    pub dir: Option<PathBuf>,

    /// Device types to load assignments for (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "Keyboard")]
    pub devices: Vec<String>,

    /// Polling interval in milliseconds (0 disables watching)
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Track the active profile without switching to it
    #[arg(long)]
    pub no_auto_switch: bool,

    /// Text reported for keys with no macro assigned
    #[arg(long)]
    pub unmapped: Option<String>,

    /// Polling only, no OS file-change notifications
    #[arg(long)]
    pub no_native_fs: bool,
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Profile XML file
    pub file: PathBuf,

    /// Device types to load assignments for (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "Keyboard")]
    pub devices: Vec<String>,

    /// Only read the identity header (guid, name, timestamps)
    #[arg(long)]
    pub header_only: bool,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Profiles directory (defaults to the platform's install location)
    #[arg(long, short = 'd', env = "LGSYNC_PROFILES_DIR")]
    pub dir: Option<PathBuf>,

    /// Device types to load assignments for (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "Keyboard")]
    pub devices: Vec<String>,
}
