use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "datashed",
    about = "datashed - versioned content-addressable data for pipelines",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Operate on bundles
    Bundle(BundleArgs),
}

#[derive(Args)]
pub struct BundleArgs {
    #[command(subcommand)]
    pub command: BundleCommand,
}

#[derive(Subcommand)]
pub enum BundleCommand {
    /// Mount a bundle as a read-only filesystem
    Mount(MountArgs),
}

#[derive(Args, Debug)]
pub struct MountArgs {
    /// Repository holding the bundle
    #[arg(long)]
    pub repo: String,

    /// Bundle id to mount; latest when omitted
    #[arg(long)]
    pub bundle: Option<String>,

    /// Directory to mount the bundle at
    #[arg(long)]
    pub destination: PathBuf,

    /// Metadata store directory
    #[arg(long, default_value = ".datashed/meta")]
    pub meta: PathBuf,

    /// Blob store directory
    #[arg(long, default_value = ".datashed/blob")]
    pub blob: PathBuf,

    /// Owner uid stamped on mounted files
    #[arg(long, default_value_t = 0)]
    pub uid: u32,

    /// Owner gid stamped on mounted files
    #[arg(long, default_value_t = 0)]
    pub gid: u32,
}
