use crate::sign::DigestAlgorithm;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Create detached OpenPGP signatures for a list of files
#[derive(Debug, Default, Parser)]
#[command(version)]
pub struct Args {
    /// Turn debugging information on
    #[arg(short, long, action(ArgAction::Count))]
    pub verbose: u8,
    /// Reduce log output
    #[arg(short, long, action(ArgAction::Count))]
    pub quiet: u8,
    /// Load default settings from a yaml file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Path to the secret keyring (binary or ascii armored)
    #[arg(short = 'k', long, env = "BATCHSIG_KEYRING")]
    pub keyring: Option<PathBuf>,
    /// Hex key id of the signing key, either the full 64 bit id or the short 32 bit form
    #[arg(short = 'u', long, env = "BATCHSIG_KEY_ID")]
    pub key_id: Option<String>,
    /// Passphrase to unlock the signing key
    #[arg(long, env = "BATCHSIG_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
    /// Read the passphrase from a file (takes precedence over --passphrase)
    #[arg(long)]
    pub passphrase_file: Option<PathBuf>,
    /// Write binary .sig files instead of ascii armored .asc files
    #[arg(short, long)]
    pub binary: bool,
    /// Directory to write signatures to, by default they are written next to each file
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Digest algorithm used for the signatures [default: sha256]
    #[arg(long, value_enum)]
    pub digest: Option<DigestAlgorithm>,
    /// Continue with the remaining files if signing a file fails
    #[arg(long)]
    pub keep_going: bool,
    /// Number of files to sign concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// The files to sign
    pub files: Vec<PathBuf>,
}
