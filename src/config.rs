use crate::args::Args;
use crate::batch::{BatchOptions, FailureMode};
use crate::errors::*;
use crate::sign::DigestAlgorithm;
use anyhow::{anyhow, Context, Result};
use sequoia_openpgp::crypto::Password;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings that can be kept in a yaml file instead of passing them on every invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub keyring: Option<PathBuf>,
    pub key_id: Option<String>,
    pub passphrase_file: Option<PathBuf>,
    pub armor: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub digest: Option<DigestAlgorithm>,
    #[serde(default)]
    pub keep_going: bool,
    pub jobs: Option<usize>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Config {
    pub fn load_from_str(s: &str) -> Result<Self> {
        let x = serde_yaml::from_str(s).context("Failed to load config from string")?;
        Ok(x)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config file: {:?}", path);
        let s = fs::read_to_string(path)
            .with_context(|| anyhow!("Failed to read file: {:?}", path))?;
        let config = Config::load_from_str(&s).context("Failed to deserialize config")?;
        Ok(config)
    }
}

pub fn read_passphrase_file(path: &Path) -> Result<Password> {
    let mut buf = fs::read_to_string(path)
        .with_context(|| anyhow!("Failed to read passphrase from file: {:?}", path))?;
    buf.truncate(buf.trim_end().len());
    Ok(buf.into())
}

/// Everything needed to run a batch.
#[derive(Debug)]
pub struct Settings {
    pub options: BatchOptions,
    pub files: Vec<PathBuf>,
    pub jobs: usize,
}

impl Settings {
    /// Merge command line arguments on top of the config file, if any.
    pub fn load(args: Args) -> Result<Self> {
        let config = if let Some(path) = &args.config {
            Config::load_from_path(path)?
        } else {
            Config::default()
        };
        Self::merge(args, config)
    }

    pub fn merge(args: Args, config: Config) -> Result<Self> {
        let passphrase_file = args.passphrase_file.or(config.passphrase_file);
        let passphrase = if let Some(path) = &passphrase_file {
            Some(read_passphrase_file(path)?)
        } else {
            args.passphrase.map(Password::from)
        };

        let armor = if args.binary {
            false
        } else {
            config.armor.unwrap_or(true)
        };

        let failure_mode = if args.keep_going || config.keep_going {
            FailureMode::KeepGoing
        } else {
            FailureMode::Abort
        };

        let files = if args.files.is_empty() {
            config.files
        } else {
            args.files
        };

        let options = BatchOptions {
            keyring: args.keyring.or(config.keyring),
            key_id: args.key_id.or(config.key_id),
            passphrase,
            armor,
            output_dir: args.output_dir.or(config.output_dir),
            digest: args.digest.or(config.digest).unwrap_or_default(),
            failure_mode,
            ..Default::default()
        };

        Ok(Settings {
            options,
            files,
            jobs: args.jobs.or(config.jobs).unwrap_or(1).max(1),
        })
    }
}
