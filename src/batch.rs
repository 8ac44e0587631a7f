use crate::errors::*;
use crate::keyring::KeyRing;
use crate::pipeline::{FileTask, SignaturePipeline, DEFAULT_CHUNK_SIZE};
use crate::resolve;
use crate::sign::{DigestAlgorithm, Encoding, SigningBackend, SigningContext};
use sequoia_openpgp::crypto::Password;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;

/// What to do when signing a single file fails.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop at the first failure
    #[default]
    Abort,
    /// Record the failure and continue with the next file
    KeepGoing,
}

#[derive(Clone)]
pub struct BatchOptions {
    pub keyring: Option<PathBuf>,
    pub key_id: Option<String>,
    pub passphrase: Option<Password>,
    pub armor: bool,
    pub output_dir: Option<PathBuf>,
    pub digest: DigestAlgorithm,
    pub failure_mode: FailureMode,
    pub chunk_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            keyring: None,
            key_id: None,
            passphrase: None,
            armor: true,
            output_dir: None,
            digest: DigestAlgorithm::default(),
            failure_mode: FailureMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("keyring", &self.keyring)
            .field("key_id", &self.key_id)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("armor", &self.armor)
            .field("output_dir", &self.output_dir)
            .field("digest", &self.digest)
            .field("failure_mode", &self.failure_mode)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl BatchOptions {
    pub fn encoding(&self) -> Encoding {
        Encoding::from_armor(self.armor)
    }

    /// Ensure everything needed to unlock the signing key is set.
    pub fn validate(&self) -> Result<(&Path, &str, &Password)> {
        let keyring = self
            .keyring
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::Configuration("Secret keyring is not set".to_string()))?;
        let key_id = self
            .key_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::Configuration("Key id is empty".to_string()))?;
        let passphrase = self
            .passphrase
            .as_ref()
            .filter(|p| !p.map(|bytes| bytes.is_empty()))
            .ok_or_else(|| Error::Configuration("Passphrase is empty".to_string()))?;
        Ok((keyring, key_id, passphrase))
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub task: FileTask,
    pub error: Option<Error>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    fn push(&mut self, task: FileTask, result: Result<PathBuf>) {
        self.outcomes.push(FileOutcome {
            task,
            error: result.err(),
        });
    }

    pub fn signed(&self) -> impl Iterator<Item = &FileTask> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| &o.task)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(FileOutcome::is_success)
    }
}

pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(Error::OutputDirNotDirectory {
            path: dir.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("Creating output directory: {:?}", dir);
            fs::create_dir_all(dir).map_err(|source| Error::CreateOutputDir {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(Error::CreateOutputDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Signs a list of files with a single key from a secret keyring.
#[derive(Clone)]
pub struct BatchRunner {
    backend: Arc<dyn SigningBackend>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(backend: Arc<dyn SigningBackend>, options: BatchOptions) -> Self {
        BatchRunner { backend, options }
    }

    fn pipeline(&self) -> SignaturePipeline {
        SignaturePipeline::with_chunk_size(self.options.chunk_size)
    }

    /// Load the keyring, select the configured key and unlock it.
    pub fn unlock(&self) -> Result<SigningContext> {
        let (keyring, key_id, passphrase) = self.options.validate()?;
        let ring = KeyRing::from_file(keyring)?;
        let record = resolve::resolve(ring.records(), key_id)?;
        SigningContext::unlock(
            self.backend.clone(),
            record,
            passphrase,
            self.options.digest,
        )
    }

    /// Compute the destination of every file, creating the output directory if needed.
    pub fn plan(&self, files: &[PathBuf]) -> Result<Vec<FileTask>> {
        let output_dir = self
            .options
            .output_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = output_dir {
            prepare_output_dir(dir)?;
        }

        let encoding = self.options.encoding();
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(files.len());
        for file in files {
            let task = FileTask::new(file.clone(), output_dir, encoding)?;
            if !seen.insert(task.destination.clone()) {
                warn!(
                    "Multiple files write their signature to {:?}, only the last one is kept",
                    task.destination
                );
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Sign all files one after another, in the given order.
    pub fn run(&self, files: &[PathBuf]) -> Result<BatchReport> {
        let mut ctx = self.unlock()?;
        let tasks = self.plan(files)?;
        self.run_tasks(&mut ctx, tasks)
    }

    pub fn run_tasks(&self, ctx: &mut SigningContext, tasks: Vec<FileTask>) -> Result<BatchReport> {
        let pipeline = self.pipeline();
        let mut report = BatchReport::default();
        for task in tasks {
            debug!("Signing {:?}", task.source);
            match pipeline.sign(ctx, &task) {
                Err(err) if self.options.failure_mode == FailureMode::Abort => return Err(err),
                Err(err) => {
                    warn!("Failed to sign {:?}: {:#}", task.source, err);
                    report.push(task, Err(err));
                }
                Ok(dest) => report.push(task, Ok(dest)),
            }
        }
        Ok(report)
    }

    /// Sign up to `jobs` files concurrently, each with its own signing context.
    ///
    /// The key is unlocked once. After a failure in abort mode no further files
    /// are started, files that are already being signed are finished.
    pub async fn run_parallel(&self, files: &[PathBuf], jobs: usize) -> Result<BatchReport> {
        let runner = self.clone();
        let files = files.to_vec();
        let (ctx, tasks) = spawn_blocking(move || {
            let ctx = runner.unlock()?;
            let tasks = runner.plan(&files)?;
            Ok::<_, Error>((ctx, tasks))
        })
        .await
        .map_err(Error::Prepare)??;
        let pipeline = self.pipeline();
        let abort = self.options.failure_mode == FailureMode::Abort;

        let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
        let failed = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if abort && failed.load(Ordering::SeqCst) {
                debug!("Not starting remaining files after failure");
                break;
            }

            let mut ctx = ctx.fork();
            let pipeline = pipeline.clone();
            let failed = failed.clone();
            let worker_task = task.clone();
            let handle = spawn_blocking(move || {
                debug!("Signing {:?}", worker_task.source);
                let result = pipeline.sign(&mut ctx, &worker_task);
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                drop(permit);
                result
            });
            handles.push((task, handle));
        }

        let mut report = BatchReport::default();
        let mut first_error = None;
        for (task, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(source) => Err(Error::Worker {
                    path: task.source.clone(),
                    source,
                }),
            };
            match result {
                Err(err) if abort => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(err) => {
                    warn!("Failed to sign {:?}: {:#}", task.source, err);
                    report.push(task, Err(err));
                }
                Ok(dest) => report.push(task, Ok(dest)),
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(report)
    }
}
