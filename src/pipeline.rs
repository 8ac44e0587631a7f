use crate::errors::*;
use crate::sign::{Encoding, SigningContext};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// One file to sign and where its signature goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub encoding: Encoding,
}

impl FileTask {
    pub fn new(source: PathBuf, output_dir: Option<&Path>, encoding: Encoding) -> Result<Self> {
        let destination = destination_for(&source, output_dir, encoding)?;
        Ok(FileTask {
            source,
            destination,
            encoding,
        })
    }
}

/// `<name>.asc` or `<name>.sig`, either next to the source or inside `output_dir`.
pub fn destination_for(
    source: &Path,
    output_dir: Option<&Path>,
    encoding: Encoding,
) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| Error::SourceNotFound {
        path: source.to_path_buf(),
    })?;
    let mut name = file_name.to_os_string();
    name.push(".");
    name.push(encoding.extension());

    let destination = if let Some(dir) = output_dir {
        dir.join(name)
    } else {
        source.with_file_name(name)
    };
    Ok(destination)
}

fn open_source(path: &Path) -> Result<File> {
    let file = File::open(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Error::Read {
                path: path.to_path_buf(),
                source: err,
            }
        }
    })?;

    let metadata = file.metadata().map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(Error::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    Ok(file)
}

/// Write to a temporary file next to `destination` and move it into place.
fn write_signature(destination: &Path, data: &[u8]) -> Result<()> {
    let write_err = |source| Error::Write {
        path: destination.to_path_buf(),
        source,
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix(".batchsig-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let mut tmp = builder.tempfile_in(dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;

    tmp.persist(destination)
        .map_err(|err| write_err(err.error))?;
    Ok(())
}

/// Streams files through a [`SigningContext`] and writes the encoded signature.
#[derive(Debug, Clone)]
pub struct SignaturePipeline {
    chunk_size: usize,
}

impl Default for SignaturePipeline {
    fn default() -> Self {
        SignaturePipeline {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SignaturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        SignaturePipeline {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Sign `task.source` and write the signature to `task.destination`.
    ///
    /// An existing file at the destination is replaced. The context is reset
    /// afterwards, even if signing failed.
    pub fn sign(&self, ctx: &mut SigningContext, task: &FileTask) -> Result<PathBuf> {
        let result = self.sign_file(ctx, task);
        ctx.reset();
        result
    }

    fn sign_file(&self, ctx: &mut SigningContext, task: &FileTask) -> Result<PathBuf> {
        let signing_err = |source| Error::Signing {
            path: task.source.clone(),
            source,
        };

        let mut file = open_source(&task.source)?;
        ctx.begin().map_err(signing_err)?;

        let mut buf = vec![0; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(Error::Read {
                        path: task.source.clone(),
                        source: err,
                    })
                }
            };
            ctx.update(&buf[..n]).map_err(signing_err)?;
            total += n as u64;
        }
        drop(file);
        trace!("Read {} bytes from {:?}", total, task.source);

        let sig = ctx.finalize(task.encoding).map_err(signing_err)?;
        let data = sig.encode().map_err(signing_err)?;

        debug!(
            "Writing {:?} signature for {:?} to {:?}",
            task.encoding, task.source, task.destination
        );
        write_signature(&task.destination, &data)?;
        Ok(task.destination.clone())
    }
}
