//! Merging of an overlay directory into a base archive.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::descriptor::DocumentSource;

/// Error when merging archives.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The base archive is not a readable zip archive.
    #[error("failed to open base archive")]
    Open(#[source] ZipError),
    /// An entry of the base archive could not be read.
    #[error("failed to read entry #{index} of base archive")]
    Read {
        /// The index of the entry.
        index: usize,
        /// The underlying error.
        #[source]
        source: ZipError,
    },
    /// An entry could not be written to the output archive.
    #[error("failed to write `{entry}`")]
    Write {
        /// The archive path of the entry.
        entry: String,
        /// The underlying error.
        #[source]
        source: ZipError,
    },
    /// The output archive could not be finished.
    #[error("failed to finish output archive")]
    Finish(#[source] ZipError),
    /// A file system operation failed.
    #[error("i/o error on `{}`", path.display())]
    Io {
        /// The path the operation was performed on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// A file of the overlay directory.
#[derive(Clone, Debug, PartialEq, Eq)]
struct OverlayFile {
    /// The archive path, `/` separated.
    name: String,
    path: PathBuf,
}

/// Lists all files below `root`, sorted by file name at every level.
fn overlay_files(root: &Path) -> Result<Vec<OverlayFile>, ArchiveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| ArchiveError::Io {
            path: err.path().unwrap_or(root).to_owned(),
            source: err.into(),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(OverlayFile {
            name,
            path: entry.into_path(),
        });
    }
    Ok(files)
}

fn write_overlay_file<W: Write + Seek>(
    output: &mut ZipWriter<W>,
    file: &OverlayFile,
) -> Result<(), ArchiveError> {
    let bytes = fs::read(&file.path).map_err(ArchiveError::io(&file.path))?;

    // A fixed timestamp keeps repeated merges byte-identical.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let write_error = |source| ArchiveError::Write {
        entry: file.name.clone(),
        source,
    };
    output
        .start_file(file.name.as_str(), options)
        .map_err(write_error)?;
    output
        .write_all(&bytes)
        .map_err(|err| write_error(ZipError::from(err)))?;

    log::debug!("{} <- {}", file.name, file.path.display());
    Ok(())
}

/// Writes every entry of `base` to `sink`, taking the contents of a file
/// from the `overlay` directory instead wherever one exists at the same
/// path, then appends the overlay files the base did not have.
///
/// Entries of the base archive keep their order and, unless replaced, their
/// exact compressed bytes and metadata. New overlay files follow in sorted
/// path order. The finished sink is returned; it is only a valid archive if
/// this returns `Ok`.
pub fn merge<R, W>(base: R, overlay: &Path, sink: W) -> Result<W, ArchiveError>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let overlay = overlay_files(overlay)?;
    let by_name: HashMap<&str, &OverlayFile> =
        overlay.iter().map(|file| (file.name.as_str(), file)).collect();
    let mut replaced = HashSet::new();

    let mut base = ZipArchive::new(base).map_err(ArchiveError::Open)?;
    let mut output = ZipWriter::new(sink);

    for index in 0..base.len() {
        let entry = base
            .by_index_raw(index)
            .map_err(|source| ArchiveError::Read { index, source })?;

        match by_name.get(entry.name()) {
            Some(file) if !entry.is_dir() => {
                drop(entry);
                write_overlay_file(&mut output, file)?;
                replaced.insert(file.name.as_str());
            }
            _ => {
                let name = entry.name().to_owned();
                output
                    .raw_copy_file(entry)
                    .map_err(|source| ArchiveError::Write {
                        entry: name,
                        source,
                    })?;
            }
        }
    }

    for file in overlay.iter().filter(|file| !replaced.contains(file.name.as_str())) {
        write_overlay_file(&mut output, file)?;
    }

    output.finish().map_err(ArchiveError::Finish)
}

/// Merges the archive at `base` with the `overlay` directory into a new
/// archive at `output`.
///
/// The archive is written to a temporary file next to `output` first, which
/// only replaces `output` once the merge succeeded. `output` may be the same
/// file as `base`.
pub fn merge_files(base: &Path, overlay: &Path, output: &Path) -> Result<(), ArchiveError> {
    log::info!(
        "merging {} and {} into {}",
        base.display(),
        overlay.display(),
        output.display()
    );

    let reader = File::open(base).map_err(ArchiveError::io(base))?;

    let mut file_name = output.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    let temp = output.with_file_name(file_name);
    let writer = File::create(&temp).map_err(ArchiveError::io(&temp))?;

    let result = merge(BufReader::new(reader), overlay, BufWriter::new(writer)).and_then(
        |mut writer| writer.flush().map_err(ArchiveError::io(&temp)),
    );

    match result {
        Ok(()) => fs::rename(&temp, output).map_err(ArchiveError::io(output)),
        Err(err) => {
            if let Err(remove) = fs::remove_file(&temp) {
                log::warn!("failed to remove {}: {remove}", temp.display());
            }
            Err(err)
        }
    }
}

impl<R: Read + Seek> DocumentSource for ZipArchive<R> {
    fn read(&mut self, path: &str) -> io::Result<Vec<u8>> {
        let mut file = self.by_name(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
