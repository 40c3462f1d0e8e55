//! The complete post-processing run: parse the mapping, rewrite the
//! descriptors of the obfuscated archive into an overlay directory, and
//! merge that overlay back into the archive.

use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use zip::ZipArchive;

use crate::archive::{self, ArchiveError};
use crate::descriptor::{self, DescriptorError, DocumentCache, DocumentSource, ModDescriptor};
use crate::index::MappingIndex;
use crate::mapping::{MappingFile, ParseError};
use crate::rewrite::DocumentRewriter;

/// Error of a [`Pipeline`] run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The mapping file is malformed.
    #[error("failed to parse mapping `{}`", path.display())]
    Mapping {
        /// The path of the mapping file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: ParseError,
    },
    /// The configuration file is not valid.
    #[error("failed to parse config `{}`", path.display())]
    Config {
        /// The path of the configuration file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// A descriptor document is missing, malformed or invalid.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// The archives could not be read or written.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
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

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_owned(),
        source,
    }
}

/// Settings of a [`Pipeline`] run.
///
/// Every field has a default, so a configuration file only needs to list
/// what it changes.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// The archive path of the module descriptor.
    pub descriptor: String,
    /// Whether to empty the overlay directory before writing to it.
    pub clean_overlay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            descriptor: descriptor::MOD_DESCRIPTOR.to_owned(),
            clean_overlay: true,
        }
    }
}

impl Config {
    /// Reads a configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path).map_err(io_error(path))?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Config {
            path: path.to_owned(),
            source,
        })
    }
}

/// The documents written by [`Pipeline::rewrite`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// The archive paths of all rewritten documents.
    pub documents: Vec<String>,
    /// The reference maps named by mixin descriptors, left untouched.
    pub refmaps: Vec<String>,
}

/// One post-processing run over an obfuscated archive.
#[derive(Clone, Debug)]
pub struct Pipeline {
    /// The obfuscated archive.
    pub input: PathBuf,
    /// The mapping file produced alongside `input`.
    pub mappings: PathBuf,
    /// The directory the rewritten documents are written to.
    pub overlay: PathBuf,
    /// The merged archive.
    pub output: PathBuf,
    /// Settings of the run.
    pub config: Config,
}

impl Pipeline {
    /// Runs all stages.
    pub fn run(&self) -> Result<RewriteReport, Error> {
        let source = fs::read(&self.mappings).map_err(io_error(&self.mappings))?;
        let mapping = MappingFile::new(&source);
        log::info!(
            "read mapping {}: {}",
            self.mappings.display(),
            mapping.summary()
        );

        let index = MappingIndex::parse(mapping).map_err(|source| Error::Mapping {
            path: self.mappings.clone(),
            source,
        })?;

        let input = fs::File::open(&self.input).map_err(io_error(&self.input))?;
        let jar = ZipArchive::new(BufReader::new(input)).map_err(ArchiveError::Open)?;

        let report = self.rewrite(&index, jar)?;
        archive::merge_files(&self.input, &self.overlay, &self.output)?;
        Ok(report)
    }

    /// Rewrites the module descriptor and every mixin descriptor it lists,
    /// read from `source`, into the overlay directory.
    pub fn rewrite<S: DocumentSource>(
        &self,
        index: &MappingIndex<'_>,
        source: S,
    ) -> Result<RewriteReport, Error> {
        if self.config.clean_overlay && self.overlay.exists() {
            fs::remove_dir_all(&self.overlay).map_err(io_error(&self.overlay))?;
        }
        fs::create_dir_all(&self.overlay).map_err(io_error(&self.overlay))?;

        let rewriter = DocumentRewriter::new(index);
        let mut cache = DocumentCache::new(source);
        let mut report = RewriteReport::default();

        let path = self.config.descriptor.as_str();
        if !descriptor::is_archive_relative(path) {
            return Err(DescriptorError::validation(
                path,
                "the module descriptor must be a relative path inside the archive",
            )
            .into());
        }
        let mod_descriptor = cache.get(path)?.clone();
        let descriptor = ModDescriptor::new(path, &mod_descriptor);

        let text = descriptor::normalize(path, &mod_descriptor)?;
        let text = rewriter.rewrite_entrypoints(&text, descriptor.entrypoints()?);
        self.write(path, &text)?;
        report.documents.push(path.to_owned());

        for path in descriptor.mixin_configs()? {
            let text = descriptor::normalize(path, cache.get(path)?)?;
            let (mixin, text) = rewriter.rewrite_mixin_descriptor(path, &text)?;
            self.write(path, &text)?;
            report.documents.push(path.to_owned());

            if let Some(refmap) = mixin.refmap {
                log::info!("leaving refmap {refmap} of {path} untouched");
                report.refmaps.push(refmap);
            }
        }

        Ok(report)
    }

    fn write(&self, path: &str, text: &str) -> Result<(), Error> {
        let target = self.overlay.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let mut contents = String::with_capacity(text.len() + 1);
        contents.push_str(text);
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        fs::write(&target, contents).map_err(io_error(&target))?;

        log::debug!("wrote {}", target.display());
        Ok(())
    }
}
