//! Module descriptors and mixin descriptors.
//!
//! Descriptors are JSON documents. They are read through a
//! [`DocumentSource`], usually the obfuscated archive itself, and parsed with
//! `serde_json`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// The file name of the module descriptor at the root of an archive.
pub const MOD_DESCRIPTOR: &str = "fabric.mod.json";

/// Error when reading or validating a descriptor document.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// The document could not be read from its source.
    #[error("failed to read `{path}`")]
    Io {
        /// The path of the document.
        path: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The document is not valid JSON.
    #[error("failed to parse `{path}`")]
    Document {
        /// The path of the document.
        path: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The document is valid JSON but misses a required key, or has a value
    /// of the wrong type.
    #[error("invalid `{path}`: {message}")]
    Validation {
        /// The path of the document.
        path: String,
        /// What is wrong with the document.
        message: &'static str,
    },
}

impl DescriptorError {
    pub(crate) fn validation(path: &str, message: &'static str) -> Self {
        Self::Validation {
            path: path.to_owned(),
            message,
        }
    }
}

/// Somewhere descriptor documents can be read from, by archive-relative path.
pub trait DocumentSource {
    /// Reads the raw bytes of the document at `path`.
    fn read(&mut self, path: &str) -> io::Result<Vec<u8>>;
}

/// Reads documents from a directory mirroring the archive layout.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DocumentSource for DirectorySource {
    fn read(&mut self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(path))
    }
}

/// Whether `path` names a location inside the archive, so that joining it
/// onto a directory never leaves that directory.
pub fn is_archive_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Parses a document.
pub fn parse_document(path: &str, bytes: &[u8]) -> Result<Value, DescriptorError> {
    serde_json::from_slice(bytes).map_err(|source| DescriptorError::Document {
        path: path.to_owned(),
        source,
    })
}

/// Serializes a document in the stable form the rewriter works on.
///
/// Keys keep their document order, every value sits on its own line and
/// strings are written with the minimal set of escapes, so any string
/// literal of the original document appears verbatim in the output.
pub fn normalize(path: &str, value: &Value) -> Result<String, DescriptorError> {
    serde_json::to_string_pretty(value).map_err(|source| DescriptorError::Document {
        path: path.to_owned(),
        source,
    })
}

/// Memoizes parsed documents per path.
#[derive(Debug)]
pub struct DocumentCache<S> {
    source: S,
    documents: HashMap<String, Value>,
}

impl<S: DocumentSource> DocumentCache<S> {
    /// Creates an empty cache over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            documents: HashMap::new(),
        }
    }

    /// Returns the parsed document at `path`, reading it on first use.
    pub fn get(&mut self, path: &str) -> Result<&Value, DescriptorError> {
        let value = match self.documents.entry(path.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let bytes = self
                    .source
                    .read(path)
                    .map_err(|source| DescriptorError::Io {
                        path: path.to_owned(),
                        source,
                    })?;
                entry.insert(parse_document(path, &bytes)?)
            }
        };
        Ok(&*value)
    }

    /// Reads the mixin descriptor at `path`.
    pub fn mixin(&mut self, path: &str) -> Result<MixinDescriptor, DescriptorError> {
        MixinDescriptor::from_value(path, self.get(path)?)
    }
}

/// A view over a parsed module descriptor.
#[derive(Clone, Copy, Debug)]
pub struct ModDescriptor<'d> {
    path: &'d str,
    value: &'d Value,
}

impl<'d> ModDescriptor<'d> {
    /// Wraps the parsed document found at `path`.
    pub fn new(path: &'d str, value: &'d Value) -> Self {
        Self { path, value }
    }

    /// All entrypoint references, across all entrypoint categories.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_rewrite::ModDescriptor;
    ///
    /// let value = serde_json::json!({
    ///     "entrypoints": {
    ///         "main": "com.example.Mod",
    ///         "client": ["com.example.Client", { "value": "com.example.Client::init" }],
    ///     }
    /// });
    /// let descriptor = ModDescriptor::new("fabric.mod.json", &value);
    /// assert_eq!(
    ///     descriptor.entrypoints().unwrap(),
    ///     ["com.example.Mod", "com.example.Client", "com.example.Client::init"],
    /// );
    /// ```
    pub fn entrypoints(&self) -> Result<Vec<&'d str>, DescriptorError> {
        let mut entrypoints = Vec::new();
        if let Some(Value::Object(categories)) = self.value.get("entrypoints") {
            for value in categories.values() {
                self.collect_entrypoints(value, &mut entrypoints)?;
            }
        }
        Ok(entrypoints)
    }

    fn collect_entrypoints(
        &self,
        value: &'d Value,
        out: &mut Vec<&'d str>,
    ) -> Result<(), DescriptorError> {
        match value {
            Value::String(entrypoint) => out.push(entrypoint),
            Value::Array(values) => {
                for value in values {
                    self.collect_entrypoints(value, out)?;
                }
            }
            Value::Object(object) => match object.get("value") {
                Some(Value::String(entrypoint)) => out.push(entrypoint),
                Some(_) => {
                    return Err(DescriptorError::validation(
                        self.path,
                        "entrypoint `value` must be a string",
                    ))
                }
                None => {
                    return Err(DescriptorError::validation(
                        self.path,
                        "entrypoint objects require the `value` key",
                    ))
                }
            },
            Value::Null => {
                return Err(DescriptorError::validation(
                    self.path,
                    "entrypoints can't be null",
                ))
            }
            Value::Bool(_) | Value::Number(_) => {
                return Err(DescriptorError::validation(
                    self.path,
                    "entrypoints must be strings, arrays or objects",
                ))
            }
        }
        Ok(())
    }

    /// The paths of all mixin descriptors listed under `mixins`.
    ///
    /// A path that is absolute or climbs out of the archive root is a
    /// validation error.
    pub fn mixin_configs(&self) -> Result<Vec<&'d str>, DescriptorError> {
        let Some(Value::Array(mixins)) = self.value.get("mixins") else {
            return Ok(Vec::new());
        };

        mixins
            .iter()
            .map(|mixin| match mixin {
                Value::String(path) => self.config_path(path),
                Value::Object(object) => match object.get("config") {
                    Some(Value::String(path)) => self.config_path(path),
                    _ => Err(DescriptorError::validation(
                        self.path,
                        "`mixins` entry objects must have a `config` string",
                    )),
                },
                _ => Err(DescriptorError::validation(
                    self.path,
                    "`mixins` entries must be strings or objects",
                )),
            })
            .collect()
    }

    fn config_path(&self, path: &'d str) -> Result<&'d str, DescriptorError> {
        if is_archive_relative(path) {
            Ok(path)
        } else {
            Err(DescriptorError::validation(
                self.path,
                "`mixins` paths must be relative paths inside the archive",
            ))
        }
    }
}

/// A parsed mixin descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixinDescriptor {
    /// The archive-relative path of the descriptor.
    pub path: String,
    /// The original package of all mixin classes listed in the descriptor.
    pub package: String,
    /// The path of the reference map, if any.
    pub refmap: Option<String>,
}

impl MixinDescriptor {
    /// Reads the descriptor out of the parsed document found at `path`.
    pub fn from_value(path: &str, value: &Value) -> Result<Self, DescriptorError> {
        let package = match value.get("package") {
            Some(Value::String(package)) => package.clone(),
            Some(_) => {
                return Err(DescriptorError::validation(
                    path,
                    "mixin `package` must be a string",
                ))
            }
            None => {
                return Err(DescriptorError::validation(
                    path,
                    "mixin descriptors require the `package` key",
                ))
            }
        };

        Ok(Self {
            path: path.to_owned(),
            package,
            refmap: value.get("refmap").and_then(Value::as_str).map(str::to_owned),
        })
    }
}
