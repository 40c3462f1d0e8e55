//! This crate fixes up obfuscated archives whose descriptor documents
//! reference classes and members by name.
//!
//! After proguard renamed the classes of an archive, string literals such as
//! entrypoints in a module descriptor or the package of a mixin descriptor
//! still carry the original names. This crate parses the proguard mapping,
//! rewrites those literals and merges the rewritten documents back into the
//! archive.
//!
//! # Examples
//!
//! ```
//! use proguard_rewrite::{DocumentRewriter, MappingFile, MappingIndex};
//!
//! let mapping = br#"com.example.Mod -> a.a:
//!     void init() -> a"#;
//! let index = MappingIndex::parse(MappingFile::new(mapping)).unwrap();
//!
//! // rewriting the entrypoints of a module descriptor
//! let rewriter = DocumentRewriter::new(&index);
//! assert_eq!(
//!     rewriter
//!         .rewrite_mod_descriptor(
//!             "fabric.mod.json",
//!             r#"{"entrypoints":{"main":"com.example.Mod::init"}}"#
//!         )
//!         .unwrap(),
//!     r#"{"entrypoints":{"main":"a.a::a"}}"#,
//! );
//! ```

#![warn(missing_docs)]

pub mod archive;
mod descriptor;
mod entrypoint;
mod index;
mod mapping;
pub mod pipeline;
mod rewrite;

pub use archive::ArchiveError;
pub use descriptor::{
    is_archive_relative, normalize, parse_document, DescriptorError, DirectorySource,
    DocumentCache, DocumentSource, MixinDescriptor, ModDescriptor, MOD_DESCRIPTOR,
};
pub use entrypoint::{pick, EntrypointRef, ResolutionCandidate};
pub use index::{ClassMapping, FieldMapping, MappingIndex, MemberMapping, MethodMapping, Renameable};
pub use mapping::{
    LineMapping, MappingFile, MappingRecord, MappingRecordIter, MappingSummary, ParseError,
    ParseErrorKind,
};
pub use pipeline::{Config, Pipeline, RewriteReport};
pub use rewrite::{DocumentRewriter, Renames};
