//! Rewriting of stale name literals in descriptor documents.
//!
//! Rewriting works on the serialized text, line by line: every JSON string
//! literal whose content equals a known original name is replaced by the
//! obfuscated name. Everything else, including whitespace and the layout of
//! the document, is left byte-for-byte untouched.

use std::collections::HashMap;

use crate::descriptor::{self, DescriptorError, MixinDescriptor, ModDescriptor};
use crate::entrypoint::{self, EntrypointRef};
use crate::index::{MappingIndex, Renameable};

/// A set of literal replacements.
///
/// When two replacements are registered for the same literal, the first one
/// wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Renames {
    literals: HashMap<String, String>,
}

impl Renames {
    /// Creates an empty set of replacements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the replacement of the literal `from` by `to`.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        if from != to {
            self.literals.entry(from).or_insert(to);
        }
    }

    /// The number of registered replacements.
    pub fn len(&self) -> usize {
        self.literals.len()
    }

    /// Whether no replacement is registered.
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// The replacement for the literal `from`, if any.
    pub fn get(&self, from: &str) -> Option<&str> {
        self.literals.get(from).map(String::as_str)
    }

    /// Applies the replacements to `text`.
    ///
    /// Line endings are preserved, including a missing one at the end.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_rewrite::Renames;
    ///
    /// let mut renames = Renames::new();
    /// renames.insert("com.example.Mod", "a.a");
    ///
    /// assert_eq!(
    ///     renames.apply("{\n  \"main\": \"com.example.Mod\",\n  \"id\": \"com.example.Mod2\"\n}"),
    ///     "{\n  \"main\": \"a.a\",\n  \"id\": \"com.example.Mod2\"\n}",
    /// );
    /// ```
    pub fn apply(&self, text: &str) -> String {
        if self.is_empty() {
            return text.to_owned();
        }

        let mut output = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            self.apply_line(line, &mut output);
        }
        output
    }

    fn apply_line(&self, line: &str, output: &mut String) {
        let mut rest = line;
        while let Some(start) = rest.find('"') {
            let (before, literal) = rest.split_at(start + 1);
            output.push_str(before);

            let Some(end) = literal_end(literal) else {
                // unterminated, cannot happen for well formed json
                rest = literal;
                break;
            };

            let content = &literal[..end];
            match self.get(content) {
                Some(replacement) => {
                    log::debug!("rewriting \"{content}\" to \"{replacement}\"");
                    output.push_str(replacement);
                }
                None => output.push_str(content),
            }
            output.push('"');
            rest = &literal[end + 1..];
        }
        output.push_str(rest);
    }
}

/// The position of the closing quote of a string literal whose opening
/// quote has already been consumed.
fn literal_end(literal: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in literal.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Rewrites descriptor documents according to a [`MappingIndex`].
#[derive(Clone, Copy, Debug)]
pub struct DocumentRewriter<'i, 's> {
    index: &'i MappingIndex<'s>,
}

impl<'i, 's> DocumentRewriter<'i, 's> {
    /// Creates a rewriter backed by `index`.
    pub fn new(index: &'i MappingIndex<'s>) -> Self {
        Self { index }
    }

    /// The replacements for a list of entrypoint references.
    ///
    /// References that are malformed or not found in the mapping are
    /// skipped. A reference with several candidates is rewritten to the
    /// first one.
    pub fn entrypoint_renames<'r>(&self, entrypoints: impl IntoIterator<Item = &'r str>) -> Renames {
        let mut renames = Renames::new();
        for entrypoint in entrypoints {
            let Some(reference) = EntrypointRef::parse(entrypoint) else {
                log::debug!("skipping malformed entrypoint '{entrypoint}'");
                continue;
            };
            let candidates = reference.resolve(self.index);
            if let Some(candidate) = entrypoint::pick(&reference, &candidates) {
                renames.insert(candidate.original(), candidate.obfuscated());
            }
        }
        renames
    }

    /// The replacements for the mixin package `package`: the package itself
    /// and the package-relative name of every class under it.
    pub fn package_renames(&self, package: &str) -> Renames {
        let mut renames = Renames::new();
        let renamed_package = self.index.find_package(package).unwrap_or(package);
        renames.insert(package, renamed_package);

        for class in self.index.find_classes_in_package(package) {
            let Some(from) = class
                .from()
                .strip_prefix(package)
                .and_then(|from| from.strip_prefix('.'))
            else {
                continue;
            };
            let to = class
                .to()
                .strip_prefix(renamed_package)
                .and_then(|to| to.strip_prefix('.'))
                .unwrap_or(class.to());
            renames.insert(from, to);
        }
        renames
    }

    /// Rewrites the entrypoint references `entrypoints` in `text`.
    pub fn rewrite_entrypoints<'r>(
        &self,
        text: &str,
        entrypoints: impl IntoIterator<Item = &'r str>,
    ) -> String {
        self.entrypoint_renames(entrypoints).apply(text)
    }

    /// Rewrites the mixin package `package` and its classes in `text`.
    pub fn rewrite_package(&self, text: &str, package: &str) -> String {
        self.package_renames(package).apply(text)
    }

    /// Rewrites a module descriptor, using the entrypoints it declares.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_rewrite::{DocumentRewriter, MappingFile, MappingIndex};
    ///
    /// let mapping = b"com.example.Mod -> a.a:\n    void init() -> a\n";
    /// let index = MappingIndex::parse(MappingFile::new(mapping)).unwrap();
    ///
    /// let rewritten = DocumentRewriter::new(&index)
    ///     .rewrite_mod_descriptor(
    ///         "fabric.mod.json",
    ///         r#"{"entrypoints":{"main":"com.example.Mod::init"}}"#,
    ///     )
    ///     .unwrap();
    /// assert_eq!(rewritten, r#"{"entrypoints":{"main":"a.a::a"}}"#);
    /// ```
    pub fn rewrite_mod_descriptor(&self, path: &str, text: &str) -> Result<String, DescriptorError> {
        let value = descriptor::parse_document(path, text.as_bytes())?;
        let entrypoints = ModDescriptor::new(path, &value).entrypoints()?;
        Ok(self.rewrite_entrypoints(text, entrypoints))
    }

    /// Rewrites a mixin descriptor, using the package it declares.
    ///
    /// The `refmap` entry is left alone.
    pub fn rewrite_mixin_descriptor(
        &self,
        path: &str,
        text: &str,
    ) -> Result<(MixinDescriptor, String), DescriptorError> {
        let value = descriptor::parse_document(path, text.as_bytes())?;
        let mixin = MixinDescriptor::from_value(path, &value)?;
        let mut renames = self.package_renames(&mixin.package);
        if let Some(refmap) = &mixin.refmap {
            renames.literals.remove(refmap.as_str());
        }
        let text = renames.apply(text);
        Ok((mixin, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MappingFile;

    const MAPPING: &str = "\
com.example.Mod -> a.a:
    void init() -> a
    void init(int) -> a
com.example.mixin.TitleScreenMixin -> a.b.a:
com.example.mixin.client.HudMixin -> a.b.b:
com.example.mixin.Hidden -> a.b.c:
";

    fn index() -> MappingIndex<'static> {
        MappingIndex::parse(MappingFile::new(MAPPING.as_bytes())).unwrap()
    }

    #[test]
    fn literal_scanning_respects_escapes() {
        let mut renames = Renames::new();
        renames.insert("a", "b");
        assert_eq!(renames.apply(r#""\"a" "a" "a\\" "#), r#""\"a" "b" "a\\" "#);
    }

    #[test]
    fn first_rename_wins() {
        let mut renames = Renames::new();
        renames.insert("x", "y");
        renames.insert("x", "z");
        renames.insert("same", "same");
        assert_eq!(renames.get("x"), Some("y"));
        assert_eq!(renames.len(), 1);
    }

    #[test]
    fn renames_are_not_chained() {
        let mut renames = Renames::new();
        renames.insert("a", "b");
        renames.insert("b", "c");
        assert_eq!(renames.apply(r#"["a", "b"]"#), r#"["b", "c"]"#);
    }

    #[test]
    fn unknown_entrypoints_are_untouched() {
        let index = index();
        let text = "{\r\n  \"entrypoints\": {\r\n    \"main\": [\"com.example.Mod\", \"com.other.Mod::init\"]\r\n  }\r\n}\r\n";
        let rewritten = DocumentRewriter::new(&index)
            .rewrite_mod_descriptor("fabric.mod.json", text)
            .unwrap();
        assert_eq!(
            rewritten,
            "{\r\n  \"entrypoints\": {\r\n    \"main\": [\"a.a\", \"com.other.Mod::init\"]\r\n  }\r\n}\r\n"
        );
    }

    #[test]
    fn overloaded_entrypoint() {
        let index = index();
        let rewritten = DocumentRewriter::new(&index)
            .rewrite_mod_descriptor(
                "fabric.mod.json",
                r#"{"entrypoints":{"main":[{"adapter":"default","value":"com.example.Mod::init"}]}}"#,
            )
            .unwrap();
        assert_eq!(
            rewritten,
            r#"{"entrypoints":{"main":[{"adapter":"default","value":"a.a::a"}]}}"#
        );
    }

    #[test]
    fn mixin_package() {
        let index = index();
        let text = r#"{
  "required": true,
  "package": "com.example.mixin",
  "refmap": "example-refmap.json",
  "mixins": [
    "TitleScreenMixin",
    "Unmapped"
  ],
  "client": [
    "client.HudMixin"
  ]
}"#;
        let (mixin, rewritten) = DocumentRewriter::new(&index)
            .rewrite_mixin_descriptor("example.mixins.json", text)
            .unwrap();
        assert_eq!(mixin.package, "com.example.mixin");
        assert_eq!(
            rewritten,
            r#"{
  "required": true,
  "package": "a.b",
  "refmap": "example-refmap.json",
  "mixins": [
    "a",
    "Unmapped"
  ],
  "client": [
    "b"
  ]
}"#
        );
    }

    #[test]
    fn mixin_without_package_key() {
        let index = index();
        let err = DocumentRewriter::new(&index)
            .rewrite_mixin_descriptor("example.mixins.json", r#"{"mixins": []}"#)
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Validation { .. }));
    }

    #[test]
    fn broken_descriptor() {
        let index = index();
        let err = DocumentRewriter::new(&index)
            .rewrite_mod_descriptor("fabric.mod.json", "{\"entrypoints\": ")
            .unwrap_err();
        assert!(matches!(err, DescriptorError::Document { .. }));
    }

    #[test]
    fn unmapped_package() {
        let index = index();
        let renames = DocumentRewriter::new(&index).package_renames("org.unrelated.mixin");
        assert!(renames.is_empty());
    }
}
