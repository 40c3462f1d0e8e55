//! A Parser for Proguard Mapping Files.
//!
//! The mapping file format is described
//! [here](https://www.guardsquare.com/en/products/proguard/manual/retrace).

use std::fmt;
use std::str;

#[cfg(feature = "uuid")]
use uuid::Uuid;

/// Error when parsing a proguard mapping.
///
/// Since the mapping is parsed line-by-line, an error will also contain
/// the offending line and its 1-based line number.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("line {line_number}: {kind}: `{line}`")]
pub struct ParseError {
    line_number: usize,
    line: String,
    kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line_number: usize, line: &[u8], kind: ParseErrorKind) -> Self {
        Self {
            line_number,
            line: String::from_utf8_lossy(line).into_owned(),
            kind,
        }
    }

    /// The 1-based number of the offending line.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The offending line that caused the error.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The specific parse Error.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

/// The specific parse Error.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    /// The line failed utf-8 conversion.
    #[error(transparent)]
    Utf8Error(#[from] str::Utf8Error),
    /// The line failed parsing.
    #[error("{0}")]
    ParseError(&'static str),
    /// A member line appeared before any class line.
    #[error("member record outside of a class")]
    MemberOutsideClass,
    /// Two class lines share the same original name.
    #[error("duplicate mapping for class `{0}`")]
    DuplicateClass(String),
}

const INVALID_RECORD: ParseErrorKind = ParseErrorKind::ParseError("line is not a valid proguard record");

/// Summary of a mapping file.
pub struct MappingSummary<'s> {
    compiler: Option<&'s str>,
    compiler_version: Option<&'s str>,
    min_api: Option<u32>,
    class_count: usize,
    method_count: usize,
    field_count: usize,
}

impl<'s> MappingSummary<'s> {
    fn new(mapping: &MappingFile<'s>) -> MappingSummary<'s> {
        let mut compiler = None;
        let mut compiler_version = None;
        let mut min_api = None;
        let mut class_count = 0;
        let mut method_count = 0;
        let mut field_count = 0;

        for (_, record) in mapping.iter() {
            match record {
                Ok(MappingRecord::Header { key, value }) => match key {
                    "compiler" => {
                        compiler = value;
                    }
                    "compiler_version" => {
                        compiler_version = value;
                    }
                    "min_api" => {
                        min_api = value.and_then(|x| x.parse().ok());
                    }
                    _ => {}
                },
                Ok(MappingRecord::Class { .. }) => class_count += 1,
                Ok(MappingRecord::Method { .. }) => method_count += 1,
                Ok(MappingRecord::Field { .. }) => field_count += 1,
                Err(_) => {}
            }
        }

        MappingSummary {
            compiler,
            compiler_version,
            min_api,
            class_count,
            method_count,
            field_count,
        }
    }

    /// Returns the name of the compiler that created the proguard mapping.
    pub fn compiler(&self) -> Option<&str> {
        self.compiler
    }

    /// Returns the version of the compiler.
    pub fn compiler_version(&self) -> Option<&str> {
        self.compiler_version
    }

    /// Returns the min-api value.
    pub fn min_api(&self) -> Option<u32> {
        self.min_api
    }

    /// Returns the number of classes in the mapping file.
    pub fn class_count(&self) -> usize {
        self.class_count
    }

    /// Returns the number of method lines in the mapping file.
    pub fn method_count(&self) -> usize {
        self.method_count
    }

    /// Returns the number of field lines in the mapping file.
    pub fn field_count(&self) -> usize {
        self.field_count
    }
}

impl fmt::Display for MappingSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} classes, {} methods, {} fields",
            self.class_count, self.method_count, self.field_count
        )?;
        if let Some(compiler) = self.compiler {
            write!(f, " (compiler: {compiler}")?;
            if let Some(version) = self.compiler_version {
                write!(f, " {version}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// A Proguard Mapping file.
#[derive(Clone, Default)]
pub struct MappingFile<'s> {
    source: &'s [u8],
}

impl fmt::Debug for MappingFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingFile").finish()
    }
}

impl<'s> MappingFile<'s> {
    /// Create a new Proguard Mapping.
    pub fn new(source: &'s [u8]) -> Self {
        Self { source }
    }

    /// Whether the mapping file is indeed valid.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_rewrite::MappingFile;
    ///
    /// let valid = MappingFile::new(b"a -> b:\n    void method() -> b");
    /// assert_eq!(valid.is_valid(), true);
    ///
    /// let invalid = MappingFile::new(
    ///     br#"
    /// # looks: like
    /// a => proguard:
    ///   mapping but(is) => not
    /// "#,
    /// );
    /// assert_eq!(invalid.is_valid(), false);
    /// ```
    pub fn is_valid(&self) -> bool {
        // In order to not parse the whole file, we look for a class followed by
        // a member in the first 50 lines, which is a good heuristic.
        let mut has_class_line = false;
        for (_, record) in self.iter().take(50) {
            match record {
                Ok(MappingRecord::Class { .. }) => {
                    has_class_line = true;
                }
                Ok(MappingRecord::Field { .. }) | Ok(MappingRecord::Method { .. })
                    if has_class_line =>
                {
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Returns a summary of the file.
    pub fn summary(&self) -> MappingSummary<'s> {
        MappingSummary::new(self)
    }

    /// Calculates the UUID of the mapping file.
    ///
    /// The UUID is generated from a file checksum, so two runs over the
    /// same mapping can share one [`MappingIndex`](crate::MappingIndex).
    #[cfg(feature = "uuid")]
    pub fn uuid(&self) -> Uuid {
        lazy_static::lazy_static! {
            static ref NAMESPACE: Uuid = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"guardsquare.com");
        }
        // this internally only operates on bytes, so this is safe to do
        Uuid::new_v5(&NAMESPACE, self.source)
    }

    /// Create an Iterator over [`MappingRecord`]s, paired with their 1-based
    /// line numbers.
    ///
    /// Blank lines are skipped.
    pub fn iter(&self) -> MappingRecordIter<'s> {
        MappingRecordIter {
            slice: self.source,
            line_number: 0,
        }
    }
}

/// An Iterator yielding [`MappingRecord`]s, created by [`MappingFile::iter`].
#[derive(Clone, Default)]
pub struct MappingRecordIter<'s> {
    slice: &'s [u8],
    line_number: usize,
}

impl fmt::Debug for MappingRecordIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRecordIter")
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl<'s> MappingRecordIter<'s> {
    /// Like [`Iterator::next`], but also yields the raw line the record was
    /// parsed from, without its line ending.
    pub(crate) fn next_line(
        &mut self,
    ) -> Option<(usize, &'s [u8], Result<MappingRecord<'s>, ParseError>)> {
        loop {
            if self.slice.is_empty() {
                return None;
            }

            let (line, rest) = split_line(self.slice);
            let line = strip_line_ending(line);
            self.slice = rest;
            self.line_number += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let result = MappingRecord::try_parse(line)
                .map_err(|kind| ParseError::new(self.line_number, line, kind));
            return Some((self.line_number, line, result));
        }
    }
}

impl<'s> Iterator for MappingRecordIter<'s> {
    type Item = (usize, Result<MappingRecord<'s>, ParseError>);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line()
            .map(|(line_number, _, result)| (line_number, result))
    }
}

impl std::iter::FusedIterator for MappingRecordIter<'_> {}

/// A proguard line mapping.
///
/// Maps start/end lines of a minified file to original start/end lines.
///
/// All line mappings are 1-based and inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct LineMapping {
    /// Start Line, 1-based.
    pub startline: usize,
    /// End Line, inclusive.
    pub endline: usize,
    /// The original Start Line.
    pub original_startline: Option<usize>,
    /// The original End Line.
    pub original_endline: Option<usize>,
}

/// A Proguard Mapping Record.
#[derive(Clone, Debug, PartialEq)]
pub enum MappingRecord<'s> {
    /// A Proguard Header or comment.
    Header {
        /// The Key of the Header.
        key: &'s str,
        /// Optional value if the Header is a KV pair.
        value: Option<&'s str>,
    },
    /// A Class Mapping.
    Class {
        /// Original name of the class.
        original: &'s str,
        /// Obfuscated name of the class.
        obfuscated: &'s str,
    },
    /// A Field Mapping.
    Field {
        /// Type of the field
        ty: &'s str,
        /// Original name of the field.
        original: &'s str,
        /// Obfuscated name of the field.
        obfuscated: &'s str,
    },
    /// A Method Mapping.
    Method {
        /// Return Type of the method.
        ty: &'s str,
        /// Original name of the method.
        original: &'s str,
        /// Obfuscated name of the method.
        obfuscated: &'s str,
        /// Arguments of the method as raw string.
        arguments: &'s str,
        /// Original class of a foreign inlined method.
        original_class: Option<&'s str>,
        /// Optional line mapping of the method.
        line_mapping: Option<LineMapping>,
    },
}

impl<'s> MappingRecord<'s> {
    /// Parses a single line from a proguard mapping file.
    ///
    /// Member lines may be indented by any run of spaces or tabs, and the
    /// trailing colon of class lines is optional.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_rewrite::MappingRecord;
    ///
    /// // Class Mappings
    /// let parsed = MappingRecord::try_parse(b"com.example.Mod -> a.a:");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(MappingRecord::Class {
    ///         original: "com.example.Mod",
    ///         obfuscated: "a.a"
    ///     })
    /// );
    ///
    /// // Field
    /// let parsed = MappingRecord::try_parse(b"    java.lang.String name -> b");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(MappingRecord::Field {
    ///         ty: "java.lang.String",
    ///         original: "name",
    ///         obfuscated: "b",
    ///     })
    /// );
    ///
    /// // Method without line mappings
    /// let parsed = MappingRecord::try_parse(b"\tvoid init(int,java.lang.String) -> a");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(MappingRecord::Method {
    ///         ty: "void",
    ///         original: "init",
    ///         obfuscated: "a",
    ///         arguments: "int,java.lang.String",
    ///         original_class: None,
    ///         line_mapping: None,
    ///     })
    /// );
    /// ```
    pub fn try_parse(line: &'s [u8]) -> Result<Self, ParseErrorKind> {
        let line = strip_line_ending(line);

        if line.starts_with(b"#") {
            parse_proguard_header(line)
        } else if line.starts_with(b" ") || line.starts_with(b"\t") {
            parse_proguard_field_or_method(line)
        } else {
            parse_proguard_class(line)
        }
    }
}

/// Parses a single Proguard Header from a Proguard File.
fn parse_proguard_header(bytes: &[u8]) -> Result<MappingRecord, ParseErrorKind> {
    let bytes = parse_prefix(bytes, b"#")?;

    let (key, bytes) = parse_until(bytes, |c| *c == b':')?;

    let value = match parse_prefix(bytes, b":") {
        Ok(bytes) => Some(parse_until(bytes, |_| false)?.0),
        Err(_) => None,
    };

    Ok(MappingRecord::Header {
        key: key.trim(),
        value: value.map(|v| v.trim()),
    })
}

/// Parses a single Proguard Field or Method from a Proguard File.
fn parse_proguard_field_or_method(bytes: &[u8]) -> Result<MappingRecord, ParseErrorKind> {
    // field line or method line:
    // `originalfieldtype originalfieldname -> obfuscatedfieldname`
    // `[startline:endline:]originalreturntype [originalclassname.]originalmethodname(originalargumenttype,...)[:originalstartline[:originalendline]] -> obfuscatedmethodname`
    let bytes = consume_indent(bytes);

    let (startline, bytes) = match parse_usize(bytes) {
        Ok((startline, bytes)) => (Some(startline), bytes),
        Err(_) => (None, bytes),
    };

    let (endline, bytes) = match startline {
        Some(_) => {
            let bytes = parse_prefix(bytes, b":")?;
            let (endline, bytes) = parse_usize(bytes)?;
            let bytes = parse_prefix(bytes, b":")?;
            (Some(endline), bytes)
        }
        None => (None, bytes),
    };

    let (ty, bytes) = parse_until(bytes, |c| *c == b' ')?;
    let bytes = parse_prefix(bytes, b" ")?;

    let (original, bytes) = parse_until(bytes, |c| *c == b' ' || *c == b'(')?;

    let (arguments, bytes) = match parse_prefix(bytes, b"(") {
        Ok(bytes) => {
            let (arguments, bytes) = parse_until(bytes, |c| *c == b')')?;
            let bytes = parse_prefix(bytes, b")")?;
            (Some(arguments), bytes)
        }
        Err(_) => (None, bytes),
    };

    let (original_startline, bytes) = match arguments {
        Some(_) => match parse_prefix(bytes, b":") {
            Ok(bytes) => {
                let (original_startline, bytes) = parse_usize(bytes)?;
                (Some(original_startline), bytes)
            }
            Err(_) => (None, bytes),
        },
        None => (None, bytes),
    };

    let (original_endline, bytes) = match original_startline {
        Some(_) => match parse_prefix(bytes, b":") {
            Ok(bytes) => {
                let (original_endline, bytes) = parse_usize(bytes)?;
                (Some(original_endline), bytes)
            }
            Err(_) => (None, bytes),
        },
        None => (None, bytes),
    };

    let bytes = parse_prefix(bytes, b" -> ")?;

    let (obfuscated, bytes) = parse_until(bytes, |c| *c == b' ')?;
    if ty.is_empty() || original.is_empty() || obfuscated.is_empty() || !is_blank(bytes) {
        return Err(INVALID_RECORD);
    }

    let record = match arguments {
        Some(arguments) => {
            let (original_class, original) = match original.rsplit_once('.') {
                Some((class, name)) => (Some(class), name),
                None => (None, original),
            };
            if original.is_empty() {
                return Err(INVALID_RECORD);
            }

            let line_mapping = match (startline, endline) {
                (Some(startline), Some(endline)) if startline > 0 && endline > 0 => {
                    Some(LineMapping {
                        startline,
                        endline,
                        original_startline,
                        original_endline,
                    })
                }
                _ => None,
            };

            MappingRecord::Method {
                ty,
                original,
                obfuscated,
                arguments,
                original_class,
                line_mapping,
            }
        }
        None => MappingRecord::Field {
            ty,
            original,
            obfuscated,
        },
    };

    Ok(record)
}

/// Parses a single Proguard Class from a Proguard File.
fn parse_proguard_class(bytes: &[u8]) -> Result<MappingRecord, ParseErrorKind> {
    // class line:
    // `originalclassname -> obfuscatedclassname[:]`
    let (original, bytes) = parse_until(bytes, |c| *c == b' ')?;

    let bytes = parse_prefix(bytes, b" -> ")?;

    let (obfuscated, bytes) = parse_until(bytes, |c| *c == b':' || *c == b' ')?;

    let bytes = parse_prefix(bytes, b":").unwrap_or(bytes);

    if original.is_empty() || obfuscated.is_empty() || !is_blank(bytes) {
        return Err(INVALID_RECORD);
    }

    Ok(MappingRecord::Class {
        original,
        obfuscated,
    })
}

fn parse_usize(bytes: &[u8]) -> Result<(usize, &[u8]), ParseErrorKind> {
    let (slice, rest) = match bytes.iter().position(|c| !c.is_ascii_digit()) {
        Some(pos) => bytes.split_at(pos),
        None => (bytes, &[] as &[u8]),
    };

    match str::from_utf8(slice)?.parse() {
        Ok(value) => Ok((value, rest)),
        Err(_) => Err(INVALID_RECORD),
    }
}

fn parse_prefix<'s>(bytes: &'s [u8], prefix: &[u8]) -> Result<&'s [u8], ParseErrorKind> {
    bytes.strip_prefix(prefix).ok_or(INVALID_RECORD)
}

fn parse_until<P>(bytes: &[u8], predicate: P) -> Result<(&str, &[u8]), ParseErrorKind>
where
    P: Fn(&u8) -> bool,
{
    let (slice, rest) = match bytes.iter().position(predicate) {
        Some(pos) => bytes.split_at(pos),
        None => (bytes, &[] as &[u8]),
    };

    Ok((str::from_utf8(slice)?, rest))
}

fn consume_indent(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|c| *c != b' ' && *c != b'\t') {
        Some(pos) => &bytes[pos..],
        None => b"",
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn strip_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

fn split_line(bytes: &[u8]) -> (&[u8], &[u8]) {
    let pos = match bytes.iter().position(|c| *c == b'\n') {
        Some(pos) => pos + 1,
        None => bytes.len(),
    };

    bytes.split_at(pos)
}
