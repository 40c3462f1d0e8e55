//! A queryable view over a parsed mapping file.
//!
//! The [`MappingIndex`] keeps every class in the order it was encountered
//! and answers lookups by original class name and by original package.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::mapping::{MappingFile, MappingRecord, ParseError, ParseErrorKind};

/// Anything that carries an original and an obfuscated name.
pub trait Renameable {
    /// The original name.
    fn from(&self) -> &str;
    /// The obfuscated name.
    fn to(&self) -> &str;
}

/// A renamed method of a [`ClassMapping`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodMapping<'s> {
    from: &'s str,
    to: &'s str,
    return_type: &'s str,
    arguments: &'s str,
    line: usize,
}

impl<'s> MethodMapping<'s> {
    /// The original return type.
    pub fn return_type(&self) -> &'s str {
        self.return_type
    }

    /// The original arguments as raw, comma separated, string.
    pub fn arguments(&self) -> &'s str {
        self.arguments
    }

    /// The line of the mapping file this method was read from.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl Renameable for MethodMapping<'_> {
    fn from(&self) -> &str {
        self.from
    }

    fn to(&self) -> &str {
        self.to
    }
}

impl fmt::Display for MethodMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", self.return_type, self.from, self.arguments)
    }
}

/// A renamed field of a [`ClassMapping`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMapping<'s> {
    from: &'s str,
    to: &'s str,
    ty: &'s str,
    line: usize,
}

impl<'s> FieldMapping<'s> {
    /// The original type of the field.
    pub fn ty(&self) -> &'s str {
        self.ty
    }

    /// The line of the mapping file this field was read from.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl Renameable for FieldMapping<'_> {
    fn from(&self) -> &str {
        self.from
    }

    fn to(&self) -> &str {
        self.to
    }
}

impl fmt::Display for FieldMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.from)
    }
}

/// Either a method or a field of a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberMapping<'a, 's> {
    /// A method.
    Method(&'a MethodMapping<'s>),
    /// A field.
    Field(&'a FieldMapping<'s>),
}

impl MemberMapping<'_, '_> {
    /// The line of the mapping file this member was read from.
    pub fn line(&self) -> usize {
        match self {
            MemberMapping::Method(method) => method.line,
            MemberMapping::Field(field) => field.line,
        }
    }
}

impl Renameable for MemberMapping<'_, '_> {
    fn from(&self) -> &str {
        match self {
            MemberMapping::Method(method) => method.from,
            MemberMapping::Field(field) => field.from,
        }
    }

    fn to(&self) -> &str {
        match self {
            MemberMapping::Method(method) => method.to,
            MemberMapping::Field(field) => field.to,
        }
    }
}

impl fmt::Display for MemberMapping<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberMapping::Method(method) => method.fmt(f),
            MemberMapping::Field(field) => field.fmt(f),
        }
    }
}

/// A renamed class together with its renamed members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMapping<'s> {
    from: &'s str,
    to: &'s str,
    methods: Vec<MethodMapping<'s>>,
    fields: Vec<FieldMapping<'s>>,
}

impl<'s> ClassMapping<'s> {
    fn new(from: &'s str, to: &'s str) -> Self {
        Self {
            from,
            to,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// The methods of this class, in mapping order.
    pub fn methods(&self) -> std::slice::Iter<'_, MethodMapping<'s>> {
        self.methods.iter()
    }

    /// The fields of this class, in mapping order.
    pub fn fields(&self) -> std::slice::Iter<'_, FieldMapping<'s>> {
        self.fields.iter()
    }

    /// All methods and fields of this class, in mapping order.
    pub fn members(&self) -> impl Iterator<Item = MemberMapping<'_, 's>> + '_ {
        let mut methods = self.methods.iter().peekable();
        let mut fields = self.fields.iter().peekable();
        std::iter::from_fn(move || {
            let field_first = match (methods.peek(), fields.peek()) {
                (Some(method), Some(field)) => field.line < method.line,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if field_first {
                fields.next().map(MemberMapping::Field)
            } else {
                methods.next().map(MemberMapping::Method)
            }
        })
    }

    /// The original package of this class, empty for the default package.
    pub fn package(&self) -> &'s str {
        self.from.rsplit_once('.').map_or("", |(package, _)| package)
    }
}

impl Renameable for ClassMapping<'_> {
    fn from(&self) -> &str {
        self.from
    }

    fn to(&self) -> &str {
        self.to
    }
}

/// A parsed and indexed Proguard mapping.
///
/// The index borrows from the mapping source and never changes after
/// construction, so it can be shared freely between rewrites.
///
/// # Examples
///
/// ```
/// use proguard_rewrite::{MappingFile, MappingIndex, Renameable};
///
/// let mapping = b"\
/// com.example.Mod -> a.a:
///     void init() -> a
/// com.example.mixin.TitleMixin -> a.b:
/// ";
/// let index = MappingIndex::parse(MappingFile::new(mapping)).unwrap();
///
/// assert_eq!(index.find_class("com.example.Mod").unwrap().to(), "a.a");
/// assert_eq!(index.find_package("com.example.mixin"), Some("a"));
/// assert_eq!(index.find_classes_in_package("com.example").count(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MappingIndex<'s> {
    classes: Vec<ClassMapping<'s>>,
    by_name: HashMap<&'s str, usize>,
    // package prefix -> indices into `classes`, in mapping order
    by_package: HashMap<&'s str, Vec<usize>>,
}

impl<'s> MappingIndex<'s> {
    /// Parses a complete mapping file into an index.
    ///
    /// Header lines are skipped. Any line that is not a valid record, a
    /// member line before the first class line, and a class line repeating
    /// an earlier original class name all fail the whole parse.
    pub fn parse(mapping: MappingFile<'s>) -> Result<Self, ParseError> {
        let mut slf = Self::default();
        let mut current_class: Option<ClassMapping<'s>> = None;
        let mut unique_methods: HashSet<(&str, &str, &str)> = HashSet::new();

        let mut records = mapping.iter();
        while let Some((line_number, line, record)) = records.next_line() {
            match record? {
                MappingRecord::Header { .. } => {}
                MappingRecord::Class {
                    original,
                    obfuscated,
                } => {
                    // Flush the previous class if there is one.
                    if let Some(class) = current_class.take() {
                        slf.insert(class);
                    }

                    if slf.by_name.contains_key(original) {
                        return Err(ParseError::new(
                            line_number,
                            line,
                            ParseErrorKind::DuplicateClass(original.to_owned()),
                        ));
                    }

                    current_class = Some(ClassMapping::new(original, obfuscated));
                    unique_methods.clear();
                }
                MappingRecord::Field {
                    ty,
                    original,
                    obfuscated,
                } => {
                    let Some(class) = current_class.as_mut() else {
                        return Err(member_outside_class(line_number, line));
                    };
                    class.fields.push(FieldMapping {
                        from: original,
                        to: obfuscated,
                        ty,
                        line: line_number,
                    });
                }
                MappingRecord::Method {
                    ty,
                    original,
                    obfuscated,
                    arguments,
                    original_class,
                    ..
                } => {
                    let Some(class) = current_class.as_mut() else {
                        return Err(member_outside_class(line_number, line));
                    };

                    // Code inlined from a foreign class is not a rename of
                    // anything in this class.
                    if original_class.is_some_and(|c| c != class.from) {
                        continue;
                    }

                    // Methods split into several line ranges repeat the same
                    // rename once per range.
                    if unique_methods.insert((original, arguments, obfuscated)) {
                        class.methods.push(MethodMapping {
                            from: original,
                            to: obfuscated,
                            return_type: ty,
                            arguments,
                            line: line_number,
                        });
                    }
                }
            }
        }

        // Flush the last class
        if let Some(class) = current_class {
            slf.insert(class);
        }

        Ok(slf)
    }

    fn insert(&mut self, class: ClassMapping<'s>) {
        let idx = self.classes.len();
        self.by_name.insert(class.from, idx);

        let mut package = class.from;
        while let Some((parent, _)) = package.rsplit_once('.') {
            self.by_package.entry(parent).or_default().push(idx);
            package = parent;
        }

        self.classes.push(class);
    }

    /// All classes, in mapping order.
    pub fn classes(&self) -> std::slice::Iter<'_, ClassMapping<'s>> {
        self.classes.iter()
    }

    /// The number of classes in this index.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether this index contains no classes at all.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Looks up a class by its original name.
    pub fn find_class(&self, from: &str) -> Option<&ClassMapping<'s>> {
        self.by_name.get(from).map(|&idx| &self.classes[idx])
    }

    /// All classes whose original name starts with `package` followed by a
    /// `.`, in mapping order.
    ///
    /// This includes classes of sub-packages.
    pub fn find_classes_in_package<'a>(
        &'a self,
        package: &str,
    ) -> impl Iterator<Item = &'a ClassMapping<'s>> + 'a {
        self.by_package
            .get(package)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .map(|&idx| &self.classes[idx])
    }

    /// The obfuscated name of the original package `package`.
    ///
    /// The package is derived from the first class (in mapping order) living
    /// under `package`: its obfuscated name with as many trailing segments
    /// removed as its original name has below `package`. Later classes that
    /// disagree are ignored.
    ///
    /// Returns `None` if no class lives under `package`.
    pub fn find_package(&self, package: &str) -> Option<&'s str> {
        let mut classes = self.find_classes_in_package(package);
        let first = classes.next()?;
        let renamed = renamed_package(first, package)?;

        for class in classes {
            let other = renamed_package(class, package);
            if other != Some(renamed) {
                log::debug!(
                    "package {package} maps to {renamed} for {}, but to {} for {}",
                    first.from,
                    other.unwrap_or("<none>"),
                    class.from,
                );
                break;
            }
        }

        Some(renamed)
    }
}

fn renamed_package<'s>(class: &ClassMapping<'s>, package: &str) -> Option<&'s str> {
    let local = class.from.strip_prefix(package)?.strip_prefix('.')?;
    let depth = local.split('.').count();

    let mut renamed = class.to;
    for _ in 0..depth {
        renamed = renamed.rsplit_once('.')?.0;
    }
    (!renamed.is_empty()).then_some(renamed)
}

fn member_outside_class(line_number: usize, line: &[u8]) -> ParseError {
    ParseError::new(line_number, line, ParseErrorKind::MemberOutsideClass)
}
