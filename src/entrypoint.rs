//! Resolution of entrypoint references against a [`MappingIndex`].

use std::fmt;

use crate::index::{ClassMapping, MappingIndex, MemberMapping, Renameable};

/// A reference to a class or a class member, as written in a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntrypointRef<'r> {
    /// `com.example.Mod`
    Class {
        /// The original class name.
        class: &'r str,
    },
    /// `com.example.Mod::init`
    Member {
        /// The original class name.
        class: &'r str,
        /// The original member name.
        member: &'r str,
    },
}

impl<'r> EntrypointRef<'r> {
    /// Parses a reference, splitting on the last `::`.
    ///
    /// Returns `None` if the class or the member name would be empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_rewrite::EntrypointRef;
    ///
    /// assert_eq!(
    ///     EntrypointRef::parse("com.example.Mod::init"),
    ///     Some(EntrypointRef::Member {
    ///         class: "com.example.Mod",
    ///         member: "init"
    ///     })
    /// );
    /// assert_eq!(
    ///     EntrypointRef::parse("com.example.Mod"),
    ///     Some(EntrypointRef::Class {
    ///         class: "com.example.Mod"
    ///     })
    /// );
    /// assert_eq!(EntrypointRef::parse("com.example.Mod::"), None);
    /// ```
    pub fn parse(reference: &'r str) -> Option<Self> {
        match reference.rsplit_once("::") {
            Some((class, member)) if !class.is_empty() && !member.is_empty() => {
                Some(Self::Member { class, member })
            }
            Some(_) => None,
            None if reference.is_empty() => None,
            None => Some(Self::Class { class: reference }),
        }
    }

    /// The referenced class.
    pub fn class(&self) -> &'r str {
        match *self {
            Self::Class { class } | Self::Member { class, .. } => class,
        }
    }

    /// Resolves this reference against `index`.
    ///
    /// Every matching class or member is returned, in mapping order. An
    /// empty result means the reference is unaffected by obfuscation.
    pub fn resolve<'a, 's>(&self, index: &'a MappingIndex<'s>) -> Vec<ResolutionCandidate<'a, 's>> {
        match *self {
            Self::Class { class } => index
                .classes()
                .filter(|c| c.from() == class)
                .map(ResolutionCandidate::Class)
                .collect(),
            Self::Member { class, member } => index
                .classes()
                .filter(|c| c.from() == class)
                .flat_map(move |c| {
                    c.members()
                        .filter(move |m| m.from() == member)
                        .map(move |m| ResolutionCandidate::Member(c, m))
                })
                .collect(),
        }
    }
}

impl fmt::Display for EntrypointRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { class } => f.write_str(class),
            Self::Member { class, member } => write!(f, "{class}::{member}"),
        }
    }
}

/// A single match of an [`EntrypointRef`] in a [`MappingIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionCandidate<'a, 's> {
    /// The reference names this class.
    Class(&'a ClassMapping<'s>),
    /// The reference names this member of the class.
    Member(&'a ClassMapping<'s>, MemberMapping<'a, 's>),
}

impl ResolutionCandidate<'_, '_> {
    /// The reference as written before obfuscation.
    pub fn original(&self) -> String {
        match self {
            Self::Class(class) => class.from().to_owned(),
            Self::Member(class, member) => format!("{}::{}", class.from(), member.from()),
        }
    }

    /// The reference as it has to be written after obfuscation.
    pub fn obfuscated(&self) -> String {
        match self {
            Self::Class(class) => class.to().to_owned(),
            Self::Member(class, member) => format!("{}::{}", class.to(), member.to()),
        }
    }
}

impl fmt::Display for ResolutionCandidate<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => write!(f, "{} -> {}", class.from(), class.to()),
            Self::Member(class, member) => {
                write!(f, "{} {} -> {}", class.from(), member, member.to())
            }
        }
    }
}

/// Picks the rename target out of the candidates of one reference.
///
/// The first candidate in mapping order wins. More than one member
/// candidate is reported as a warning naming the winner.
pub fn pick<'c, 'a, 's>(
    reference: &EntrypointRef<'_>,
    candidates: &'c [ResolutionCandidate<'a, 's>],
) -> Option<&'c ResolutionCandidate<'a, 's>> {
    let members = candidates
        .iter()
        .filter(|c| matches!(c, ResolutionCandidate::Member(..)))
        .count();
    if members > 1 {
        log::warn!(
            "found {members} entrypoint candidates for '{reference}', using {}",
            candidates[0]
        );
    }
    candidates.first()
}
