#![forbid(unsafe_code)]

//! Checker diagnostics.
//!
//! Every stage reports through [`Diagnostic`]: a kind from the fixed
//! taxonomy, a primary span, a one-line message and optional related
//! locations (the earlier move, the conflicting borrow, ...). Diagnostics
//! render through miette in the CLI and serialize to JSON for the cache
//! and `--format json`.

use std::fmt;

use blossom_ast::Span;
use miette::{LabeledSpan, Severity};
use serde::{Deserialize, Serialize};

/// The analysis that produced a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Catalog,
    Patterns,
    Ownership,
    Driver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    UnresolvedConstraint,
    AmbiguousConstraint,
    DuplicateDeclaration,
    UnresolvedName,
    NonExhaustiveMatch,
    UnreachablePattern,
    MalformedPattern,
    UseAfterMove,
    ConflictingBorrow,
    MoveOfBorrowed,
    BorrowOutlivesOwner,
    RegionCycle,
    ResourceExhausted,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 13] = [
        DiagnosticKind::UnresolvedConstraint,
        DiagnosticKind::AmbiguousConstraint,
        DiagnosticKind::DuplicateDeclaration,
        DiagnosticKind::UnresolvedName,
        DiagnosticKind::NonExhaustiveMatch,
        DiagnosticKind::UnreachablePattern,
        DiagnosticKind::MalformedPattern,
        DiagnosticKind::UseAfterMove,
        DiagnosticKind::ConflictingBorrow,
        DiagnosticKind::MoveOfBorrowed,
        DiagnosticKind::BorrowOutlivesOwner,
        DiagnosticKind::RegionCycle,
        DiagnosticKind::ResourceExhausted,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::UnresolvedConstraint => "UnresolvedConstraint",
            DiagnosticKind::AmbiguousConstraint => "AmbiguousConstraint",
            DiagnosticKind::DuplicateDeclaration => "DuplicateDeclaration",
            DiagnosticKind::UnresolvedName => "UnresolvedName",
            DiagnosticKind::NonExhaustiveMatch => "NonExhaustiveMatch",
            DiagnosticKind::UnreachablePattern => "UnreachablePattern",
            DiagnosticKind::MalformedPattern => "MalformedPattern",
            DiagnosticKind::UseAfterMove => "UseAfterMove",
            DiagnosticKind::ConflictingBorrow => "ConflictingBorrow",
            DiagnosticKind::MoveOfBorrowed => "MoveOfBorrowed",
            DiagnosticKind::BorrowOutlivesOwner => "BorrowOutlivesOwner",
            DiagnosticKind::RegionCycle => "RegionCycle",
            DiagnosticKind::ResourceExhausted => "ResourceExhausted",
        }
    }

    /// Case-insensitive lookup by name; `use_after_move` works too.
    pub fn parse(name: &str) -> Option<DiagnosticKind> {
        let wanted: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name().to_ascii_lowercase() == wanted)
    }

    pub fn stage(self) -> Stage {
        match self {
            DiagnosticKind::UnresolvedConstraint
            | DiagnosticKind::AmbiguousConstraint
            | DiagnosticKind::DuplicateDeclaration
            | DiagnosticKind::UnresolvedName => Stage::Catalog,
            DiagnosticKind::NonExhaustiveMatch
            | DiagnosticKind::UnreachablePattern
            | DiagnosticKind::MalformedPattern => Stage::Patterns,
            DiagnosticKind::UseAfterMove
            | DiagnosticKind::ConflictingBorrow
            | DiagnosticKind::MoveOfBorrowed
            | DiagnosticKind::BorrowOutlivesOwner
            | DiagnosticKind::RegionCycle => Stage::Ownership,
            DiagnosticKind::ResourceExhausted => Stage::Driver,
        }
    }

    /// miette error code, e.g. `blossom::use_after_move`.
    pub fn code(self) -> String {
        let mut snake = String::new();
        for (i, c) in self.name().chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    snake.push('_');
                }
                snake.push(c.to_ascii_lowercase());
            } else {
                snake.push(c);
            }
        }
        format!("blossom::{snake}")
    }

    /// Long-form explanation shown by `blossom explain`.
    pub fn explain(self) -> &'static str {
        match self {
            DiagnosticKind::UnresolvedConstraint => {
                "A type argument was supplied for a generic parameter, but no impl \
                 of one of the parameter's contracts applies to that type. Add an impl \
                 for the type, or pick a type that already has one."
            }
            DiagnosticKind::AmbiguousConstraint => {
                "More than one impl of the contract applies to the type and none of \
                 them has a strictly higher priority than every other. Give one impl a \
                 priority, or remove the overlap."
            }
            DiagnosticKind::DuplicateDeclaration => {
                "Two declarations in the same namespace share a name: types, contracts \
                 and functions each need unique names, and constructors must be unique \
                 within their variant."
            }
            DiagnosticKind::UnresolvedName => {
                "A type, constructor, field, function or local does not exist, or a \
                 generic type was applied to the wrong number of arguments."
            }
            DiagnosticKind::NonExhaustiveMatch => {
                "Some values of the scrutinee's type are matched by no arm. The message \
                 lists example patterns that are not covered; add arms for them or a \
                 trailing wildcard."
            }
            DiagnosticKind::UnreachablePattern => {
                "Every value this arm (or or-alternative) could match is already matched \
                 by an earlier arm, so it can never run. Remove it or reorder the arms."
            }
            DiagnosticKind::MalformedPattern => {
                "The pattern's shape does not fit the scrutinee's type: a constructor \
                 from another type, a wrong number of sub-patterns, or a literal of the \
                 wrong type."
            }
            DiagnosticKind::UseAfterMove => {
                "A place is read, borrowed or moved after its value was moved out (or \
                 before it was ever initialised) on at least one path reaching this point."
            }
            DiagnosticKind::ConflictingBorrow => {
                "A unique borrow overlaps another live borrow of the same place, or a \
                 place is read or written while uniquely borrowed, or written while \
                 borrowed at all."
            }
            DiagnosticKind::MoveOfBorrowed => {
                "A value is moved out while a borrow of it (or of part of it) is still \
                 live. End the borrow's scope before the move."
            }
            DiagnosticKind::BorrowOutlivesOwner => {
                "A borrow must stay valid for longer than the data it points to lives: \
                 it is stored in a longer-lived reference, returned from the function, \
                 or the owner's storage ends while it is still borrowed."
            }
            DiagnosticKind::RegionCycle => {
                "The declared outlives relations between region parameters form a cycle \
                 through distinct regions."
            }
            DiagnosticKind::ResourceExhausted => {
                "An analysis ran past its configured budget (specialization steps or \
                 instantiation depth). Simplify the construct or raise the limit in \
                 blossom.toml."
            }
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A secondary location attached to a diagnostic (move site, prior borrow, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Related {
    pub span: Span,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Related>,
    /// The place involved, for ownership diagnostics (`opt.0`, `*r`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    /// Uncovered patterns, for non-exhaustive matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witnesses: Vec<String>,
    /// Enclosing function, when the diagnostic comes from a body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            span,
            message: message.into(),
            related: Vec::new(),
            place: None,
            witnesses: Vec::new(),
            function: None,
        }
    }

    pub fn with_related(mut self, span: Span, message: impl Into<String>) -> Self {
        self.related.push(Related {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    pub fn with_witnesses(mut self, witnesses: Vec<String>) -> Self {
        self.witnesses = witnesses;
        self
    }

    pub fn in_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Total order used for deterministic reports.
    pub fn sort_key(&self) -> (Span, DiagnosticKind, &str) {
        (self.span, self.kind, self.message.as_str())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Diagnostic {}

impl miette::Diagnostic for Diagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if self.witnesses.is_empty() {
            return None;
        }
        Some(Box::new(format!(
            "patterns not covered: {}",
            self.witnesses.join(", ")
        )))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = LabeledSpan::new_with_span(Some(self.kind.name().to_string()), self.span);
        let related = self
            .related
            .iter()
            .map(|r| LabeledSpan::new_with_span(Some(r.message.clone()), r.span));
        Some(Box::new(std::iter::once(primary).chain(related)))
    }
}

/// Sort by (span, kind, message) and drop exact duplicates.
pub fn sort_diagnostics(diags: &mut Vec<Diagnostic>) {
    diags.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    diags.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_ast::span;

    #[test]
    fn kinds_parse_from_either_case() {
        assert_eq!(
            DiagnosticKind::parse("use_after_move"),
            Some(DiagnosticKind::UseAfterMove)
        );
        assert_eq!(
            DiagnosticKind::parse("NonExhaustiveMatch"),
            Some(DiagnosticKind::NonExhaustiveMatch)
        );
        assert_eq!(DiagnosticKind::parse("nope"), None);
    }

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(
            DiagnosticKind::BorrowOutlivesOwner.code(),
            "blossom::borrow_outlives_owner"
        );
    }

    #[test]
    fn sorting_orders_by_span_then_kind() {
        let mut diags = vec![
            Diagnostic::new(DiagnosticKind::UseAfterMove, span(9, 1), "b"),
            Diagnostic::new(DiagnosticKind::ConflictingBorrow, span(2, 1), "a"),
            Diagnostic::new(DiagnosticKind::UseAfterMove, span(2, 1), "a"),
            Diagnostic::new(DiagnosticKind::UseAfterMove, span(2, 1), "a"),
        ];
        sort_diagnostics(&mut diags);
        let kinds: Vec<_> = diags.iter().map(|d| (d.span.offset, d.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (2, DiagnosticKind::UseAfterMove),
                (2, DiagnosticKind::ConflictingBorrow),
                (9, DiagnosticKind::UseAfterMove),
            ]
        );
    }

    #[test]
    fn json_omits_empty_optionals() {
        let d = Diagnostic::new(DiagnosticKind::RegionCycle, span(0, 2), "cycle");
        let json = serde_json::to_string(&d).expect("serialize");
        assert!(!json.contains("witnesses"));
        let back: Diagnostic = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, d);
    }
}
