#![forbid(unsafe_code)]

use std::fmt::Write as _;

use blossom_ast::Span;
use blossom_core::{CheckReport, Diagnostic};
use serde::Serialize;

pub const SCHEMA: &str = "blossom.check/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<Span> for SpanRange {
    fn from(s: Span) -> Self {
        Self {
            offset: s.offset,
            len: s.len,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub schema: &'static str,
    pub unit: String,
    pub ok: bool,
    pub functions_checked: usize,
    pub cache_hits: usize,
    pub skipped: usize,
    pub by_kind: Vec<CountBy>,
    pub diagnostics: Vec<JsonDiagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountBy {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonDiagnostic {
    pub kind: &'static str,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub span: SpanRange,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<JsonRelated>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub witnesses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRelated {
    pub span: SpanRange,
    pub message: String,
}

impl From<&Diagnostic> for JsonDiagnostic {
    fn from(d: &Diagnostic) -> Self {
        JsonDiagnostic {
            kind: d.kind.name(),
            code: d.kind.code(),
            function: d.function.clone(),
            span: d.span.into(),
            message: d.message.clone(),
            related: d
                .related
                .iter()
                .map(|r| JsonRelated {
                    span: r.span.into(),
                    message: r.message.clone(),
                })
                .collect(),
            place: d.place.clone(),
            witnesses: d.witnesses.clone(),
        }
    }
}

pub fn json_report(report: &CheckReport) -> JsonReport {
    JsonReport {
        schema: SCHEMA,
        unit: report.unit.clone(),
        ok: !report.has_errors(),
        functions_checked: report.functions_checked,
        cache_hits: report.cache_hits,
        skipped: report.skipped,
        by_kind: report
            .count_by_kind()
            .into_iter()
            .map(|(kind, count)| CountBy {
                key: kind.name().to_string(),
                count,
            })
            .collect(),
        diagnostics: report.diagnostics.iter().map(JsonDiagnostic::from).collect(),
    }
}

/// Plain-text rendering, one block per diagnostic.
///
/// Units arrive as JSON without source text, so locations are byte ranges.
pub fn render_text(report: &CheckReport) -> String {
    let mut out = String::new();
    for d in &report.diagnostics {
        let _ = writeln!(out, "error[{}]: {}", d.kind.code(), d.message);
        match &d.function {
            Some(f) => {
                let _ = writeln!(out, "  --> {f} @ {}", d.span);
            }
            None => {
                let _ = writeln!(out, "  --> {} @ {}", report.unit, d.span);
            }
        }
        for r in &d.related {
            let _ = writeln!(out, "   = note: {} @ {}", r.message, r.span);
        }
        if !d.witnesses.is_empty() {
            let _ = writeln!(out, "   = help: patterns not covered: {}", d.witnesses.join(", "));
        }
    }
    let _ = writeln!(
        out,
        "{}: {} function(s) checked, {} from cache, {} skipped, {} error(s)",
        report.unit,
        report.functions_checked,
        report.cache_hits,
        report.skipped,
        report.diagnostics.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_ast::span;
    use blossom_core::DiagnosticKind;

    fn sample() -> CheckReport {
        CheckReport {
            unit: "u".into(),
            diagnostics: vec![
                Diagnostic::new(DiagnosticKind::NonExhaustiveMatch, span(4, 2), "not exhaustive")
                    .with_witnesses(vec!["Triangle(_, _, _)".into()])
                    .in_function("area"),
            ],
            functions_checked: 1,
            ..CheckReport::default()
        }
    }

    #[test]
    fn json_lists_kinds_and_witnesses() {
        let json = serde_json::to_value(json_report(&sample())).expect("json");
        assert_eq!(json["schema"], SCHEMA);
        assert_eq!(json["ok"], false);
        assert_eq!(json["by_kind"][0]["key"], "NonExhaustiveMatch");
        assert_eq!(json["diagnostics"][0]["code"], "blossom::non_exhaustive_match");
        let d = &json["diagnostics"][0];
        assert_eq!(d["span"]["offset"], 4);
        assert_eq!(d["function"], "area");
        assert_eq!(d["witnesses"][0], "Triangle(_, _, _)");
        assert!(d.get("related").is_none());
    }

    #[test]
    fn text_carries_location_and_help() {
        let text = render_text(&sample());
        assert!(text.contains("--> area @"), "{text}");
        assert!(text.contains("patterns not covered: Triangle(_, _, _)"), "{text}");
        assert!(text.ends_with("1 error(s)\n"), "{text}");
    }
}
