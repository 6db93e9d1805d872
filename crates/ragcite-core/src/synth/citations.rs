//! Citation marker validation

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// A bracketed group of `S<n>` markers with an optional leading blank.
    ///
    /// Members are joined by `,` `;` `&` `and` or a range dash, and the group
    /// may end in a `: note` annotation, e.g. `[S1]`, `[S1; S3]`, `[S2-S4]`,
    /// `[S1 & S2]`, `[S3: France]`.
    static ref CITATION_GROUP_RE: Regex = Regex::new(
        r"(?i)([ \t]?)\[\s*S\d+(?:(?:\s*[,;&\-–]\s*|\s+and\s+)S\d+)*\s*(?::[^\[\]]*)?\]"
    )
    .unwrap();
    /// A single marker or a `S<a>-S<b>` range
    static ref MARKER_RE: Regex = Regex::new(r"(?i)S(\d+)(?:\s*[-–]\s*S(\d+))?").unwrap();
}

/// Answer text after invalid markers were removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedText {
    pub text: String,
    /// Valid 1-based source numbers in order of first appearance
    pub cited: Vec<usize>,
    /// Markers that referenced no source that was sent
    pub violations: Vec<String>,
}

/// Keep markers `S1..=S{source_count}` and strip the rest.
///
/// Every group is rewritten to the canonical `[S1, S3]` form: annotations are
/// dropped, a range whose ends are both valid expands to its members, and any
/// other range is checked end by end. A group left empty is removed together
/// with the blank before it.
pub fn ground_citations(text: &str, source_count: usize) -> GroundedText {
    let mut cited: Vec<usize> = Vec::new();
    let mut violations = Vec::new();
    let valid = |n: usize| (1..=source_count).contains(&n);

    let rewritten = CITATION_GROUP_RE.replace_all(text, |caps: &Captures| {
        let lead = caps.get(1).map_or("", |m| m.as_str());
        let group = caps.get(0).map_or("", |m| m.as_str());
        let members = group.split(':').next().unwrap_or(group);

        let mut kept: Vec<usize> = Vec::new();
        for m in MARKER_RE.captures_iter(members) {
            let start = (parse_marker(&m[1]), &m[1]);
            let numbers: Vec<(Option<usize>, &str)> = match m.get(2) {
                Some(end_digits) => {
                    let end = (parse_marker(end_digits.as_str()), end_digits.as_str());
                    match (start.0, end.0) {
                        (Some(s), Some(e)) if valid(s) && valid(e) && s <= e => {
                            (s..=e).map(|n| (Some(n), "")).collect()
                        }
                        _ => vec![start, end],
                    }
                }
                None => vec![start],
            };

            for (number, digits) in numbers {
                match number {
                    Some(n) if valid(n) => {
                        if !kept.contains(&n) {
                            kept.push(n);
                        }
                        if !cited.contains(&n) {
                            cited.push(n);
                        }
                    }
                    _ => violations.push(marker_label(number, digits)),
                }
            }
        }

        if kept.is_empty() {
            String::new()
        } else {
            let markers: Vec<String> = kept.iter().map(|n| super::source_marker(*n)).collect();
            format!("{}[{}]", lead, markers.join(", "))
        }
    });

    GroundedText {
        text: rewritten.into_owned(),
        cited,
        violations,
    }
}

fn parse_marker(digits: &str) -> Option<usize> {
    digits.parse().ok()
}

fn marker_label(number: Option<usize>, digits: &str) -> String {
    match number {
        Some(n) => format!("S{}", n),
        None => format!("S{}", digits),
    }
}
