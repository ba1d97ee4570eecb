//! Failure classification.
//!
//! Turns raw test or log output into a [`Diagnosis`]. Signatures are checked
//! in a fixed precedence order, so text carrying both a zero-division and an
//! assertion signature is always classified as `ZeroDivision`.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Diagnosis, FailureKind};

/// First `path:line` occurrence in the output.
static FILE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<file>[\w./-]+):(?P<line>\d+)").unwrap());

/// A signature is a set of substrings that must all be present.
struct Signature {
    kind: FailureKind,
    needles: &'static [&'static str],
    message: &'static str,
}

/// Evaluated top to bottom; first match wins.
const SIGNATURES: &[Signature] = &[
    Signature {
        kind: FailureKind::ZeroDivision,
        needles: &["ZeroDivisionError"],
        message: "Detected division by zero from test output.",
    },
    Signature {
        kind: FailureKind::NoneTypeError,
        needles: &["TypeError", "NoneType"],
        message: "Detected NoneType arithmetic TypeError from test output.",
    },
    Signature {
        kind: FailureKind::AssertionFailure,
        needles: &["AssertionError"],
        message: "Detected assertion failure from test output.",
    },
];

const UNKNOWN_MESSAGE: &str = "Could not classify test failure output.";

/// Classify failure output. Never fails; unmatched text yields `Unknown`.
#[must_use]
pub fn classify(output: &str) -> Diagnosis {
    let (file, line) = extract_file_line(output);

    let (kind, message) = SIGNATURES
        .iter()
        .find(|sig| sig.needles.iter().all(|needle| output.contains(needle)))
        .map_or((FailureKind::Unknown, UNKNOWN_MESSAGE), |sig| {
            (sig.kind, sig.message)
        });

    Diagnosis {
        kind,
        file,
        line,
        message: Some(message.to_string()),
    }
}

fn extract_file_line(output: &str) -> (Option<String>, Option<u32>) {
    let Some(caps) = FILE_LINE.captures(output) else {
        return (None, None);
    };
    let file = caps.name("file").map(|m| m.as_str().to_string());
    // Line numbers are 1-based; zero or overflow means "no usable line".
    let line = caps
        .name("line")
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|line| *line > 0);
    (file, line)
}
