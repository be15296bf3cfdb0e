//! Diagnostics returned to callers instead of errors.
//!
//! Every failure of a fetch (and of the resources built on top of it) is
//! reported as data: a list of [`Diagnostic`] values, each carrying a
//! severity, a machine-usable [`DiagnosticKind`], a short summary and a
//! human-readable detail. Warnings may accompany a successful result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Machine-usable classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// Malformed CA bundle or client key pair
    TlsConfigError,
    /// Malformed method, URL, header, body or retry bounds
    RequestBuildError,
    /// The configured per-attempt timeout was exceeded
    RequestTimeoutError,
    /// Any other transport or status failure after retries were exhausted
    RequestError,
    /// The calling context was cancelled
    RequestCancelledError,
    /// The body could not be read after a successful status line
    ResponseReadError,
    /// The body is not valid UTF-8
    ResponseEncodingWarning,
    /// Resource configuration rejected before doing any work
    InvalidConfiguration,
    /// The identifier generator failed
    IdGenerationError,
    /// Import is unsupported or the imported id is unusable
    ImportError,
}

impl DiagnosticKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::TlsConfigError => "TLSConfigError",
            DiagnosticKind::RequestBuildError => "RequestBuildError",
            DiagnosticKind::RequestTimeoutError => "RequestTimeoutError",
            DiagnosticKind::RequestError => "RequestError",
            DiagnosticKind::RequestCancelledError => "RequestCancelledError",
            DiagnosticKind::ResponseReadError => "ResponseReadError",
            DiagnosticKind::ResponseEncodingWarning => "ResponseEncodingWarning",
            DiagnosticKind::InvalidConfiguration => "InvalidConfiguration",
            DiagnosticKind::IdGenerationError => "IdGenerationError",
            DiagnosticKind::ImportError => "ImportError",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn error(
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn warning(
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}[{}]: {}: {}", self.kind, self.summary, self.detail)
    }
}

/// Ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn add_error(
        &mut self,
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.push(Diagnostic::error(kind, summary, detail));
    }

    pub fn add_warning(
        &mut self,
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.push(Diagnostic::warning(kind, summary, detail));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// First diagnostic of the given kind, if any.
    #[must_use]
    pub fn find(&self, kind: DiagnosticKind) -> Option<&Diagnostic> {
        self.0.iter().find(|d| d.kind == kind)
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_has_error_ignores_warnings() {
        let mut diags = Diagnostics::new();
        diags.add_warning(
            DiagnosticKind::ResponseEncodingWarning,
            "Response body is not recognized as UTF-8",
            "binary",
        );
        assert!(!diags.has_error());

        diags.add_error(DiagnosticKind::RequestError, "Error making request", "boom");
        assert!(diags.has_error());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(DiagnosticKind::TlsConfigError.to_string(), "TLSConfigError");
        assert_eq!(
            DiagnosticKind::RequestTimeoutError.as_str(),
            "RequestTimeoutError"
        );
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let diags: Diagnostics =
            Diagnostic::error(DiagnosticKind::ImportError, "Not Implemented.", "Not implemented.")
                .into();
        let json = serde_json::to_value(&diags).unwrap();
        assert_eq!(json[0]["severity"], "error");
        assert_eq!(json[0]["kind"], "ImportError");
    }
}
