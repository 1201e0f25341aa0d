//! Diagnostics collected while validating a registry or importing a snapshot.
//!
//! Hard invariants are enforced by the registry and surface as
//! [`crate::GridError`]. Diagnostics capture the softer findings that do not
//! block a mutation: a cable system without subsections, a run that is not
//! jointed end to end, a recorded length that disagrees with the drawn
//! geometry.
//!
//! # Example
//!
//! ```
//! use mvgrid_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_entity("topology", "cable system has no subsections", "cable system 4");
//! diag.add_error("import", "row 12 rejected");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert!(diag.has_errors());
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious data that the model accepts
    Warning,
    /// Data that could not be taken into the model
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A single finding.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key ("topology", "geometry", "reliability", "import")
    pub category: String,
    pub message: String,
    /// Entity the finding is about, e.g. "subsection 14"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {}",
            self.severity.as_str(),
            self.category,
            self.message
        )?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of findings for one validation or import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// One-line summary for CLI output.
    pub fn summary(&self) -> String {
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "no issues".to_string(),
            (w, 0) => format!("{} warning(s)", w),
            (0, e) => format!("{} error(s)", e),
            (w, e) => format!("{} warning(s), {} error(s)", w, e),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_summary() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "no issues");
        diag.add_warning("topology", "gap");
        diag.add_warning("geometry", "length drift");
        assert_eq!(diag.summary(), "2 warning(s)");
        diag.add_error("import", "bad row");
        assert_eq!(diag.summary(), "2 warning(s), 1 error(s)");
        assert_eq!(diag.issues_by_category("topology").count(), 1);
    }

    #[test]
    fn test_issue_display() {
        let issue = DiagnosticIssue::new(Severity::Warning, "topology", "not contiguous")
            .with_entity("cable system 2");
        assert_eq!(
            issue.to_string(),
            "[warning:topology] not contiguous (cable system 2)"
        );
    }

    #[test]
    fn test_serialization_skips_empty() {
        let diag = Diagnostics::new();
        assert_eq!(serde_json::to_string(&diag).unwrap(), "{}");
    }

    #[test]
    fn test_merge() {
        let mut a = Diagnostics::new();
        a.add_warning("x", "one");
        let mut b = Diagnostics::new();
        b.add_error_with_entity("y", "two", "subsection 1");
        a.merge(b);
        assert_eq!(a.issues.len(), 2);
        assert!(a.has_errors());
    }
}
