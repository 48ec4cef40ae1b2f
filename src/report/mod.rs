//! Structured assembly reports and the collaborators that produce them.
//!
//! Extraction (source document -> structured mapping) and rendering
//! (mapping -> finished report) are external tools. The engine only needs the
//! contracts below; `command` wraps shell commands that implement them.

mod command;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_yaml::{Mapping, Value};

use crate::error::{EarbotError, Result};

pub use command::{CommandExtractor, CommandRenderer, CommandTemplate};

/// Sections every extracted report must carry
pub const REQUIRED_SECTIONS: [&str; 3] = ["Species", "ToLID", "Tags"];

/// Optional sections a renderer expects; absent ones get a placeholder
pub const OPTIONAL_SECTIONS: [&str; 5] = ["Class", "Order", "Genome Traits", "Curator notes", "Metrics"];

/// Placeholder for sections the source document did not provide
pub const PLACEHOLDER: &str = "Not available";

/// Directory, next to each submitted artifact, that regenerated reports go to
pub const RENDERED_DIR: &str = "rendered";

/// Where the regenerated report for `source` is written. Never `source` itself.
pub fn report_path(source: &Path) -> PathBuf {
    let name = source.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "report.pdf".into());
    source.parent().unwrap_or(Path::new("")).join(RENDERED_DIR).join(name)
}

/// Structured data extracted from an assembly report
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredReport {
    data: Mapping,
}

impl StructuredReport {
    /// Parse YAML and check the required sections are present and non-empty
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        let Value::Mapping(data) = value else {
            return Err(EarbotError::Document("report is not a mapping".to_string()));
        };

        let missing: Vec<&str> = REQUIRED_SECTIONS
            .iter()
            .copied()
            .filter(|section| match data.get(*section) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(Value::Sequence(s)) => s.is_empty(),
                Some(_) => false,
            })
            .collect();
        if !missing.is_empty() {
            return Err(EarbotError::Document(format!(
                "report is missing required sections: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { data })
    }

    fn text(&self, section: &str) -> Option<String> {
        match self.data.get(section)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn species(&self) -> String {
        self.text("Species").unwrap_or_default()
    }

    pub fn tolid(&self) -> String {
        self.text("ToLID").unwrap_or_default()
    }

    /// Declared tags; a single string counts as one tag
    pub fn tags(&self) -> Vec<String> {
        match self.data.get("Tags") {
            Some(Value::String(s)) => vec![s.trim().to_string()],
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .collect(),
            _ => vec![],
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t == tag)
    }

    /// `Genome Traits > Observed > Haploid size (bp)` as a number
    pub fn observed_haploid_size(&self) -> Option<u64> {
        let raw = self
            .data
            .get("Genome Traits")?
            .get("Observed")?
            .get("Haploid size (bp)")?;
        match raw {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.replace(',', "").trim().parse().ok(),
            _ => None,
        }
    }

    /// Copy with every missing optional section set to the placeholder
    pub fn with_placeholders(&self) -> Self {
        let mut data = self.data.clone();
        for section in OPTIONAL_SECTIONS {
            let key = Value::String(section.to_string());
            if matches!(data.get(&key), None | Some(Value::Null)) {
                data.insert(key, Value::String(PLACEHOLDER.to_string()));
            }
        }
        Self { data }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.data)?)
    }
}

/// Turns a source document into a structured report
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, source: &Path) -> Result<StructuredReport>;
}

/// Produces a finished report artifact at `output`
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, report: &StructuredReport, output: &Path) -> Result<()>;
}
