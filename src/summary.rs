//! Genome-size totals over approved assembly reports.
//!
//! Every merged request leaves a structured report at
//! `Assembly_Reports/<genus>/<tolid>/<name>.yaml`; this walks them and totals
//! the observed haploid size per project tag.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{EarbotError, Result};
use crate::report::StructuredReport;

/// Location of report YAML files below the repository root
pub const REPORT_GLOB: &str = "Assembly_Reports/*/*/*.yaml";

/// Prefix shared by the consortium's project tags
pub const TAG_PREFIX: &str = "ERGA";

/// Which reports to count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    /// Reports carrying exactly this tag
    Tag(String),
    /// Reports carrying any tag with the prefix
    Prefixed(String),
}

impl TagFilter {
    fn matching(&self, tags: &[String]) -> Vec<String> {
        tags.iter()
            .filter(|t| match self {
                TagFilter::Tag(tag) => *t == tag,
                TagFilter::Prefixed(prefix) => t.starts_with(prefix.as_str()),
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyEntry {
    pub species: String,
    pub tolid: String,
    pub haploid_size: u64,
    /// Tags of this report that passed the filter
    pub tags: Vec<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub entries: Vec<AssemblyEntry>,
}

impl Summary {
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.haploid_size).sum()
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.entries.iter().flat_map(|e| e.tags.iter().cloned()).collect()
    }

    /// (report count, total size) per tag
    pub fn per_tag(&self) -> BTreeMap<String, (usize, u64)> {
        let mut totals: BTreeMap<String, (usize, u64)> = BTreeMap::new();
        for entry in &self.entries {
            for tag in &entry.tags {
                let slot = totals.entry(tag.clone()).or_default();
                slot.0 += 1;
                slot.1 += entry.haploid_size;
            }
        }
        totals
    }

    /// Entries sorted by species name
    pub fn sorted(&self) -> Vec<&AssemblyEntry> {
        let mut entries: Vec<&AssemblyEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.species.cmp(&b.species).then(a.tolid.cmp(&b.tolid)));
        entries
    }
}

/// Read every report under `root` that matches the filter.
///
/// Unreadable reports and reports without an observed haploid size are
/// skipped.
pub fn collect(root: &Path, filter: &TagFilter) -> Result<Summary> {
    let pattern = root.join(REPORT_GLOB);
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern).map_err(|e| EarbotError::Validation(format!("bad pattern {}: {}", pattern, e)))?;

    let mut summary = Summary::default();
    for path in paths.filter_map(|p| p.ok()) {
        let report = match std::fs::read_to_string(&path)
            .map_err(EarbotError::from)
            .and_then(|text| StructuredReport::parse(&text))
        {
            Ok(report) => report,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let tags = filter.matching(&report.tags());
        if tags.is_empty() {
            continue;
        }
        let Some(haploid_size) = report.observed_haploid_size() else {
            debug!("Skipping {}: no observed haploid size", path.display());
            continue;
        };

        summary.entries.push(AssemblyEntry {
            species: report.species(),
            tolid: report.tolid(),
            haploid_size,
            tags,
            path,
        });
    }
    Ok(summary)
}

/// `1234567` -> `1,234,567`
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_report(root: &Path, genus: &str, tolid: &str, tags: &str, size: &str) {
        let dir = root.join("Assembly_Reports").join(genus).join(tolid);
        fs::create_dir_all(&dir).unwrap();
        let yaml = format!(
            "Species: {genus} sp\nToLID: {tolid}\nTags: {tags}\nGenome Traits:\n  Observed:\n    Haploid size (bp): {size}\n"
        );
        fs::write(dir.join(format!("{}_EAR.yaml", tolid)), yaml).unwrap();
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(230_123_456), "230,123,456");
    }

    #[test]
    fn test_collect_single_tag() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "Apis", "iyApiMel1", "ERGA-BGE", "\"230,000,000\"");
        write_report(temp.path(), "Bombus", "iyBomTer1", "ERGA-Pilot", "\"400,000,000\"");
        write_report(temp.path(), "Canis", "mCanLup1", "[ERGA-BGE, ERGA-Pilot]", "2400000000");

        let summary = collect(temp.path(), &TagFilter::Tag("ERGA-BGE".to_string())).unwrap();
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(summary.total_size(), 2_630_000_000);
        assert_eq!(summary.sorted()[0].tolid, "iyApiMel1");
    }

    #[test]
    fn test_collect_all_prefixed_tags() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "Apis", "iyApiMel1", "ERGA-BGE", "\"230,000,000\"");
        write_report(temp.path(), "Canis", "mCanLup1", "[ERGA-BGE, ERGA-Pilot]", "2400000000");
        write_report(temp.path(), "Danio", "fDanRer1", "DToL", "1400000000");

        let summary = collect(temp.path(), &TagFilter::Prefixed(TAG_PREFIX.to_string())).unwrap();
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(summary.tags().into_iter().collect::<Vec<_>>(), vec!["ERGA-BGE", "ERGA-Pilot"]);

        let per_tag = summary.per_tag();
        assert_eq!(per_tag["ERGA-BGE"], (2, 2_630_000_000));
        assert_eq!(per_tag["ERGA-Pilot"], (1, 2_400_000_000));
    }

    #[test]
    fn test_broken_reports_skipped() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "Apis", "iyApiMel1", "ERGA-BGE", "unknown");
        let dir = temp.path().join("Assembly_Reports/Bombus/iyBomTer1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("broken.yaml"), ": : :").unwrap();

        let summary = collect(temp.path(), &TagFilter::Tag("ERGA-BGE".to_string())).unwrap();
        assert!(summary.entries.is_empty());
        assert_eq!(summary.total_size(), 0);
    }
}
