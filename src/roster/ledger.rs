//! Append-only ledger of completed reviews.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use super::table::{join_cells, split_line};
use crate::domain::LedgerEntry;
use crate::error::{EarbotError, Result};

/// Ledger file with columns `name,institution,subject,link`
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub const HEADER: [&'static str; 4] = ["name", "institution", "subject", "link"];

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .map_err(|e| EarbotError::StoreUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    /// All rows after the header, in file order
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(parse_entries(&self.read()?))
    }

    /// Append one entry. Returns false without writing when an entry for the
    /// same request link is already recorded.
    pub fn append(&self, entry: &LedgerEntry) -> Result<bool> {
        let existing = self.read()?;
        if parse_entries(&existing).iter().any(|e| e.link == entry.link) {
            info!("Ledger already records {}, not appending", entry.link);
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| EarbotError::StoreUnavailable(format!("{}: {}", self.path.display(), e)))?;
        let cells = [
            entry.reviewer_name.clone(),
            entry.institution.clone(),
            entry.subject.clone(),
            entry.link.clone(),
        ];
        let separator = if existing.is_empty() || existing.ends_with('\n') { "" } else { "\n" };
        writeln!(file, "{}{}", separator, join_cells(&cells))?;
        info!("Added {} to the review ledger", entry.reviewer_name);
        Ok(true)
    }
}

fn parse_entries(text: &str) -> Vec<LedgerEntry> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let has_header = lines.clone().next().is_some_and(|first| {
        split_line(first)
            .first()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(Ledger::HEADER[0]))
    });
    if has_header {
        lines.next();
    }
    lines
        .map(split_line)
        .filter(|cells| cells.len() >= 4)
        .map(|cells| LedgerEntry {
            reviewer_name: cells[0].clone(),
            institution: cells[1].clone(),
            subject: cells[2].clone(),
            link: cells[3..].join(","),
        })
        .collect()
}
