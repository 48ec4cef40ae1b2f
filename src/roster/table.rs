//! Comma-separated roster table with a fixed header row.
//!
//! Column order and unknown columns are preserved. A known cell is written back
//! with its original text unless its parsed value changed, which keeps a
//! load/save cycle without mutations byte-for-byte stable.

use crate::domain::{LastReview, ReviewerRecord};
use crate::error::{EarbotError, Result};

/// Columns the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    FullName,
    Institution,
    TotalReviews,
    LastReview,
    Active,
    Busy,
    CallingScore,
    Supervisor,
}

impl Column {
    /// Columns that must be present in every roster
    pub const REQUIRED: [Column; 8] = [
        Column::Id,
        Column::FullName,
        Column::Institution,
        Column::TotalReviews,
        Column::LastReview,
        Column::Active,
        Column::Busy,
        Column::CallingScore,
    ];

    pub fn from_header(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "github id" | "id" | "handle" => Some(Column::Id),
            "full name" | "name" => Some(Column::FullName),
            "institution" => Some(Column::Institution),
            "total reviews" => Some(Column::TotalReviews),
            "last review" => Some(Column::LastReview),
            "active" => Some(Column::Active),
            "busy" => Some(Column::Busy),
            "calling score" => Some(Column::CallingScore),
            "supervisor" => Some(Column::Supervisor),
            _ => None,
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            Column::Id => "Github ID",
            Column::FullName => "Full Name",
            Column::Institution => "Institution",
            Column::TotalReviews => "Total Reviews",
            Column::LastReview => "Last Review",
            Column::Active => "Active",
            Column::Busy => "Busy",
            Column::CallingScore => "Calling Score",
            Column::Supervisor => "Supervisor",
        }
    }
}

/// A roster row: typed record plus the raw cells it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub record: ReviewerRecord,
    cells: Vec<String>,
}

/// The whole roster, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    header: Vec<String>,
    columns: Vec<Option<Column>>,
    rows: Vec<RosterRow>,
    line_ending: &'static str,
    trailing_newline: bool,
}

impl Roster {
    /// Parse roster text. The source name is only used in error messages.
    pub fn parse(text: &str, source: &str) -> Result<Self> {
        let unavailable = |msg: String| EarbotError::StoreUnavailable(format!("{}: {}", source, msg));

        if text.trim().is_empty() {
            return Err(unavailable("roster is empty".to_string()));
        }

        let line_ending = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_newline = text.ends_with('\n');
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

        let header = split_line(lines.next().unwrap_or_default());
        let columns: Vec<Option<Column>> = header.iter().map(|h| Column::from_header(h)).collect();
        for required in Column::REQUIRED {
            if !columns.contains(&Some(required)) {
                return Err(unavailable(format!("missing column '{}'", required.header())));
            }
        }

        let mut rows: Vec<RosterRow> = Vec::new();
        for (index, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let cells = split_line(line);
            if cells.len() != header.len() {
                return Err(unavailable(format!(
                    "row {} has {} cells, header has {}",
                    index + 2,
                    cells.len(),
                    header.len()
                )));
            }
            let record = parse_record(&columns, &cells).map_err(|e| unavailable(format!("row {}: {}", index + 2, e)))?;
            if rows.iter().any(|r| r.record.is(&record.id)) {
                return Err(unavailable(format!("duplicate id '{}'", record.id)));
            }
            rows.push(RosterRow { record, cells });
        }

        Ok(Self {
            header,
            columns,
            rows,
            line_ending,
            trailing_newline,
        })
    }

    /// Render the roster back to text
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.rows.len() + 1);
        lines.push(join_cells(&self.header));
        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .zip(&row.cells)
                .map(|(column, raw)| match column {
                    Some(col) if !cell_matches(*col, raw, &row.record) => render_cell(*col, &row.record),
                    _ => raw.clone(),
                })
                .collect();
            lines.push(join_cells(&cells));
        }
        let mut out = lines.join(self.line_ending);
        if self.trailing_newline {
            out.push_str(self.line_ending);
        }
        out
    }

    pub fn records(&self) -> impl Iterator<Item = &ReviewerRecord> {
        self.rows.iter().map(|r| &r.record)
    }

    pub fn get(&self, id: &str) -> Option<&ReviewerRecord> {
        self.records().find(|r| r.is(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ReviewerRecord> {
        self.rows.iter_mut().map(|r| &mut r.record).find(|r| r.is(id))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build a roster from records with the standard header (tests, fixtures)
    pub fn from_records(records: Vec<ReviewerRecord>) -> Self {
        let all = [
            Column::Id,
            Column::FullName,
            Column::Institution,
            Column::TotalReviews,
            Column::LastReview,
            Column::Active,
            Column::Busy,
            Column::CallingScore,
            Column::Supervisor,
        ];
        let rows = records
            .into_iter()
            .map(|record| RosterRow {
                cells: all.iter().map(|c| render_cell(*c, &record)).collect(),
                record,
            })
            .collect();
        Self {
            header: all.iter().map(|c| c.header().to_string()).collect(),
            columns: all.iter().copied().map(Some).collect(),
            rows,
            line_ending: "\n",
            trailing_newline: true,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" | "" => Some(false),
        _ => None,
    }
}

fn render_bool(value: bool) -> String {
    if value { "Y" } else { "N" }.to_string()
}

fn parse_record(columns: &[Option<Column>], cells: &[String]) -> std::result::Result<ReviewerRecord, String> {
    let mut record = ReviewerRecord::new("", "", "");
    for (column, raw) in columns.iter().zip(cells) {
        let Some(column) = column else { continue };
        let invalid = || format!("invalid {} '{}'", column.header(), raw);
        match column {
            Column::Id => record.id = raw.trim().to_string(),
            Column::FullName => record.full_name = raw.trim().to_string(),
            Column::Institution => record.institution = raw.trim().to_string(),
            Column::TotalReviews => record.total_reviews = raw.trim().parse().map_err(|_| invalid())?,
            Column::LastReview => record.last_review = LastReview::parse(raw).ok_or_else(invalid)?,
            Column::Active => record.active = parse_bool(raw).ok_or_else(invalid)?,
            Column::Busy => record.busy = parse_bool(raw).ok_or_else(invalid)?,
            Column::CallingScore => record.calling_score = raw.trim().parse().map_err(|_| invalid())?,
            Column::Supervisor => record.is_supervisor = parse_bool(raw).ok_or_else(invalid)?,
        }
    }
    if record.id.is_empty() {
        return Err("empty Github ID".to_string());
    }
    Ok(record)
}

fn render_cell(column: Column, record: &ReviewerRecord) -> String {
    match column {
        Column::Id => record.id.clone(),
        Column::FullName => record.full_name.clone(),
        Column::Institution => record.institution.clone(),
        Column::TotalReviews => record.total_reviews.to_string(),
        Column::LastReview => record.last_review.render(),
        Column::Active => render_bool(record.active),
        Column::Busy => render_bool(record.busy),
        Column::CallingScore => record.calling_score.to_string(),
        Column::Supervisor => render_bool(record.is_supervisor),
    }
}

/// True if the raw cell still parses to the record's current value
fn cell_matches(column: Column, raw: &str, record: &ReviewerRecord) -> bool {
    match column {
        Column::Id => raw.trim() == record.id,
        Column::FullName => raw.trim() == record.full_name,
        Column::Institution => raw.trim() == record.institution,
        Column::TotalReviews => raw.trim().parse::<u32>().ok() == Some(record.total_reviews),
        Column::LastReview => LastReview::parse(raw) == Some(record.last_review),
        Column::Active => parse_bool(raw) == Some(record.active),
        Column::Busy => parse_bool(raw) == Some(record.busy),
        Column::CallingScore => raw.trim().parse::<i64>().ok() == Some(record.calling_score),
        Column::Supervisor => parse_bool(raw) == Some(record.is_supervisor),
    }
}

/// Split one line into cells, honouring double-quoted fields
pub fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

/// Join cells into one line, quoting cells that need it
pub fn join_cells(cells: &[String]) -> String {
    cells
        .iter()
        .map(|cell| {
            if cell.contains(',') || cell.contains('"') {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub const SAMPLE: &str = "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score,Supervisor\n\
alice,Alice Smith,Uni X,3,2024-01-15,Y,N,100,N\n\
bob,Bob Jones,\"Institute Y, Madrid\",0,NA,Y,N,90,Y\n\
carol,Carol White,Uni Z,1,2023-07-01,N,N,95,N\n";

    #[test]
    fn test_parse_sample() {
        let roster = Roster::parse(SAMPLE, "test").unwrap();
        assert_eq!(roster.len(), 3);

        let bob = roster.get("BOB").unwrap();
        assert_eq!(bob.institution, "Institute Y, Madrid");
        assert_eq!(bob.last_review, LastReview::Never);
        assert!(bob.is_supervisor);
        assert_eq!(bob.calling_score, 90);

        let carol = roster.get("carol").unwrap();
        assert!(!carol.active);
        assert_eq!(
            carol.last_review,
            LastReview::On(NaiveDate::from_ymd_opt(2023, 7, 1).unwrap())
        );
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let roster = Roster::parse(SAMPLE, "test").unwrap();
        assert_eq!(roster.render(), SAMPLE);
    }

    #[test]
    fn test_round_trip_preserves_unknown_columns_and_spelling() {
        let text = "Calling Score,Github ID,Full Name,Notes,Institution,Total Reviews,Last Review,Active,Busy\r\n\
0100,dave,Dave,\"likes \"\"fungi\"\"\",Uni Q,2,na,yes,no\r\n";
        let roster = Roster::parse(text, "test").unwrap();
        assert_eq!(roster.get("dave").unwrap().calling_score, 100);
        assert_eq!(roster.render(), text);
    }

    #[test]
    fn test_render_rewrites_only_changed_cells() {
        let text = "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score\n\
dave,Dave,Uni Q,2,NA,yes,no,0100\n";
        let mut roster = Roster::parse(text, "test").unwrap();
        roster.get_mut("dave").unwrap().busy = true;
        assert_eq!(
            roster.render(),
            "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score\n\
dave,Dave,Uni Q,2,NA,yes,Y,0100\n"
        );
    }

    #[test]
    fn test_missing_column_is_store_unavailable() {
        let text = "Github ID,Full Name,Institution\nalice,Alice,Uni X\n";
        let err = Roster::parse(text, "roster.csv").unwrap_err();
        assert!(matches!(err, EarbotError::StoreUnavailable(_)));
        assert!(err.to_string().contains("Total Reviews"));
    }

    #[test]
    fn test_empty_roster_is_store_unavailable() {
        let err = Roster::parse("  \n", "roster.csv").unwrap_err();
        assert!(matches!(err, EarbotError::StoreUnavailable(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let text = "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score\n\
alice,A,X,0,NA,Y,N,1\nALICE,B,Y,0,NA,Y,N,1\n";
        let err = Roster::parse(text, "roster.csv").unwrap_err();
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn test_bad_cell_reports_row() {
        let text = "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score\n\
alice,A,X,many,NA,Y,N,1\n";
        let err = Roster::parse(text, "roster.csv").unwrap_err();
        assert!(err.to_string().contains("row 2"));
        assert!(err.to_string().contains("Total Reviews"));
    }

    #[test]
    fn test_split_and_join_quoted() {
        let cells = split_line("a,\"b, c\",\"say \"\"hi\"\"\",");
        assert_eq!(cells, vec!["a", "b, c", "say \"hi\"", ""]);
        assert_eq!(join_cells(&cells), "a,\"b, c\",\"say \"\"hi\"\"\",");
    }

    #[test]
    fn test_from_records_renders_standard_header() {
        let mut record = ReviewerRecord::new("erin", "Erin", "Uni E");
        record.is_supervisor = true;
        let roster = Roster::from_records(vec![record]);
        assert_eq!(
            roster.render(),
            "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score,Supervisor\n\
erin,Erin,Uni E,0,NA,Y,N,0,Y\n"
        );
    }
}
