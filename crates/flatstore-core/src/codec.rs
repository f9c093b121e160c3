//! CSV codec for the three table files.
//!
//! Framing is deliberately minimal: one record per line after a header line,
//! fields separated by commas, no quoting. Every cell is trimmed.
//!
//! Parsing is row-scoped. A row with the wrong cell count, a numeric cell that
//! is not entirely an integer, or a value that breaks a record rule is dropped
//! and logged; the rest of the table still loads.

use std::fmt;

use tracing::warn;

use crate::model::{check_comment_matches_kind, Engagement, Post, User};

/// A record type that maps to one CSV table.
pub trait CsvRecord: Sized {
    /// Table name used in diagnostics
    const TABLE: &'static str;
    /// Header line written at the top of the file
    const HEADER: &'static str;
    /// Expected number of cells per row
    const COLUMNS: usize;

    /// Primary key
    fn id(&self) -> i64;

    /// Build a record from exactly `COLUMNS` trimmed cells.
    fn from_cells(cells: &[&str]) -> Result<Self, RowRejection>;

    /// Format the record as one line, without the trailing newline.
    fn to_row(&self) -> String;
}

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    ColumnCount { expected: usize, found: usize },
    BadInteger { column: &'static str, value: String },
    BadValue { column: &'static str, reason: String },
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRejection::ColumnCount { expected, found } => {
                write!(f, "expected {} cells, found {}", expected, found)
            }
            RowRejection::BadInteger { column, value } => {
                write!(f, "column {} is not an integer: '{}'", column, value)
            }
            RowRejection::BadValue { column, reason } => {
                write!(f, "column {}: {}", column, reason)
            }
        }
    }
}

/// Records decoded from one file plus the rows that were dropped.
#[derive(Debug)]
pub struct ParsedTable<R> {
    pub records: Vec<R>,
    /// (1-based line number, reason)
    pub rejected: Vec<(usize, RowRejection)>,
}

/// Split a line on commas and trim each cell.
pub fn split_line(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Strict integer parse: the whole cell must be a base-10 integer.
pub fn parse_int(column: &'static str, cell: &str) -> Result<i64, RowRejection> {
    cell.parse::<i64>().map_err(|_| RowRejection::BadInteger {
        column,
        value: cell.to_string(),
    })
}

fn non_empty<'a>(column: &'static str, cell: &'a str) -> Result<&'a str, RowRejection> {
    if cell.is_empty() {
        Err(RowRejection::BadValue { column, reason: "must not be empty".into() })
    } else {
        Ok(cell)
    }
}

/// Decode a whole file. The first line is always treated as the header.
pub fn parse_table<R: CsvRecord>(text: &str) -> ParsedTable<R> {
    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for (index, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let cells = split_line(line);
        let result = if cells.len() != R::COLUMNS {
            Err(RowRejection::ColumnCount { expected: R::COLUMNS, found: cells.len() })
        } else {
            R::from_cells(&cells)
        };
        match result {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(table = R::TABLE, line = line_no, %reason, "dropping malformed row");
                rejected.push((line_no, reason));
            }
        }
    }

    ParsedTable { records, rejected }
}

/// Encode a header and pre-formatted rows into one text blob, every line
/// newline-terminated.
pub fn encode_table<I, S>(header: &str, rows: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::with_capacity(header.len() + 1);
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(row.as_ref());
        out.push('\n');
    }
    out
}

impl CsvRecord for User {
    const TABLE: &'static str = "users";
    const HEADER: &'static str = "id,username,location";
    const COLUMNS: usize = 3;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_cells(cells: &[&str]) -> Result<Self, RowRejection> {
        Ok(User {
            id: parse_int("id", cells[0])?,
            username: non_empty("username", cells[1])?.to_string(),
            location: cells[2].to_string(),
        })
    }

    fn to_row(&self) -> String {
        format!("{},{},{}", self.id, self.username, self.location)
    }
}

impl CsvRecord for Post {
    const TABLE: &'static str = "posts";
    const HEADER: &'static str = "id,content,username,views";
    const COLUMNS: usize = 4;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_cells(cells: &[&str]) -> Result<Self, RowRejection> {
        let id = parse_int("id", cells[0])?;
        let author = non_empty("username", cells[2])?.to_string();
        let views = parse_int("views", cells[3])?;
        if views < 0 {
            return Err(RowRejection::BadValue { column: "views", reason: "must not be negative".into() });
        }
        Ok(Post { id, content: cells[1].to_string(), author, views })
    }

    fn to_row(&self) -> String {
        format!("{},{},{},{}", self.id, self.content, self.author, self.views)
    }
}

impl CsvRecord for Engagement {
    const TABLE: &'static str = "engagements";
    const HEADER: &'static str = "id,postId,username,type,comment,timestamp";
    const COLUMNS: usize = 6;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_cells(cells: &[&str]) -> Result<Self, RowRejection> {
        let id = parse_int("id", cells[0])?;
        let post_id = parse_int("postId", cells[1])?;
        let username = non_empty("username", cells[2])?.to_string();
        let kind = cells[3]
            .parse()
            .map_err(|reason| RowRejection::BadValue { column: "type", reason })?;
        let comment = cells[4].to_string();
        let timestamp = parse_int("timestamp", cells[5])?;
        check_comment_matches_kind(kind, &comment)
            .map_err(|reason| RowRejection::BadValue { column: "comment", reason })?;
        Ok(Engagement { id, post_id, username, kind, comment, timestamp })
    }

    fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.id, self.post_id, self.username, self.kind, self.comment, self.timestamp
        )
    }
}
