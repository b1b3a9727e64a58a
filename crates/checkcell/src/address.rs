//! Cell and range coordinates.
//!
//! Columns and rows are **1-based**, matching A1 notation: column `1` is `A`,
//! row `1` is the first row. [`Address`] is totally ordered by
//! `(sheet, column, row)`; that order is the deterministic tie-break used
//! when two cells are otherwise indistinguishable.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of columns in a worksheet (`XFD`).
pub const MAX_COLUMNS: u32 = 16_384;

/// Number of rows in a worksheet.
pub const MAX_ROWS: u32 = 1_048_576;

/// Errors produced while parsing an A1 reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The reference text was empty.
    #[error("empty reference")]
    Empty,
    /// No column letters were found.
    #[error("missing column in `{0}`")]
    MissingColumn(String),
    /// No row digits were found.
    #[error("missing row in `{0}`")]
    MissingRow(String),
    /// The column lies beyond `XFD`.
    #[error("column out of range in `{0}`")]
    ColumnOutOfRange(String),
    /// The row is zero or beyond the last worksheet row.
    #[error("row out of range in `{0}`")]
    RowOutOfRange(String),
    /// Characters remained after the row digits.
    #[error("trailing characters in `{0}`")]
    TrailingCharacters(String),
    /// A quoted sheet name was not closed.
    #[error("unterminated sheet name in `{0}`")]
    UnterminatedSheet(String),
}

/// A single cell on a named worksheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    /// Worksheet name.
    pub sheet: String,
    /// 1-based column index.
    pub column: u32,
    /// 1-based row index.
    pub row: u32,
}

impl Address {
    /// Construct an address from already-validated coordinates.
    pub fn new(sheet: impl Into<String>, column: u32, row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            column,
            row,
        }
    }

    /// Parse a sheet-less A1 reference such as `B3` or `$B$3` on `sheet`.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if `a1` is not a valid in-bounds reference.
    pub fn from_a1(sheet: &str, a1: &str) -> Result<Self, AddressError> {
        let (column, row) = parse_cell(a1)?;
        Ok(Self::new(sheet, column, row))
    }

    /// Parse `Sheet!A1`, `'My Sheet'!A1` or a bare `A1` (resolved against
    /// `default_sheet`).
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the text is not a valid reference.
    pub fn parse(text: &str, default_sheet: &str) -> Result<Self, AddressError> {
        let (sheet, rest) = split_sheet(text.trim())?;
        Self::from_a1(sheet.as_deref().unwrap_or(default_sheet), rest)
    }

    /// The sheet-less A1 form, e.g. `B3`.
    #[must_use]
    pub fn a1(&self) -> String {
        format!("{}{}", column_name(self.column), self.row)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", quote_sheet(&self.sheet), self.a1())
    }
}

/// A normalized rectangular block of cells on one worksheet.
///
/// `first_*` is always less than or equal to `last_*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RangeRef {
    /// Worksheet name.
    pub sheet: String,
    /// Leftmost column.
    pub first_column: u32,
    /// Top row.
    pub first_row: u32,
    /// Rightmost column.
    pub last_column: u32,
    /// Bottom row.
    pub last_row: u32,
}

impl RangeRef {
    /// Build a range from two corner cells, normalizing their order.
    pub fn new(sheet: impl Into<String>, a: (u32, u32), b: (u32, u32)) -> Self {
        Self {
            sheet: sheet.into(),
            first_column: a.0.min(b.0),
            first_row: a.1.min(b.1),
            last_column: a.0.max(b.0),
            last_row: a.1.max(b.1),
        }
    }

    /// The one-cell range covering `address`.
    #[must_use]
    pub fn single(address: &Address) -> Self {
        Self::new(
            address.sheet.clone(),
            (address.column, address.row),
            (address.column, address.row),
        )
    }

    /// Parse `A1:B2`, `Sheet!A1:B2` or a single cell reference.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if either corner is invalid.
    pub fn parse(text: &str, default_sheet: &str) -> Result<Self, AddressError> {
        let (sheet, rest) = split_sheet(text.trim())?;
        let sheet = sheet.as_deref().unwrap_or(default_sheet);
        match rest.split_once(':') {
            None => {
                let corner = parse_cell(rest)?;
                Ok(Self::new(sheet, corner, corner))
            }
            Some((a, b)) => Ok(Self::new(sheet, parse_cell(a)?, parse_cell(b)?)),
        }
    }

    /// Top-left corner.
    #[must_use]
    pub fn start(&self) -> Address {
        Address::new(self.sheet.clone(), self.first_column, self.first_row)
    }

    /// Bottom-right corner.
    #[must_use]
    pub fn end(&self) -> Address {
        Address::new(self.sheet.clone(), self.last_column, self.last_row)
    }

    /// Whether the range covers exactly one cell.
    #[must_use]
    pub fn is_single_cell(&self) -> bool {
        self.first_column == self.last_column && self.first_row == self.last_row
    }

    /// Number of cells covered.
    #[must_use]
    pub fn cell_count(&self) -> u64 {
        u64::from(self.last_column - self.first_column + 1)
            * u64::from(self.last_row - self.first_row + 1)
    }

    /// Whether `address` lies inside the range.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        address.sheet == self.sheet
            && (self.first_column..=self.last_column).contains(&address.column)
            && (self.first_row..=self.last_row).contains(&address.row)
    }

    /// Every cell of the range in column-major order.
    pub fn cells(&self) -> impl Iterator<Item = Address> + '_ {
        (self.first_column..=self.last_column).flat_map(move |column| {
            (self.first_row..=self.last_row)
                .map(move |row| Address::new(self.sheet.clone(), column, row))
        })
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = format!("{}{}", column_name(self.first_column), self.first_row);
        if self.is_single_cell() {
            write!(f, "{}!{start}", quote_sheet(&self.sheet))
        } else {
            write!(
                f,
                "{}!{start}:{}{}",
                quote_sheet(&self.sheet),
                column_name(self.last_column),
                self.last_row
            )
        }
    }
}

/// Convert a 1-based column index to letters (`1` → `A`, `28` → `AB`).
#[must_use]
pub fn column_name(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + u8::try_from(rem).unwrap_or(0));
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters to a 1-based index (`A` → `1`), case-insensitive.
///
/// Returns `None` for empty input, non-letters, or columns beyond `XFD`.
#[must_use]
pub fn column_index(name: &str) -> Option<u32> {
    if name.is_empty() || name.len() > 3 {
        return None;
    }
    let mut index: u32 = 0;
    for b in name.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    (index <= MAX_COLUMNS).then_some(index)
}

/// Quote a sheet name when it is not a plain identifier.
#[must_use]
pub fn quote_sheet(sheet: &str) -> String {
    let plain = !sheet.is_empty()
        && !sheet.starts_with(|c: char| c.is_ascii_digit())
        && sheet.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if plain {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Parse `B3` / `$B$3` into `(column, row)`.
pub(crate) fn parse_cell(text: &str) -> Result<(u32, u32), AddressError> {
    let s = text.trim();
    if s.is_empty() {
        return Err(AddressError::Empty);
    }
    let bytes = s.as_bytes();
    let mut idx = 0;
    if bytes[idx] == b'$' {
        idx += 1;
    }
    let col_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
        idx += 1;
    }
    if idx == col_start {
        return Err(AddressError::MissingColumn(s.to_string()));
    }
    let column =
        column_index(&s[col_start..idx]).ok_or_else(|| AddressError::ColumnOutOfRange(s.to_string()))?;
    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let row_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == row_start {
        return Err(AddressError::MissingRow(s.to_string()));
    }
    if idx != bytes.len() {
        return Err(AddressError::TrailingCharacters(s.to_string()));
    }
    let row: u32 = s[row_start..idx]
        .parse()
        .map_err(|_| AddressError::RowOutOfRange(s.to_string()))?;
    if row == 0 || row > MAX_ROWS {
        return Err(AddressError::RowOutOfRange(s.to_string()));
    }
    Ok((column, row))
}

/// Split an optional `Sheet!` / `'Sheet name'!` prefix from a reference.
fn split_sheet(text: &str) -> Result<(Option<String>, &str), AddressError> {
    if let Some(quoted) = text.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                    name.push('\'');
                    continue;
                }
                let rest = &quoted[i + 1..];
                return match rest.strip_prefix('!') {
                    Some(cell) => Ok((Some(name), cell)),
                    None => Err(AddressError::UnterminatedSheet(text.to_string())),
                };
            }
            name.push(c);
        }
        return Err(AddressError::UnterminatedSheet(text.to_string()));
    }
    match text.rsplit_once('!') {
        Some((sheet, cell)) => Ok((Some(sheet.to_string()), cell)),
        None => Ok((None, text)),
    }
}
