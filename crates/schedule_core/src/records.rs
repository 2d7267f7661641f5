//! Header-keyed reader for one delimited feed file.
//!
//! Columns are matched case-insensitively after trimming, so column order and
//! absent optional columns do not matter. Rows come out lazily and the reader
//! is consumed in a single pass.

use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub required: bool,
}

impl ColumnSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub file: &'static str,
    pub columns: &'static [ColumnSpec],
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("{file}: header lacks required column(s) {}", columns.join(", "))]
    MissingColumns {
        file: &'static str,
        columns: Vec<String>,
    },
    #[error("{file}: unreadable header: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file} row {row}: required field {field} is missing")]
pub struct MissingFieldError {
    pub file: &'static str,
    pub row: u64,
    pub field: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    MissingField(MissingFieldError),
    #[error("row {row}: {message}")]
    Malformed { row: u64, message: String },
}

/// One data row, values aligned with the schema's columns.
#[derive(Debug, Clone)]
pub struct Record {
    file: &'static str,
    row: u64,
    columns: &'static [ColumnSpec],
    values: Vec<Option<String>>,
}

impl Record {
    /// Line number in the source file, header being line 1.
    pub fn row_number(&self) -> u64 {
        self.row
    }

    /// Value of a column; empty and absent values are both `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        let index = self.columns.iter().position(|column| column.name == name)?;
        self.values.get(index)?.as_deref()
    }

    pub fn required(&self, name: &'static str) -> Result<&str, MissingFieldError> {
        self.get(name).ok_or(MissingFieldError {
            file: self.file,
            row: self.row,
            field: name,
        })
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Parsed value, `None` when absent or unparsable.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name)?.parse().ok()
    }

    pub fn parse_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.parse(name).unwrap_or(default)
    }
}

pub struct RecordReader<'a> {
    schema: TableSchema,
    positions: Vec<Option<usize>>,
    records: StringRecordsIntoIter<&'a [u8]>,
    ordinal: u64,
}

impl<'a> RecordReader<'a> {
    pub fn new(schema: TableSchema, text: &'a str) -> Result<Self, HeaderError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| HeaderError::Csv {
                file: schema.file,
                source,
            })?
            .iter()
            .map(|header| header.trim().to_ascii_lowercase())
            .collect();

        let positions: Vec<Option<usize>> = schema
            .columns
            .iter()
            .map(|column| headers.iter().position(|header| header == column.name))
            .collect();

        let missing: Vec<String> = schema
            .columns
            .iter()
            .zip(&positions)
            .filter(|(column, position)| column.required && position.is_none())
            .map(|(column, _)| column.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(HeaderError::MissingColumns {
                file: schema.file,
                columns: missing,
            });
        }

        Ok(Self {
            schema,
            positions,
            records: reader.into_records(),
            ordinal: 0,
        })
    }

    pub fn file(&self) -> &'static str {
        self.schema.file
    }

    fn build(&self, row: u64, raw: &StringRecord) -> Result<Record, RecordError> {
        let values: Vec<Option<String>> = self
            .positions
            .iter()
            .map(|position| {
                position
                    .and_then(|index| raw.get(index))
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .collect();

        for (column, value) in self.schema.columns.iter().zip(&values) {
            if column.required && value.is_none() {
                return Err(RecordError::MissingField(MissingFieldError {
                    file: self.schema.file,
                    row,
                    field: column.name,
                }));
            }
        }

        Ok(Record {
            file: self.schema.file,
            row,
            columns: self.schema.columns,
            values,
        })
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.records.next()?;
        self.ordinal += 1;
        let fallback_row = self.ordinal + 1;

        Some(match item {
            Ok(raw) => {
                let row = raw
                    .position()
                    .map(|position| position.line())
                    .unwrap_or(fallback_row);
                self.build(row, &raw)
            }
            Err(err) => Err(RecordError::Malformed {
                row: err
                    .position()
                    .map(|position| position.line())
                    .unwrap_or(fallback_row),
                message: err.to_string(),
            }),
        })
    }
}
