//! CSV rows for posts and comments.
//!
//! List-valued fields are stored as JSON arrays in a single column so a
//! spreadsheet still shows one row per record.

use chrono::{DateTime, SecondsFormat, Utc};
use painpoint_core::{CommentRecord, CoreError, ExportError, ListingSort, Record, Sentiment};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub community: String,
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_utc: String,
    pub score: i64,
    pub num_comments: u64,
    pub url: String,
    pub sort: ListingSort,
    pub pain_points: String,
    pub polarity: f64,
    pub subjectivity: f64,
    pub price_mentions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRow {
    pub post_id: String,
    pub comment_id: String,
    pub body: String,
    pub author: String,
    pub score: i64,
    pub created_utc: String,
    pub mentions_solution: bool,
    pub price_mentions: String,
}

fn json_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Position of a row being read back, for error messages.
struct RowContext<'a> {
    path: &'a str,
    row: usize,
}

impl RowContext<'_> {
    fn malformed(&self, reason: String) -> CoreError {
        ExportError::MalformedRow {
            path: self.path.to_string(),
            row: self.row,
            reason,
        }
        .into()
    }

    fn list(&self, column: &str, raw: &str) -> Result<Vec<String>, CoreError> {
        serde_json::from_str(raw).map_err(|e| self.malformed(format!("{}: {}", column, e)))
    }

    fn time(&self, raw: &str) -> Result<DateTime<Utc>, CoreError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| self.malformed(format!("created_utc: {}", e)))
    }
}

impl From<&Record> for PostRow {
    fn from(record: &Record) -> Self {
        Self {
            community: record.community.clone(),
            id: record.id.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            author: record.author.clone(),
            created_utc: timestamp(&record.created_utc),
            score: record.score,
            num_comments: record.num_comments,
            url: record.url.clone(),
            sort: record.sort,
            pain_points: json_list(&record.pain_points),
            polarity: record.sentiment.polarity,
            subjectivity: record.sentiment.subjectivity,
            price_mentions: json_list(&record.price_mentions),
        }
    }
}

impl PostRow {
    fn into_record(self, ctx: &RowContext<'_>) -> Result<Record, CoreError> {
        Ok(Record {
            created_utc: ctx.time(&self.created_utc)?,
            pain_points: ctx.list("pain_points", &self.pain_points)?,
            price_mentions: ctx.list("price_mentions", &self.price_mentions)?,
            sentiment: Sentiment::new(self.polarity, self.subjectivity),
            community: self.community,
            id: self.id,
            title: self.title,
            body: self.body,
            author: self.author,
            score: self.score,
            num_comments: self.num_comments,
            url: self.url,
            sort: self.sort,
        })
    }
}

impl From<&CommentRecord> for CommentRow {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            post_id: comment.post_id.clone(),
            comment_id: comment.comment_id.clone(),
            body: comment.body.clone(),
            author: comment.author.clone(),
            score: comment.score,
            created_utc: timestamp(&comment.created_utc),
            mentions_solution: comment.mentions_solution,
            price_mentions: json_list(&comment.price_mentions),
        }
    }
}

impl CommentRow {
    fn into_comment(self, ctx: &RowContext<'_>) -> Result<CommentRecord, CoreError> {
        Ok(CommentRecord {
            created_utc: ctx.time(&self.created_utc)?,
            price_mentions: ctx.list("price_mentions", &self.price_mentions)?,
            post_id: self.post_id,
            comment_id: self.comment_id,
            body: self.body,
            author: self.author,
            score: self.score,
            mentions_solution: self.mentions_solution,
        })
    }
}

fn write_rows<W, R>(writer: W, rows: impl Iterator<Item = R>) -> Result<(), CoreError>
where
    W: Write,
    R: Serialize,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row).map_err(ExportError::from)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn read_rows<Row, T, R, F>(reader: R, path: &str, convert: F) -> Result<Vec<T>, CoreError>
where
    Row: DeserializeOwned,
    R: Read,
    F: Fn(Row, &RowContext<'_>) -> Result<T, CoreError>,
{
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut values = Vec::new();
    for (index, row) in csv_reader.deserialize::<Row>().enumerate() {
        let ctx = RowContext {
            path,
            row: index + 1,
        };
        let row = row.map_err(|e| ctx.malformed(e.to_string()))?;
        values.push(convert(row, &ctx)?);
    }
    Ok(values)
}

pub fn write_records<W: Write>(writer: W, records: &[Record]) -> Result<(), CoreError> {
    write_rows(writer, records.iter().map(PostRow::from))
}

pub fn write_comments<W: Write>(writer: W, comments: &[CommentRecord]) -> Result<(), CoreError> {
    write_rows(writer, comments.iter().map(CommentRow::from))
}

/// Parse post rows from `reader`; `source` names the input in errors.
pub fn read_records_from<R: Read>(reader: R, source: &str) -> Result<Vec<Record>, CoreError> {
    read_rows(reader, source, PostRow::into_record)
}

pub fn read_comments_from<R: Read>(reader: R, source: &str) -> Result<Vec<CommentRecord>, CoreError> {
    read_rows(reader, source, CommentRow::into_comment)
}

/// Read a posts CSV written by [`write_records`].
pub fn read_records(path: &Path) -> Result<Vec<Record>, CoreError> {
    let file = File::open(path)?;
    read_records_from(file, &path.display().to_string())
}

pub fn read_comments(path: &Path) -> Result<Vec<CommentRecord>, CoreError> {
    let file = File::open(path)?;
    read_comments_from(file, &path.display().to_string())
}
