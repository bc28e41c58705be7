//! Query-string types with friendly validation errors.
//!
//! Parameters arrive as raw strings and are validated here, so a bad value
//! becomes a JSON 400 naming the parameter instead of a bare extractor
//! rejection.

use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

use errata_core::{parse_flexible_datetime, ListNotesRequest, NoteFilter, SolveStatus};

use crate::ApiError;

/// `GET /api/notes` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct NotesQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub subject_id: Option<String>,
    pub status: Option<String>,
    /// Comma-separated tag ids; a note must carry all of them.
    pub tag_ids: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub q: Option<String>,
}

impl NotesQuery {
    pub fn into_request(self) -> Result<ListNotesRequest, ApiError> {
        let defaults = ListNotesRequest::default();
        let filter = NoteFilter {
            subject_id: present(&self.subject_id)
                .map(|s| parse_uuid("subject_id", s))
                .transpose()?,
            status: present(&self.status)
                .map(SolveStatus::from_str)
                .transpose()?,
            tag_ids: parse_id_list("tag_ids", self.tag_ids.as_deref().unwrap_or(""))?,
            date_from: present(&self.date_from)
                .map(parse_flexible_datetime)
                .transpose()?,
            date_to: present(&self.date_to)
                .map(parse_flexible_datetime)
                .transpose()?,
            q: present(&self.q).map(str::to_string),
        };
        Ok(ListNotesRequest {
            filter,
            page: parse_int("page", &self.page)?.unwrap_or(defaults.page),
            per_page: parse_int("per_page", &self.per_page)?.unwrap_or(defaults.per_page),
        }
        .normalized())
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_int(name: &str, value: &Option<String>) -> Result<Option<i64>, ApiError> {
    present(value)
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                ApiError::BadRequest(format!("Invalid {}: '{}' is not a number", name, s))
            })
        })
        .transpose()
}

fn parse_uuid(name: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value)
        .map_err(|_| ApiError::BadRequest(format!("Invalid {}: '{}' is not a valid id", name, value)))
}

/// Parse `a,b,c` into ids, skipping blank entries.
pub fn parse_id_list(name: &str, raw: &str) -> Result<Vec<Uuid>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_uuid(name, s))
        .collect()
}
