use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;

use crate::ipc::error::err;
use crate::ipc::handlers::setup::CourseSettings;
use crate::ipc::types::{AppState, Request};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn parse_opt_i64(v: Option<&JsonValue>) -> Result<Option<i64>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or("must be integer or null"),
    }
}

/// Trimmed, non-empty, bounded by the configured title length.
pub fn validate_title(
    raw: Option<&JsonValue>,
    key: &str,
    settings: &CourseSettings,
) -> Result<String, String> {
    let Some(s) = raw.and_then(|v| v.as_str()) else {
        return Err(format!("{} is required", key));
    };
    let title = s.trim().to_string();
    if title.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if title.chars().count() > settings.max_title_length {
        return Err(format!(
            "{} must be at most {} characters",
            key, settings.max_title_length
        ));
    }
    Ok(title)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    /// Row offset; `parse_page` only builds pages whose offset fits in an i64.
    pub fn offset(self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

pub fn parse_page(req: &Request, default_page_size: i64) -> Result<Page, String> {
    let page = parse_opt_i64(req.params.get("page"))
        .map_err(|m| format!("page {}", m))?
        .unwrap_or(1);
    if page < 1 {
        return Err("page must be >= 1".to_string());
    }
    let page_size = parse_opt_i64(req.params.get("pageSize"))
        .map_err(|m| format!("pageSize {}", m))?
        .unwrap_or(default_page_size);
    if !(1..=100).contains(&page_size) {
        return Err("pageSize must be in 1..=100".to_string());
    }
    if (page - 1).checked_mul(page_size).is_none() {
        return Err("page is out of range".to_string());
    }
    Ok(Page { page, page_size })
}

/// Escape character of [`like_pattern`]; SQL reads `column LIKE ? ESCAPE '\'`.
pub const LIKE_ESCAPE: char = '\\';

/// `LIKE` pattern for an optional free-text query; `%` matches everything.
/// Wildcards in the query match literally.
pub fn like_pattern(query: Option<&str>) -> String {
    let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return "%".to_string();
    };
    let mut out = String::with_capacity(q.len() + 2);
    out.push('%');
    for ch in q.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionPair {
    pub id: String,
    pub position: i64,
}

/// Parses a `[{ id, position }]` payload. Ids must be unique and positions >= 1.
pub fn parse_position_pairs(
    v: Option<&JsonValue>,
    key: &str,
) -> Result<Vec<PositionPair>, String> {
    let Some(raw) = v else {
        return Err(format!("missing {}", key));
    };
    let arr = raw
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    if arr.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    let mut out = Vec::with_capacity(arr.len());
    let mut seen = HashSet::new();
    for (i, item) in arr.iter().enumerate() {
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{}[{}].id must be a non-empty string", key, i))?;
        let position = item
            .get("position")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| format!("{}[{}].position must be an integer", key, i))?;
        if position < 1 {
            return Err(format!("{}[{}].position must be >= 1", key, i));
        }
        if !seen.insert(id.to_string()) {
            return Err(format!("{} contains duplicate id: {}", key, id));
        }
        out.push(PositionPair {
            id: id.to_string(),
            position,
        });
    }
    Ok(out)
}

pub fn ensure_course_exists(conn: &Connection, course_id: &str) -> Result<(), &'static str> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM courses WHERE id = ? LIMIT 1",
            [course_id],
            |_r| Ok(()),
        )
        .optional()
        .map_err(|_| "db_query_failed")?;
    if exists.is_some() {
        Ok(())
    } else {
        Err("not_found")
    }
}

pub fn ensure_chapter_in_course(
    conn: &Connection,
    chapter_id: &str,
    course_id: &str,
) -> Result<(), &'static str> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM chapters WHERE id = ? AND course_id = ? LIMIT 1",
            [chapter_id, course_id],
            |_r| Ok(()),
        )
        .optional()
        .map_err(|_| "db_query_failed")?;
    if exists.is_some() {
        Ok(())
    } else {
        Err("not_found")
    }
}

pub fn lookup_failed(req: &Request, code: &str, what: &str) -> JsonValue {
    err(
        &req.id,
        code,
        if code == "not_found" {
            format!("{} not found", what)
        } else {
            format!("failed to read {}", what)
        },
        None,
    )
}
