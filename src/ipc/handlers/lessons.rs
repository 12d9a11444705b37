use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_course_settings;
use crate::ipc::helpers::{
    db_conn, ensure_chapter_in_course, lookup_failed, now_ts, parse_opt_string,
    parse_position_pairs, required_str, validate_title,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use uuid::Uuid;

const LESSON_COLUMNS: &str = "l.id, l.chapter_id, ch.course_id, l.title, l.description,
     l.thumbnail_key, l.video_key, l.position, l.created_at, l.updated_at";

fn lesson_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "chapterId": row.get::<_, String>(1)?,
        "courseId": row.get::<_, String>(2)?,
        "title": row.get::<_, String>(3)?,
        "description": row.get::<_, Option<String>>(4)?,
        "thumbnail": row.get::<_, Option<String>>(5)?,
        "video": row.get::<_, Option<String>>(6)?,
        "position": row.get::<_, i64>(7)?,
        "createdAt": row.get::<_, String>(8)?,
        "updatedAt": row.get::<_, String>(9)?,
    }))
}

fn load_lesson(conn: &Connection, lesson_id: &str) -> rusqlite::Result<Option<JsonValue>> {
    let sql = format!(
        "SELECT {} FROM lessons l JOIN chapters ch ON ch.id = l.chapter_id WHERE l.id = ?",
        LESSON_COLUMNS
    );
    conn.query_row(&sql, [lesson_id], lesson_to_json).optional()
}

fn next_position(conn: &Connection, chapter_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(position), 0) + 1 FROM lessons WHERE chapter_id = ?",
        [chapter_id],
        |r| r.get(0),
    )
}

fn lesson_ids(conn: &Connection, chapter_id: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT id FROM lessons WHERE chapter_id = ?")?;
    let ids = stmt
        .query_map([chapter_id], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

/// Lesson ids are only meaningful together with the chapter and course that own them.
fn lesson_in_scope(
    conn: &Connection,
    lesson_id: &str,
    chapter_id: &str,
    course_id: &str,
) -> Result<(), &'static str> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM lessons l JOIN chapters ch ON ch.id = l.chapter_id
             WHERE l.id = ? AND l.chapter_id = ? AND ch.course_id = ? LIMIT 1",
            [lesson_id, chapter_id, course_id],
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

fn handle_lesson_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match validate_title(req.params.get("title"), "title", &settings) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(code) = ensure_chapter_in_course(conn, &chapter_id, &course_id) {
        return lookup_failed(req, code, "chapter");
    }

    let position = match next_position(conn, &chapter_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let lesson_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO lessons(id, chapter_id, title, position, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![lesson_id, chapter_id, title, position, ts, ts],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }
    tracing::info!(chapter_id = %chapter_id, lesson_id = %lesson_id, position, "lesson created");
    ok(&req.id, json!({ "lessonId": lesson_id, "position": position }))
}

fn handle_lesson_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_lesson(conn, &lesson_id) {
        Ok(Some(lesson)) => ok(&req.id, json!({ "lesson": lesson })),
        Ok(None) => err(&req.id, "not_found", "lesson not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lesson_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let lesson_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let belongs = match load_lesson(conn, &lesson_id) {
        Ok(Some(lesson)) => lesson["courseId"].as_str() == Some(course_id.as_str()),
        Ok(None) => false,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !belongs {
        return err(&req.id, "not_found", "lesson not found", None);
    }

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (key, raw) in patch {
        let column = match key.as_str() {
            "title" => {
                match validate_title(Some(raw), "patch.title", &settings) {
                    Ok(v) => {
                        fields.push("title = ?");
                        values.push(Value::Text(v));
                    }
                    Err(m) => return err(&req.id, "bad_params", m, None),
                }
                continue;
            }
            "description" => "description = ?",
            "thumbnail" => "thumbnail_key = ?",
            "video" => "video_key = ?",
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", key), None),
        };
        match parse_opt_string(Some(raw)) {
            Ok(v) => {
                fields.push(column);
                values.push(v.map(Value::Text).unwrap_or(Value::Null));
            }
            Err(m) => return err(&req.id, "bad_params", format!("patch.{} {}", key, m), None),
        }
    }
    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }

    fields.push("updated_at = ?");
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(lesson_id.clone()));
    let sql = format!("UPDATE lessons SET {} WHERE id = ?", fields.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(lesson_id = %lesson_id, "lesson updated");
    match load_lesson(conn, &lesson_id) {
        Ok(Some(lesson)) => ok(&req.id, json!({ "lesson": lesson })),
        Ok(None) => err(&req.id, "not_found", "lesson not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lesson_update_title(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let lesson_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match validate_title(req.params.get("title"), "title", &settings) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(code) = lesson_in_scope(conn, &lesson_id, &chapter_id, &course_id) {
        return lookup_failed(req, code, "lesson");
    }
    match conn.execute(
        "UPDATE lessons SET title = ?, updated_at = ? WHERE id = ?",
        params![title, now_ts(), lesson_id],
    ) {
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_lesson_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(code) = lesson_in_scope(conn, &lesson_id, &chapter_id, &course_id) {
        return lookup_failed(req, code, "lesson");
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM lessons WHERE id = ?", [&lesson_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }
    if let Err(e) = db::renumber_lessons(&tx, &chapter_id, &now_ts()) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(chapter_id = %chapter_id, lesson_id = %lesson_id, "lesson deleted");
    ok(&req.id, json!({ "ok": true }))
}

fn handle_lesson_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let pairs = match parse_position_pairs(req.params.get("lessons"), "lessons") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(code) = ensure_chapter_in_course(conn, &chapter_id, &course_id) {
        return lookup_failed(req, code, "chapter");
    }

    let existing = match lesson_ids(conn, &chapter_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    for pair in &pairs {
        if !existing.contains(&pair.id) {
            return err(
                &req.id,
                "bad_params",
                format!("lesson id not found for chapter: {}", pair.id),
                None,
            );
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let ts = now_ts();
    for pair in &pairs {
        if let Err(e) = tx.execute(
            "UPDATE lessons SET position = ?, updated_at = ? WHERE chapter_id = ? AND id = ?",
            params![pair.position, ts, chapter_id, pair.id],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(
        course_id = %course_id,
        chapter_id = %chapter_id,
        count = pairs.len(),
        "lessons reordered"
    );
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lesson.create" => Some(handle_lesson_create(state, req)),
        "lesson.get" => Some(handle_lesson_get(state, req)),
        "lesson.update" => Some(handle_lesson_update(state, req)),
        "lesson.updateTitle" => Some(handle_lesson_update_title(state, req)),
        "lesson.delete" => Some(handle_lesson_delete(state, req)),
        "lesson.reorder" => Some(handle_lesson_reorder(state, req)),
        _ => None,
    }
}
