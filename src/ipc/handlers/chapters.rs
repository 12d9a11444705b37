use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_course_settings;
use crate::ipc::helpers::{
    db_conn, ensure_chapter_in_course, ensure_course_exists, lookup_failed, now_ts,
    parse_position_pairs, required_str, validate_title,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

fn next_position(conn: &Connection, course_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(position), 0) + 1 FROM chapters WHERE course_id = ?",
        [course_id],
        |r| r.get(0),
    )
}

fn chapter_ids(conn: &Connection, course_id: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT id FROM chapters WHERE course_id = ?")?;
    let ids = stmt
        .query_map([course_id], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn handle_chapter_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match validate_title(req.params.get("title"), "title", &settings) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(code) = ensure_course_exists(conn, &course_id) {
        return lookup_failed(req, code, "course");
    }

    let position = match next_position(conn, &course_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let chapter_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO chapters(id, course_id, title, position, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![chapter_id, course_id, title, position, ts, ts],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "chapters" })),
        );
    }
    tracing::info!(course_id = %course_id, chapter_id = %chapter_id, position, "chapter created");
    ok(&req.id, json!({ "chapterId": chapter_id, "position": position }))
}

fn handle_chapter_update_title(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let chapter_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match validate_title(req.params.get("title"), "title", &settings) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    match conn.execute(
        "UPDATE chapters SET title = ?, updated_at = ? WHERE id = ? AND course_id = ?",
        params![title, now_ts(), chapter_id, course_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "chapter not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_chapter_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(code) = ensure_chapter_in_course(conn, &chapter_id, &course_id) {
        return lookup_failed(req, code, "chapter");
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM lessons WHERE chapter_id = ?", [&chapter_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM chapters WHERE id = ?", [&chapter_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "chapters" })),
        );
    }
    if let Err(e) = db::renumber_chapters(&tx, &course_id, &now_ts()) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(course_id = %course_id, chapter_id = %chapter_id, "chapter deleted");
    ok(&req.id, json!({ "ok": true }))
}

fn handle_chapter_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let pairs = match parse_position_pairs(req.params.get("chapters"), "chapters") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(code) = ensure_course_exists(conn, &course_id) {
        return lookup_failed(req, code, "course");
    }

    let existing = match chapter_ids(conn, &course_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    for pair in &pairs {
        if !existing.contains(&pair.id) {
            return err(
                &req.id,
                "bad_params",
                format!("chapter id not found for course: {}", pair.id),
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
            "UPDATE chapters SET position = ?, updated_at = ? WHERE course_id = ? AND id = ?",
            params![pair.position, ts, course_id, pair.id],
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(course_id = %course_id, count = pairs.len(), "chapters reordered");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "chapter.create" => Some(handle_chapter_create(state, req)),
        "chapter.updateTitle" => Some(handle_chapter_update_title(state, req)),
        "chapter.delete" => Some(handle_chapter_delete(state, req)),
        "chapter.reorder" => Some(handle_chapter_reorder(state, req)),
        _ => None,
    }
}
