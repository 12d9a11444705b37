use crate::ipc::error::{err, ok};
use crate::ipc::handlers::courses::list_courses;
use crate::ipc::handlers::setup::load_catalog_settings;
use crate::ipc::helpers::{
    db_conn, like_pattern, now_ts, parse_opt_string, parse_page, required_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, types::Value, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const ENROLLMENT_ACTIVE: &str = "active";

fn handle_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let catalog = load_catalog_settings(conn);

    let status: Option<String> = match conn
        .query_row("SELECT status FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(status) = status else {
        return err(&req.id, "not_found", "course not found", None);
    };
    if catalog.enroll_requires_published && status != "published" {
        return err(
            &req.id,
            "bad_params",
            "course is not open for enrollment",
            Some(json!({ "status": status })),
        );
    }

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM enrollments WHERE course_id = ? AND user_id = ?",
            params![course_id, user_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(enrollment_id) = existing {
        return err(
            &req.id,
            "conflict",
            "already enrolled",
            Some(json!({ "enrollmentId": enrollment_id })),
        );
    }

    let enrollment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(id, course_id, user_id, status, created_at) VALUES(?, ?, ?, ?, ?)",
        params![enrollment_id, course_id, user_id, ENROLLMENT_ACTIVE, now_ts()],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }
    tracing::info!(course_id = %course_id, user_id = %user_id, "enrolled");
    ok(&req.id, json!({ "enrollmentId": enrollment_id }))
}

fn handle_list_enrolled(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let catalog = load_catalog_settings(conn);
    let page = match parse_page(req, catalog.default_page_size) {
        Ok(p) => p,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let query = match parse_opt_string(req.params.get("query")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("query {}", m), None),
    };
    match list_courses(
        conn,
        "FROM courses c JOIN enrollments e ON e.course_id = c.id
         WHERE e.user_id = ? AND e.status = 'active' AND c.title LIKE ? ESCAPE '\\'",
        vec![
            Value::Text(user_id),
            Value::Text(like_pattern(query.as_deref())),
        ],
        page,
    ) {
        Ok((courses, total)) => ok(&req.id, json!({ "courses": courses, "totalCourses": total })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "course.enroll" => Some(handle_enroll(state, req)),
        "course.listEnrolled" => Some(handle_list_enrolled(state, req)),
        _ => None,
    }
}
