use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{load_catalog_settings, load_course_settings, LEVELS, STATUSES};
use crate::ipc::helpers::{
    db_conn, ensure_course_exists, like_pattern, lookup_failed, now_ts, parse_opt_i64,
    parse_opt_string, parse_page, required_str, validate_title, Page,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

const COURSE_COLUMNS: &str = "c.id, c.title, c.slug, c.small_description, c.description,
     c.category, c.level, c.duration_hours, c.price_cents, c.status, c.file_key,
     c.created_at, c.updated_at,
     (SELECT COUNT(*) FROM chapters ch WHERE ch.course_id = c.id) AS chapter_count";

fn course_to_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<JsonValue> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "title": row.get::<_, String>(1)?,
        "slug": row.get::<_, String>(2)?,
        "smallDescription": row.get::<_, String>(3)?,
        "description": row.get::<_, String>(4)?,
        "category": row.get::<_, Option<String>>(5)?,
        "level": row.get::<_, String>(6)?,
        "durationHours": row.get::<_, i64>(7)?,
        "priceCents": row.get::<_, i64>(8)?,
        "status": row.get::<_, String>(9)?,
        "fileKey": row.get::<_, Option<String>>(10)?,
        "createdAt": row.get::<_, String>(11)?,
        "updatedAt": row.get::<_, String>(12)?,
        "chapterCount": row.get::<_, i64>(13)?,
    }))
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Titles without ASCII letters or digits get a generated `course-xxxxxxxx` slug.
fn slug_from_title(title: &str) -> String {
    let slug = slugify(title);
    if !slug.is_empty() {
        return slug;
    }
    let id = Uuid::new_v4().simple().to_string();
    format!("course-{}", &id[..8])
}

fn slug_taken(conn: &Connection, slug: &str, except_id: Option<&str>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM courses WHERE slug = ? AND id != COALESCE(?, '') LIMIT 1",
        params![slug, except_id],
        |_r| Ok(()),
    )
    .optional()
    .map(|v| v.is_some())
}

fn parse_choice(
    v: Option<&JsonValue>,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, String> {
    match parse_opt_string(v).map_err(|m| format!("{} {}", key, m))? {
        None => Ok(None),
        Some(s) => {
            let s = s.to_ascii_lowercase();
            if allowed.contains(&s.as_str()) {
                Ok(Some(s))
            } else {
                Err(format!("{} must be one of: {}", key, allowed.join(", ")))
            }
        }
    }
}

fn parse_non_negative(v: Option<&JsonValue>, key: &str) -> Result<Option<i64>, String> {
    match parse_opt_i64(v).map_err(|m| format!("{} {}", key, m))? {
        Some(n) if n < 0 => Err(format!("{} must be >= 0", key)),
        other => Ok(other),
    }
}

/// Paged course listing shared by the admin, public and enrolled views.
pub(crate) fn list_courses(
    conn: &Connection,
    from_where: &str,
    values: Vec<Value>,
    page: Page,
) -> rusqlite::Result<(Vec<JsonValue>, i64)> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {}", from_where),
        params_from_iter(values.iter()),
        |r| r.get(0),
    )?;
    let sql = format!(
        "SELECT {} {} ORDER BY c.created_at DESC, c.id LIMIT ? OFFSET ?",
        COURSE_COLUMNS, from_where
    );
    let mut paged = values;
    paged.push(Value::Integer(page.page_size));
    paged.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&sql)?;
    let courses = stmt
        .query_map(params_from_iter(paged), course_to_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((courses, total))
}

fn load_chapters_with_lessons(
    conn: &Connection,
    course_id: &str,
) -> rusqlite::Result<Vec<JsonValue>> {
    let mut chapter_stmt = conn.prepare(
        "SELECT id, title, position FROM chapters WHERE course_id = ? ORDER BY position, id",
    )?;
    let chapters = chapter_stmt
        .query_map([course_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lesson_stmt = conn.prepare(
        "SELECT id, title, description, thumbnail_key, video_key, position
         FROM lessons WHERE chapter_id = ? ORDER BY position, id",
    )?;
    let mut out = Vec::with_capacity(chapters.len());
    for (id, title, position) in chapters {
        let lessons = lesson_stmt
            .query_map([&id], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "description": r.get::<_, Option<String>>(2)?,
                    "thumbnail": r.get::<_, Option<String>>(3)?,
                    "video": r.get::<_, Option<String>>(4)?,
                    "position": r.get::<_, i64>(5)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push(json!({
            "id": id,
            "title": title,
            "position": position,
            "lessons": lessons,
        }));
    }
    Ok(out)
}

fn course_with_structure(
    conn: &Connection,
    where_sql: &str,
    key: &str,
) -> rusqlite::Result<Option<JsonValue>> {
    let sql = format!("SELECT {} FROM courses c WHERE {}", COURSE_COLUMNS, where_sql);
    let Some(mut course) = conn.query_row(&sql, [key], course_to_json).optional()? else {
        return Ok(None);
    };
    let course_id = course["id"].as_str().unwrap_or_default().to_string();
    course["chapters"] = JsonValue::Array(load_chapters_with_lessons(conn, &course_id)?);
    Ok(Some(course))
}

fn handle_course_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };
    let title = match validate_title(input.get("title"), "input.title", &settings) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let slug = match parse_opt_string(input.get("slug")) {
        Ok(Some(s)) => slugify(&s),
        Ok(None) => slug_from_title(&title),
        Err(m) => return err(&req.id, "bad_params", format!("input.slug {}", m), None),
    };
    if slug.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "input.slug must contain letters or digits",
            None,
        );
    }
    let small_description = match parse_opt_string(input.get("smallDescription")) {
        Ok(v) => v.unwrap_or_default(),
        Err(m) => return err(&req.id, "bad_params", format!("input.smallDescription {}", m), None),
    };
    let description = match parse_opt_string(input.get("description")) {
        Ok(v) => v.unwrap_or_default(),
        Err(m) => return err(&req.id, "bad_params", format!("input.description {}", m), None),
    };
    let category = match parse_opt_string(input.get("category")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("input.category {}", m), None),
    };
    let file_key = match parse_opt_string(input.get("fileKey")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("input.fileKey {}", m), None),
    };
    let level = match parse_choice(input.get("level"), "input.level", &LEVELS) {
        Ok(v) => v.unwrap_or(settings.default_level),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let status = match parse_choice(input.get("status"), "input.status", &STATUSES) {
        Ok(v) => v.unwrap_or(settings.default_status),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let duration_hours = match parse_non_negative(
        input.get("durationHours"),
        "input.durationHours",
    ) {
        Ok(v) => v.unwrap_or(0),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let price_cents = match parse_non_negative(input.get("priceCents"), "input.priceCents") {
        Ok(v) => v.unwrap_or(0),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match slug_taken(conn, &slug, None) {
        Ok(true) => {
            return err(
                &req.id,
                "conflict",
                format!("slug already in use: {}", slug),
                Some(json!({ "slug": slug })),
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let course_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(
            id, title, slug, small_description, description, category, level,
            duration_hours, price_cents, status, file_key, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            course_id,
            title,
            slug,
            small_description,
            description,
            category,
            level,
            duration_hours,
            price_cents,
            status,
            file_key,
            ts,
            ts
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }
    tracing::info!(course_id = %course_id, %slug, "course created");
    ok(&req.id, json!({ "courseId": course_id, "slug": slug }))
}

fn handle_course_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
        "FROM courses c WHERE c.title LIKE ? ESCAPE '\\'",
        vec![Value::Text(like_pattern(query.as_deref()))],
        page,
    ) {
        Ok((courses, total)) => ok(&req.id, json!({ "courses": courses, "totalCourses": total })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_list_public(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
    let filter = match parse_opt_string(req.params.get("filter")) {
        Ok(v) => v.unwrap_or_else(|| "all".to_string()),
        Err(m) => return err(&req.id, "bad_params", format!("filter {}", m), None),
    };
    let user_id = match parse_opt_string(req.params.get("userId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("userId {}", m), None),
    };

    let mut from_where =
        String::from("FROM courses c WHERE c.status = 'published' AND c.title LIKE ? ESCAPE '\\'");
    let mut values = vec![Value::Text(like_pattern(query.as_deref()))];
    match filter.as_str() {
        "all" => {}
        "unregistered" => {
            let Some(user_id) = user_id else {
                return err(
                    &req.id,
                    "bad_params",
                    "filter unregistered requires userId",
                    None,
                );
            };
            from_where.push_str(
                " AND NOT EXISTS
                 (SELECT 1 FROM enrollments e WHERE e.course_id = c.id AND e.user_id = ?)",
            );
            values.push(Value::Text(user_id));
        }
        _ => {
            return err(
                &req.id,
                "bad_params",
                "filter must be one of: all, unregistered",
                None,
            )
        }
    }

    match list_courses(conn, &from_where, values, page) {
        Ok((courses, total)) => ok(&req.id, json!({ "courses": courses, "totalCourses": total })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match course_with_structure(conn, "c.id = ?", &id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_get_public(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slug = match required_str(req, "slug") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match course_with_structure(conn, "c.slug = ? AND c.status = 'published'", &slug) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_get_slug(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn
        .query_row("SELECT slug FROM courses WHERE id = ?", [&id], |r| {
            r.get::<_, String>(0)
        })
        .optional()
    {
        Ok(Some(slug)) => ok(&req.id, json!({ "slug": slug })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let settings = load_course_settings(conn);
    let course_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    if let Err(code) = ensure_course_exists(conn, &course_id) {
        return lookup_failed(req, code, "course");
    }

    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (key, raw) in patch {
        match key.as_str() {
            "title" => match validate_title(Some(raw), "patch.title", &settings) {
                Ok(v) => {
                    fields.push("title = ?");
                    values.push(Value::Text(v));
                }
                Err(m) => return err(&req.id, "bad_params", m, None),
            },
            "slug" => {
                let slug = match parse_opt_string(Some(raw)) {
                    Ok(Some(s)) => slugify(&s),
                    Ok(None) => String::new(),
                    Err(m) => return err(&req.id, "bad_params", format!("patch.slug {}", m), None),
                };
                if slug.is_empty() {
                    return err(
                        &req.id,
                        "bad_params",
                        "patch.slug must contain letters or digits",
                        None,
                    );
                }
                match slug_taken(conn, &slug, Some(&course_id)) {
                    Ok(true) => {
                        return err(
                            &req.id,
                            "conflict",
                            format!("slug already in use: {}", slug),
                            Some(json!({ "slug": slug })),
                        )
                    }
                    Ok(false) => {}
                    Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
                }
                fields.push("slug = ?");
                values.push(Value::Text(slug));
            }
            "smallDescription" | "description" => match parse_opt_string(Some(raw)) {
                Ok(v) => {
                    fields.push(if key == "description" {
                        "description = ?"
                    } else {
                        "small_description = ?"
                    });
                    values.push(Value::Text(v.unwrap_or_default()));
                }
                Err(m) => return err(&req.id, "bad_params", format!("patch.{} {}", key, m), None),
            },
            "category" | "fileKey" => match parse_opt_string(Some(raw)) {
                Ok(v) => {
                    fields.push(if key == "category" {
                        "category = ?"
                    } else {
                        "file_key = ?"
                    });
                    values.push(v.map(Value::Text).unwrap_or(Value::Null));
                }
                Err(m) => return err(&req.id, "bad_params", format!("patch.{} {}", key, m), None),
            },
            "level" => match parse_choice(Some(raw), "patch.level", &LEVELS) {
                Ok(Some(v)) => {
                    fields.push("level = ?");
                    values.push(Value::Text(v));
                }
                Ok(None) => {
                    return err(&req.id, "bad_params", "patch.level must not be empty", None)
                }
                Err(m) => return err(&req.id, "bad_params", m, None),
            },
            "status" => match parse_choice(Some(raw), "patch.status", &STATUSES) {
                Ok(Some(v)) => {
                    fields.push("status = ?");
                    values.push(Value::Text(v));
                }
                Ok(None) => {
                    return err(&req.id, "bad_params", "patch.status must not be empty", None)
                }
                Err(m) => return err(&req.id, "bad_params", m, None),
            },
            "durationHours" | "priceCents" => {
                match parse_non_negative(Some(raw), &format!("patch.{}", key)) {
                    Ok(Some(n)) => {
                        fields.push(if key == "durationHours" {
                            "duration_hours = ?"
                        } else {
                            "price_cents = ?"
                        });
                        values.push(Value::Integer(n));
                    }
                    Ok(None) => {
                        return err(
                            &req.id,
                            "bad_params",
                            format!("patch.{} must not be null", key),
                            None,
                        )
                    }
                    Err(m) => return err(&req.id, "bad_params", m, None),
                }
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", key), None),
        }
    }
    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }

    fields.push("updated_at = ?");
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(course_id.clone()));
    let sql = format!("UPDATE courses SET {} WHERE id = ?", fields.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(course_id = %course_id, "course updated");
    ok(&req.id, json!({ "ok": true }))
}

fn handle_course_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(code) = ensure_course_exists(conn, &course_id) {
        return lookup_failed(req, code, "course");
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order; the schema has no ON DELETE CASCADE.
    let steps: [(&str, &str); 4] = [
        ("enrollments", "DELETE FROM enrollments WHERE course_id = ?"),
        (
            "lessons",
            "DELETE FROM lessons WHERE chapter_id IN (SELECT id FROM chapters WHERE course_id = ?)",
        ),
        ("chapters", "DELETE FROM chapters WHERE course_id = ?"),
        ("courses", "DELETE FROM courses WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&course_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(course_id = %course_id, "course deleted");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "course.create" => Some(handle_course_create(state, req)),
        "course.list" => Some(handle_course_list(state, req)),
        "course.listPublic" => Some(handle_course_list_public(state, req)),
        "course.get" => Some(handle_course_get(state, req)),
        "course.getPublic" => Some(handle_course_get_public(state, req)),
        "course.getSlug" => Some(handle_course_get_slug(state, req)),
        "course.update" => Some(handle_course_update(state, req)),
        "course.delete" => Some(handle_course_delete(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{slug_from_title, slugify};

    #[test]
    fn slug_from_title_falls_back_to_generated() {
        assert_eq!(slug_from_title("Intro to Rust"), "intro-to-rust");
        let generated = slug_from_title("日本語入門");
        assert!(generated.starts_with("course-"), "{}", generated);
        assert_eq!(generated.len(), "course-".len() + 8);
        assert_ne!(generated, slug_from_title("日本語入門"));
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Intro to Rust!"), "intro-to-rust");
        assert_eq!(slugify("  --Async   & Await-- "), "async-await");
        assert_eq!(slugify("C++ & Rust"), "c-rust");
        assert_eq!(slugify("!!!"), "");
    }
}
