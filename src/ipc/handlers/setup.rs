use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

pub const LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];
pub const STATUSES: [&str; 3] = ["draft", "published", "archived"];

#[derive(Clone, Copy)]
enum SetupSection {
    Courses,
    Catalog,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "courses" => Some(Self::Courses),
            "catalog" => Some(Self::Catalog),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Courses => "setup.courses",
            Self::Catalog => "setup.catalog",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Courses => json!({
            "maxTitleLength": 100,
            "defaultLevel": "beginner",
            "defaultStatus": "draft"
        }),
        SetupSection::Catalog => json!({
            "defaultPageSize": 6,
            "enrollRequiresPublished": true
        }),
    }
}

/// Authoring limits and defaults, resolved from `setup.courses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSettings {
    pub max_title_length: usize,
    pub default_level: String,
    pub default_status: String,
}

impl Default for CourseSettings {
    fn default() -> Self {
        Self {
            max_title_length: 100,
            default_level: "beginner".to_string(),
            default_status: "draft".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub default_page_size: i64,
    pub enroll_requires_published: bool,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            default_page_size: 6,
            enroll_requires_published: true,
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_one_of(v: &Value, key: &str, allowed: &[&str]) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim()
        .to_ascii_lowercase();
    if !allowed.contains(&s.as_str()) {
        return Err(format!("{} must be one of: {}", key, allowed.join(", ")));
    }
    Ok(s)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Courses => match k.as_str() {
                "maxTitleLength" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 10, 200)?));
                }
                "defaultLevel" => {
                    obj.insert(k.clone(), Value::String(parse_one_of(v, k, &LEVELS)?));
                }
                "defaultStatus" => {
                    obj.insert(k.clone(), Value::String(parse_one_of(v, k, &STATUSES)?));
                }
                _ => return Err(format!("unknown courses field: {}", k)),
            },
            SetupSection::Catalog => match k.as_str() {
                "defaultPageSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 50)?));
                }
                "enrollRequiresPublished" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown catalog field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            } else {
                tracing::warn!(key = section.key(), "ignoring malformed stored settings");
            }
        }
    }
    Ok(current)
}

pub fn load_course_settings(conn: &rusqlite::Connection) -> CourseSettings {
    let defaults = CourseSettings::default();
    let Ok(v) = load_section(conn, SetupSection::Courses) else {
        return defaults;
    };
    CourseSettings {
        max_title_length: v
            .get("maxTitleLength")
            .and_then(|x| x.as_u64())
            .map(|x| x as usize)
            .unwrap_or(defaults.max_title_length),
        default_level: v
            .get("defaultLevel")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.default_level),
        default_status: v
            .get("defaultStatus")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.default_status),
    }
}

pub fn load_catalog_settings(conn: &rusqlite::Connection) -> CatalogSettings {
    let defaults = CatalogSettings::default();
    let Ok(v) = load_section(conn, SetupSection::Catalog) else {
        return defaults;
    };
    CatalogSettings {
        default_page_size: v
            .get("defaultPageSize")
            .and_then(|x| x.as_i64())
            .unwrap_or(defaults.default_page_size),
        enroll_requires_published: v
            .get("enrollRequiresPublished")
            .and_then(|x| x.as_bool())
            .unwrap_or(defaults.enroll_requires_published),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let courses = match load_section(conn, SetupSection::Courses) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let catalog = match load_section(conn, SetupSection::Catalog) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "courses": courses, "catalog": catalog }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.key(), "settings updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
