mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_and_updates_persist() {
    let workspace = temp_dir("coursed-setup");
    {
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );

        let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
        assert_eq!(setup.pointer("/courses/maxTitleLength"), Some(&json!(100)));
        assert_eq!(setup.pointer("/courses/defaultLevel"), Some(&json!("beginner")));
        assert_eq!(setup.pointer("/courses/defaultStatus"), Some(&json!("draft")));
        assert_eq!(setup.pointer("/catalog/defaultPageSize"), Some(&json!(6)));
        assert_eq!(setup.pointer("/catalog/enrollRequiresPublished"), Some(&json!(true)));

        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "setup.update",
            json!({
                "section": "courses",
                "patch": { "maxTitleLength": 20, "defaultStatus": "Published" }
            }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "setup.update",
            json!({ "section": "catalog", "patch": { "defaultPageSize": 2 } }),
        );
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));
    assert_eq!(setup.pointer("/courses/maxTitleLength"), Some(&json!(20)));
    assert_eq!(setup.pointer("/courses/defaultStatus"), Some(&json!("published")));
    assert_eq!(setup.pointer("/catalog/defaultPageSize"), Some(&json!(2)));

    // Settings are applied by the handlers.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "course.create",
        json!({ "input": { "title": "A title that is clearly longer than twenty" } }),
    );
    assert_eq!(code, "bad_params");
    for (i, title) in ["One", "Two", "Three"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "course.create",
            json!({ "input": { "title": title } }),
        );
    }
    let listed = request_ok(&mut stdin, &mut reader, "8", "course.listPublic", json!({}));
    assert_eq!(listed.get("totalCourses"), Some(&json!(3)));
    assert_eq!(listed.get("courses").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));
}

#[test]
fn setup_update_rejects_bad_input() {
    let workspace = temp_dir("coursed-setup-bad");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let cases = [
        json!({ "section": "billing", "patch": {} }),
        json!({ "section": "courses" }),
        json!({ "section": "courses", "patch": { "maxTitleLength": 5 } }),
        json!({ "section": "courses", "patch": { "defaultLevel": "expert" } }),
        json!({ "section": "courses", "patch": { "colour": "red" } }),
        json!({ "section": "catalog", "patch": { "defaultPageSize": 0 } }),
        json!({ "section": "catalog", "patch": { "enrollRequiresPublished": "yes" } }),
    ];
    for (i, params) in cases.into_iter().enumerate() {
        let code = request_err(&mut stdin, &mut reader, &format!("b{}", i), "setup.update", params);
        assert_eq!(code, "bad_params");
    }

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup.pointer("/courses/maxTitleLength"), Some(&json!(100)));
}
