mod test_support;

use serde_json::{json, Value};
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar, str_field, temp_dir};

fn chapter_order(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    course_id: &str,
) -> Vec<(String, i64)> {
    let got = request_ok(stdin, reader, id, "course.get", json!({ "id": course_id }));
    got.pointer("/course/chapters")
        .and_then(|v| v.as_array())
        .expect("chapters")
        .iter()
        .map(|c: &Value| {
            (
                c.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                c.get("position").and_then(|v| v.as_i64()).unwrap_or_default(),
            )
        })
        .collect()
}

#[test]
fn chapters_append_reorder_and_renumber_on_delete() {
    let workspace = temp_dir("coursed-chapters");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "course.create",
        json!({ "input": { "title": "Structure" } }),
    );
    let course_id = str_field(&course, "courseId");

    let mut ids = Vec::new();
    for (i, title) in ["A", "B", "C"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "chapter.create",
            json!({ "courseId": course_id, "title": title }),
        );
        assert_eq!(created.get("position"), Some(&json!(i as i64 + 1)));
        ids.push(str_field(&created, "chapterId"));
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "chapter.reorder",
        json!({
            "courseId": course_id,
            "chapters": [
                { "id": ids[1], "position": 1 },
                { "id": ids[2], "position": 2 },
                { "id": ids[0], "position": 3 }
            ]
        }),
    );
    assert_eq!(
        chapter_order(&mut stdin, &mut reader, "4", &course_id),
        vec![("B".to_string(), 1), ("C".to_string(), 2), ("A".to_string(), 3)]
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "chapter.updateTitle",
        json!({ "id": ids[2], "courseId": course_id, "title": "C renamed" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "chapter.delete",
        json!({ "id": ids[1], "courseId": course_id }),
    );
    assert_eq!(
        chapter_order(&mut stdin, &mut reader, "7", &course_id),
        vec![("C renamed".to_string(), 1), ("A".to_string(), 2)]
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "chapter.create",
        json!({ "courseId": course_id, "title": "D" }),
    );
    assert_eq!(created.get("position"), Some(&json!(3)));
}

#[test]
fn chapter_reorder_validates_before_writing() {
    let workspace = temp_dir("coursed-chapters-bad");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "course.create",
            json!({ "input": { "title": "Mine" } }),
        ),
        "courseId",
    );
    let other_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "course.create",
            json!({ "input": { "title": "Theirs" } }),
        ),
        "courseId",
    );
    let a = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "chapter.create",
            json!({ "courseId": course_id, "title": "A" }),
        ),
        "chapterId",
    );
    let b = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "chapter.create",
            json!({ "courseId": course_id, "title": "B" }),
        ),
        "chapterId",
    );
    let foreign = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "6",
            "chapter.create",
            json!({ "courseId": other_id, "title": "X" }),
        ),
        "chapterId",
    );

    let bad_payloads = [
        json!([]),
        json!("nope"),
        json!([{ "id": a, "position": 0 }]),
        json!([{ "id": a, "position": 1 }, { "id": a, "position": 2 }]),
        json!([{ "id": "", "position": 1 }]),
        json!([{ "id": a, "position": "2" }]),
        json!([{ "id": b, "position": 1 }, { "id": foreign, "position": 2 }]),
    ];
    for (i, chapters) in bad_payloads.into_iter().enumerate() {
        let code = request_err(
            &mut stdin,
            &mut reader,
            &format!("bad{}", i),
            "chapter.reorder",
            json!({ "courseId": course_id, "chapters": chapters }),
        );
        assert_eq!(code, "bad_params");
    }
    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "chapter.reorder",
        json!({ "courseId": "missing", "chapters": [{ "id": a, "position": 1 }] }),
    );
    assert_eq!(code, "not_found");

    let got = request_ok(&mut stdin, &mut reader, "8", "course.get", json!({ "id": course_id }));
    assert_eq!(got.pointer("/course/chapters/0/id").and_then(|v| v.as_str()), Some(a.as_str()));
    assert_eq!(got.pointer("/course/chapters/0/position"), Some(&json!(1)));
    assert_eq!(got.pointer("/course/chapters/1/position"), Some(&json!(2)));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "chapter.delete",
        json!({ "id": foreign, "courseId": course_id }),
    );
    assert_eq!(code, "not_found");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "chapter.create",
        json!({ "courseId": course_id, "title": "   " }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn overlapping_reorders_last_write_wins() {
    let workspace = temp_dir("coursed-chapters-lww");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "course.create",
            json!({ "input": { "title": "Race" } }),
        ),
        "courseId",
    );
    let mut ids = Vec::new();
    for (i, title) in ["A", "B"].iter().enumerate() {
        ids.push(str_field(
            &request_ok(
                &mut stdin,
                &mut reader,
                &format!("c{}", i),
                "chapter.create",
                json!({ "courseId": course_id, "title": title }),
            ),
            "chapterId",
        ));
    }

    let first = json!([{ "id": ids[1], "position": 1 }, { "id": ids[0], "position": 2 }]);
    let second = json!([{ "id": ids[0], "position": 1 }, { "id": ids[1], "position": 2 }]);
    for (i, chapters) in [first, second].into_iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{}", i),
            "chapter.reorder",
            json!({ "courseId": course_id, "chapters": chapters }),
        );
    }
    assert_eq!(
        chapter_order(&mut stdin, &mut reader, "3", &course_id),
        vec![("A".to_string(), 1), ("B".to_string(), 2)]
    );
}
