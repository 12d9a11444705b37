mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn lessons_crud_reorder_and_scope() {
    let workspace = temp_dir("coursed-lessons");
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
            json!({ "input": { "title": "Lessons" } }),
        ),
        "courseId",
    );
    let x = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "chapter.create",
            json!({ "courseId": course_id, "title": "X" }),
        ),
        "chapterId",
    );
    let y = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "chapter.create",
            json!({ "courseId": course_id, "title": "Y" }),
        ),
        "chapterId",
    );

    let mut lessons = Vec::new();
    for (i, title) in ["L1", "L2", "L3"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("l{}", i),
            "lesson.create",
            json!({ "courseId": course_id, "chapterId": x, "title": title }),
        );
        assert_eq!(created.get("position"), Some(&json!(i as i64 + 1)));
        lessons.push(str_field(&created, "lessonId"));
    }
    let m1 = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "lesson.create",
            json!({ "courseId": course_id, "chapterId": y, "title": "M1" }),
        ),
        "lessonId",
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lesson.update",
        json!({
            "id": lessons[0],
            "courseId": course_id,
            "patch": {
                "description": "Setup",
                "video": "videos/l1.mp4",
                "thumbnail": "thumbs/l1.png"
            }
        }),
    );
    assert_eq!(updated.pointer("/lesson/video"), Some(&json!("videos/l1.mp4")));
    assert_eq!(updated.pointer("/lesson/chapterId").and_then(|v| v.as_str()), Some(x.as_str()));
    assert_eq!(
        updated.pointer("/lesson/courseId").and_then(|v| v.as_str()),
        Some(course_id.as_str())
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "lesson.updateTitle",
        json!({ "id": lessons[1], "courseId": course_id, "chapterId": x, "title": "L2 renamed" }),
    );
    let got = request_ok(&mut stdin, &mut reader, "8", "lesson.get", json!({ "id": lessons[1] }));
    assert_eq!(got.pointer("/lesson/title"), Some(&json!("L2 renamed")));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "lesson.reorder",
        json!({
            "courseId": course_id,
            "chapterId": x,
            "lessons": [
                { "id": lessons[2], "position": 1 },
                { "id": lessons[0], "position": 2 },
                { "id": lessons[1], "position": 3 }
            ]
        }),
    );
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "course.get",
        json!({ "id": course_id }),
    );
    let order: Vec<&str> = course
        .pointer("/course/chapters/0/lessons")
        .and_then(|v| v.as_array())
        .expect("lessons")
        .iter()
        .filter_map(|l| l.get("title").and_then(|t| t.as_str()))
        .collect();
    assert_eq!(order, vec!["L3", "L1", "L2 renamed"]);
    assert_eq!(
        course.pointer("/course/chapters/0/lessons/1/description"),
        Some(&json!("Setup"))
    );
    assert_eq!(
        course.pointer("/course/chapters/1/lessons/0/position"),
        Some(&json!(1))
    );

    // Lessons of another chapter never pass validation.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "lesson.reorder",
        json!({
            "courseId": course_id,
            "chapterId": x,
            "lessons": [{ "id": m1, "position": 1 }]
        }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "12",
        "lesson.updateTitle",
        json!({ "id": m1, "courseId": course_id, "chapterId": x, "title": "Moved?" }),
    );
    assert_eq!(code, "not_found");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "lesson.create",
        json!({ "courseId": "other", "chapterId": x, "title": "Nope" }),
    );
    assert_eq!(code, "not_found");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "14",
        "lesson.update",
        json!({ "id": lessons[0], "courseId": course_id, "patch": { "position": 9 } }),
    );
    assert_eq!(code, "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "lesson.delete",
        json!({ "id": lessons[2], "courseId": course_id, "chapterId": x }),
    );
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "course.get",
        json!({ "id": course_id }),
    );
    let remaining: Vec<(String, i64)> = course
        .pointer("/course/chapters/0/lessons")
        .and_then(|v| v.as_array())
        .expect("lessons")
        .iter()
        .map(|l| {
            (
                l.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                l.get("position").and_then(|p| p.as_i64()).unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        remaining,
        vec![("L1".to_string(), 1), ("L2 renamed".to_string(), 2)]
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "17",
        "lesson.get",
        json!({ "id": lessons[2] }),
    );
    assert_eq!(code, "not_found");

    // Deleting a chapter takes its lessons with it.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "chapter.delete",
        json!({ "id": y, "courseId": course_id }),
    );
    let code = request_err(&mut stdin, &mut reader, "19", "lesson.get", json!({ "id": m1 }));
    assert_eq!(code, "not_found");
}
