
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn roster_upsert_list_and_inactive_filtering() {
    let workspace = temp_dir("jikanwari-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.teachers.upsert",
        json!({ "code": "T-B", "name": "馬場", "sortOrder": 2 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.teachers.upsert",
        json!({ "code": "T-A", "name": "青木", "sortOrder": 1 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "roster.teachers.upsert",
        json!({ "code": "T-C", "name": "千田", "sortOrder": 3, "active": false }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "5", "roster.teachers.list", json!({}));
    let teachers = listed.get("teachers").and_then(|v| v.as_array()).unwrap();
    assert_eq!(teachers.len(), 2);
    assert_eq!(teachers[0].get("code").and_then(|v| v.as_str()), Some("T-A"));
    assert_eq!(teachers[1].get("code").and_then(|v| v.as_str()), Some("T-B"));

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "roster.teachers.list",
        json!({ "includeInactive": true }),
    );
    assert_eq!(
        all.get("teachers").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(3)
    );

    // Re-upserting the same code updates in place.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "roster.teachers.upsert",
        json!({ "code": "T-A", "name": "青木 改", "sortOrder": 1 }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "8", "roster.teachers.list", json!({}));
    let teachers = listed.get("teachers").and_then(|v| v.as_array()).unwrap();
    assert_eq!(teachers.len(), 2);
    assert_eq!(
        teachers[0].get("name").and_then(|v| v.as_str()),
        Some("青木 改")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "roster.students.upsert",
        json!({ "id": "S1", "name": "佐藤", "grade": "中2", "sortOrder": 1 }),
    );
    let students = request_ok(&mut stdin, &mut reader, "10", "roster.students.list", json!({}));
    let list = students.get("students").and_then(|v| v.as_array()).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].get("grade").and_then(|v| v.as_str()), Some("中2"));
}
