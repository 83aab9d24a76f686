
use serde_json::json;
use test_support::{cell, grid_row, request_ok, row_id, spawn_sidecar, temp_dir};

/// Rows compare equal across a save/reopen modulo the session-local rowId.
fn strip_row_ids(rows: &serde_json::Value) -> serde_json::Value {
    let stripped: Vec<serde_json::Value> = rows
        .as_array()
        .expect("rows array")
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r.as_object_mut().expect("row object").remove("rowId");
            r
        })
        .collect();
    serde_json::Value::Array(stripped)
}

#[test]
fn saved_schedule_reopens_identically_including_provenance() {
    let workspace = temp_dir("jikanwari-roundtrip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.open",
        json!({ "classroomCode": "K01", "date": "2026-03-04" }),
    );
    let generation = opened.get("generation").and_then(|v| v.as_u64()).unwrap();

    let with_a = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.addRow",
        json!({ "generation": generation, "teacher": { "code": "T-A", "name": "青木" } }),
    );
    let a_row = row_id(grid_row(with_a.get("rows").unwrap(), "normal", Some("T-A")));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.addRow",
        json!({ "generation": generation, "teacher": { "code": "T-B", "name": "馬場" } }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.assign",
        json!({
            "generation": generation,
            "rowId": a_row,
            "period": 2,
            "student": {
                "studentId": "S1", "name": "佐藤", "grade": "中2",
                "seat": "A-1", "subject": "数学", "classType": "個別", "duration": 70
            }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.assign",
        json!({
            "generation": generation,
            "rowId": a_row,
            "period": 7,
            "student": { "studentId": "S2", "name": "鈴木", "grade": "小6", "subject": "国語" }
        }),
    );
    // One routed student so provenance has to survive the round trip.
    let routed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.route",
        json!({
            "generation": generation,
            "studentId": "S2",
            "fromRow": a_row,
            "fromPeriod": 7,
            "target": "transferred"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.save",
        json!({ "generation": generation }),
    );

    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.open",
        json!({ "classroomCode": "K01", "date": "2026-03-04" }),
    );
    assert_eq!(
        strip_row_ids(reopened.get("rows").unwrap()),
        strip_row_ids(routed.get("rows").unwrap())
    );
    assert_eq!(
        reopened.get("isConfirmed").and_then(|v| v.as_bool()),
        Some(false)
    );

    // Undo still works after the reload via the persisted origin teacher.
    let new_generation = reopened.get("generation").and_then(|v| v.as_u64()).unwrap();
    let transferred = grid_row(reopened.get("rows").unwrap(), "transferred", None);
    assert_eq!(
        cell(transferred, 7)[0]
            .get("originTeacher")
            .and_then(|v| v.as_str()),
        Some("T-A")
    );
    let undone = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "schedule.undoRoute",
        json!({
            "generation": new_generation,
            "studentId": "S2",
            "rowId": row_id(transferred),
            "period": 7
        }),
    );
    let rows = undone.get("rows").unwrap();
    let restored = cell(grid_row(rows, "normal", Some("T-A")), 7);
    assert_eq!(restored.len(), 1);
    assert_eq!(
        restored[0].get("status").and_then(|v| v.as_str()),
        Some("planned")
    );
}

#[test]
fn save_is_a_full_document_replace() {
    let workspace = temp_dir("jikanwari-full-replace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.open",
        json!({ "classroomCode": "K01", "date": "2026-03-04" }),
    );
    let generation = opened.get("generation").and_then(|v| v.as_u64()).unwrap();
    let with_a = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.addRow",
        json!({ "generation": generation, "teacher": { "code": "T-A", "name": "青木" } }),
    );
    let a_row = row_id(grid_row(with_a.get("rows").unwrap(), "normal", Some("T-A")));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.assign",
        json!({
            "generation": generation,
            "rowId": a_row,
            "period": 1,
            "student": { "studentId": "S1", "name": "佐藤" }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.save",
        json!({ "generation": generation }),
    );

    // Second session: remove the student and save again; the earlier cell
    // contents must not resurrect.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.open",
        json!({ "classroomCode": "K01", "date": "2026-03-04" }),
    );
    let generation = second.get("generation").and_then(|v| v.as_u64()).unwrap();
    let a_row = row_id(grid_row(second.get("rows").unwrap(), "normal", Some("T-A")));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.remove",
        json!({
            "generation": generation,
            "studentId": "S1",
            "rowId": a_row,
            "period": 1
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.save",
        json!({ "generation": generation }),
    );

    let third = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.open",
        json!({ "classroomCode": "K01", "date": "2026-03-04" }),
    );
    let a_row_json = grid_row(third.get("rows").unwrap(), "normal", Some("T-A"));
    assert!(cell(a_row_json, 1).is_empty());
}
