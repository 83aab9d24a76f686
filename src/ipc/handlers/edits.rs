use crate::conflict::{conflicts_to_json, find_conflicts};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, OpenSchedule, Request};
use crate::model::{self, AssignmentStatus, Row, RowKind, StudentAssignment, TeacherRef};
use crate::reassign::{self, AssignmentPatch, ReassignError};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ReassignError> for HandlerErr {
    fn from(e: ReassignError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.message(),
            details: None,
        }
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_period(params: &serde_json::Value, key: &str) -> Result<u8, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|p| p as u8)
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn require_open(state: &mut AppState) -> Result<&mut OpenSchedule, HandlerErr> {
    state.open.as_mut().ok_or_else(|| HandlerErr {
        code: "no_open_schedule",
        message: "open a schedule first".to_string(),
        details: None,
    })
}

fn check_generation(open: &OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let quoted = params
        .get("generation")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing generation".to_string(),
            details: None,
        })?;
    if quoted != open.generation {
        return Err(HandlerErr {
            code: "stale_generation",
            message: "the schedule was reopened since this grid was produced".to_string(),
            details: Some(json!({ "current": open.generation })),
        });
    }
    Ok(())
}

/// Every edit responds with the refreshed grid; observers consume this
/// output instead of a broadcast signal.
fn grid_result(open: &OpenSchedule) -> serde_json::Value {
    json!({
        "generation": open.generation,
        "isConfirmed": open.schedule.is_confirmed,
        "rows": model::rows_to_json(&open.schedule.rows),
        "conflicts": conflicts_to_json(&find_conflicts(&open.schedule.rows)),
    })
}

fn parse_teacher(params: &serde_json::Value) -> Result<Option<TeacherRef>, HandlerErr> {
    match params.get("teacher") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Object(t)) => {
            let code = t
                .get("code")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerErr {
                    code: "bad_params",
                    message: "teacher requires code".to_string(),
                    details: None,
                })?;
            let name = t.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(Some(TeacherRef {
                code: code.to_string(),
                name: name.to_string(),
            }))
        }
        Some(_) => Err(HandlerErr {
            code: "bad_params",
            message: "teacher must be an object or null".to_string(),
            details: None,
        }),
    }
}

fn edit_move(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let from_row = get_required_str(params, "fromRow")?;
    let from_period = get_period(params, "fromPeriod")?;
    let to_row = get_required_str(params, "toRow")?;
    let to_period = get_period(params, "toPeriod")?;
    open.schedule.rows = reassign::move_assignment(
        &open.schedule.rows,
        &student_id,
        &from_row,
        from_period,
        &to_row,
        to_period,
    )?;
    Ok(())
}

fn edit_route(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let from_row = get_required_str(params, "fromRow")?;
    let from_period = get_period(params, "fromPeriod")?;
    let target_key = get_required_str(params, "target")?;
    let Some(target) = RowKind::from_key(&target_key) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "target must be transferred or absent".to_string(),
            details: Some(json!({ "target": target_key })),
        });
    };
    open.schedule.rows = reassign::route_to_special(
        &open.schedule.rows,
        &student_id,
        &from_row,
        from_period,
        target,
    )?;
    Ok(())
}

fn edit_undo_route(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let row_id = get_required_str(params, "rowId")?;
    let period = get_period(params, "period")?;
    open.schedule.rows =
        reassign::undo_route(&open.schedule.rows, &student_id, &row_id, period)?;
    Ok(())
}

fn edit_remove(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let row_id = get_required_str(params, "rowId")?;
    let period = get_period(params, "period")?;
    open.schedule.rows =
        reassign::remove_assignment(&open.schedule.rows, &student_id, &row_id, period)?;
    Ok(())
}

fn edit_assign(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let row_id = get_required_str(params, "rowId")?;
    let period = get_period(params, "period")?;
    let student = params.get("student").ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "missing student".to_string(),
        details: None,
    })?;
    let student_id = get_required_str(student, "studentId")?;
    let get_str = |key: &str| {
        student
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let assignment = StudentAssignment {
        student_id,
        name: get_str("name"),
        grade: get_str("grade"),
        seat: get_str("seat"),
        subject: get_str("subject"),
        class_type: get_str("classType"),
        duration: student.get("duration").and_then(|v| v.as_i64()),
        status: AssignmentStatus::Planned,
        origin_row: None,
        origin_teacher: None,
        origin_period: None,
    };
    open.schedule.rows = reassign::assign(&open.schedule.rows, &row_id, period, assignment)?;
    Ok(())
}

fn edit_update_assignment(
    open: &mut OpenSchedule,
    params: &serde_json::Value,
) -> Result<(), HandlerErr> {
    let row_id = get_required_str(params, "rowId")?;
    let period = get_period(params, "period")?;
    let student_id = get_required_str(params, "studentId")?;
    let patch_json = params.get("patch").ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "missing patch".to_string(),
        details: None,
    })?;
    let field = |key: &str| {
        patch_json
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };
    let duration = match patch_json.get("duration") {
        None => None,
        Some(serde_json::Value::Null) => Some(None),
        Some(v) => Some(Some(v.as_i64().ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "duration must be a number or null".to_string(),
            details: None,
        })?)),
    };
    let patch = AssignmentPatch {
        seat: field("seat"),
        subject: field("subject"),
        class_type: field("classType"),
        duration,
    };
    open.schedule.rows = reassign::update_assignment(
        &open.schedule.rows,
        &row_id,
        period,
        &student_id,
        patch,
    )?;
    Ok(())
}

fn edit_add_row(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let teacher = parse_teacher(params)?;
    let row = Row::new_normal(teacher);
    // Normal rows sit before the special block.
    let at = open
        .schedule
        .rows
        .iter()
        .position(|r| r.kind.is_special())
        .unwrap_or(open.schedule.rows.len());
    open.schedule.rows.insert(at, row);
    Ok(())
}

fn edit_set_row_teacher(
    open: &mut OpenSchedule,
    params: &serde_json::Value,
) -> Result<(), HandlerErr> {
    let row_id = get_required_str(params, "rowId")?;
    let teacher = parse_teacher(params)?;
    let row = open
        .schedule
        .rows
        .iter_mut()
        .find(|r| r.id == row_id)
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: format!("row {} not found", row_id),
            details: None,
        })?;
    if row.kind != RowKind::Normal {
        return Err(HandlerErr {
            code: "bad_params",
            message: "special rows do not carry a teacher".to_string(),
            details: None,
        });
    }
    row.teacher = teacher;
    Ok(())
}

fn edit_remove_row(open: &mut OpenSchedule, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let row_id = get_required_str(params, "rowId")?;
    let idx = open
        .schedule
        .rows
        .iter()
        .position(|r| r.id == row_id)
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: format!("row {} not found", row_id),
            details: None,
        })?;
    if open.schedule.rows[idx].kind != RowKind::Normal {
        return Err(HandlerErr {
            code: "bad_params",
            message: "special rows are fixed and cannot be removed".to_string(),
            details: None,
        });
    }
    if open.schedule.rows[idx].periods.iter().any(|c| !c.is_empty()) {
        return Err(HandlerErr {
            code: "row_not_empty",
            message: "move or delete the row's students first".to_string(),
            details: None,
        });
    }
    open.schedule.rows.remove(idx);
    Ok(())
}

fn respond(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut OpenSchedule, &serde_json::Value) -> Result<(), HandlerErr>,
) -> serde_json::Value {
    let open = match require_open(state) {
        Ok(open) => open,
        Err(error) => return error.response(&req.id),
    };
    if let Err(error) = check_generation(open, &req.params) {
        return error.response(&req.id);
    }
    match f(open, &req.params) {
        Ok(()) => ok(&req.id, grid_result(open)),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.move" => Some(respond(state, req, edit_move)),
        "schedule.route" => Some(respond(state, req, edit_route)),
        "schedule.undoRoute" => Some(respond(state, req, edit_undo_route)),
        "schedule.remove" => Some(respond(state, req, edit_remove)),
        "schedule.assign" => Some(respond(state, req, edit_assign)),
        "schedule.updateAssignment" => Some(respond(state, req, edit_update_assignment)),
        "schedule.addRow" => Some(respond(state, req, edit_add_row)),
        "schedule.setRowTeacher" => Some(respond(state, req, edit_set_row_teacher)),
        "schedule.removeRow" => Some(respond(state, req, edit_remove_row)),
        _ => None,
    }
}
