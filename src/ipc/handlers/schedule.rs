use crate::confirm;
use crate::conflict::{conflicts_to_json, find_conflicts};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, OpenSchedule, Request};
use crate::model::{self, AssignmentStatus, RowKind, Schedule};
use crate::resolver;
use crate::store;
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
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

fn parse_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: format!("{} must be YYYY-MM-DD", key),
        details: Some(json!({ "value": raw })),
    })
}

fn parse_month(params: &serde_json::Value, key: &str) -> Result<(i32, u32), HandlerErr> {
    let raw = get_required_str(params, key)?;
    let bad = || HandlerErr {
        code: "bad_params",
        message: format!("{} must be YYYY-MM", key),
        details: Some(json!({ "value": raw.clone() })),
    };
    let Some((y, m)) = raw.split_once('-') else {
        return Err(bad());
    };
    let year = y.parse::<i32>().map_err(|_| bad())?;
    let month = m.parse::<u32>().map_err(|_| bad())?;
    if !(1..=12).contains(&month) {
        return Err(bad());
    }
    Ok((year, month))
}

fn require_open<'a>(
    state: &'a mut AppState,
) -> Result<(&'a Connection, &'a mut OpenSchedule), HandlerErr> {
    let AppState { db, open, .. } = state;
    let conn = db.as_ref().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })?;
    let open = open.as_mut().ok_or_else(|| HandlerErr {
        code: "no_open_schedule",
        message: "open a schedule first".to_string(),
        details: None,
    })?;
    Ok((conn, open))
}

/// Staleness guard: mutating methods must quote the generation handed out by
/// the schedule.open that produced the grid they are editing.
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

fn grid_result(open: &OpenSchedule) -> serde_json::Value {
    json!({
        "classroomCode": open.classroom_code,
        "date": open.date.format("%Y-%m-%d").to_string(),
        "generation": open.generation,
        "isConfirmed": open.schedule.is_confirmed,
        "rows": model::rows_to_json(&open.schedule.rows),
        "conflicts": conflicts_to_json(&find_conflicts(&open.schedule.rows)),
    })
}

fn handle_periods_list(req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "periods": model::periods_to_json() }))
}

fn schedule_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let classroom_code = get_required_str(params, "classroomCode")?;
    let date = parse_date(params, "date")?;
    let AppState {
        db,
        open,
        next_generation,
        ..
    } = state;
    let conn = db.as_ref().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })?;
    let schedule = resolver::resolve(conn, &classroom_code, date).map_err(|e| HandlerErr {
        code: "resolve_failed",
        message: format!("schedule unavailable: {}", e),
        details: None,
    })?;
    let generation = *next_generation;
    *next_generation += 1;
    let opened = OpenSchedule {
        classroom_code,
        date,
        schedule,
        generation,
    };
    let result = grid_result(&opened);
    *open = Some(opened);
    Ok(result)
}

fn schedule_conflicts(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_conn, open) = require_open(state)?;
    Ok(json!({
        "conflicts": conflicts_to_json(&find_conflicts(&open.schedule.rows))
    }))
}

fn schedule_save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, open) = require_open(state)?;
    check_generation(open, params)?;

    let conflicts = find_conflicts(&open.schedule.rows);
    if !conflicts.is_empty() {
        return Err(HandlerErr {
            code: "conflicts_found",
            message: "resolve double-booked students before saving".to_string(),
            details: Some(json!({ "conflicts": conflicts_to_json(&conflicts) })),
        });
    }

    // The overwrite guard reads the stored flag fresh; the confirmed-dates
    // feed is never consulted here.
    let was_confirmed = store::stored_confirmed_flag(conn, &open.classroom_code, open.date)
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let acknowledged = params
        .get("confirmOverwrite")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if was_confirmed && !acknowledged {
        return Err(HandlerErr {
            code: "needs_reconfirm",
            message: "attendance is confirmed for this date; saving will require reconfirmation"
                .to_string(),
            details: None,
        });
    }

    let to_save = Schedule {
        rows: open.schedule.rows.clone(),
        is_confirmed: false,
    };
    store::save_schedule(conn, &open.classroom_code, open.date, &to_save).map_err(|e| {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "schedule_docs" })),
        }
    })?;
    // Every save resets confirmation; the flag only comes back through
    // schedule.confirm.
    open.schedule.is_confirmed = false;
    Ok(json!({
        "date": open.date.format("%Y-%m-%d").to_string(),
        "isConfirmed": false,
        "reconfirmRequired": was_confirmed,
    }))
}

fn schedule_confirm(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, open) = require_open(state)?;
    check_generation(open, params)?;

    let conflicts = find_conflicts(&open.schedule.rows);
    if !conflicts.is_empty() {
        return Err(HandlerErr {
            code: "conflicts_found",
            message: "resolve double-booked students before confirming".to_string(),
            details: Some(json!({ "conflicts": conflicts_to_json(&conflicts) })),
        });
    }

    let today = chrono::Local::now().date_naive();
    let confirmed = confirm::confirm_attendance(&open.schedule, open.date, today)
        .map_err(|e| HandlerErr {
            code: e.code(),
            message: e.message(),
            details: None,
        })?;
    // Persist the successor first; the in-memory schedule only changes once
    // the write has gone through, so confirmation is all-or-nothing.
    store::save_schedule(conn, &open.classroom_code, open.date, &confirmed).map_err(|e| {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "schedule_docs" })),
        }
    })?;
    open.schedule = confirmed;
    Ok(grid_result(open))
}

fn schedule_confirmed_dates(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        });
    };
    let classroom_code = get_required_str(params, "classroomCode")?;
    let (year, month) = parse_month(params, "month")?;
    let dates = store::confirmed_dates(conn, &classroom_code, year, month).map_err(|e| {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    })?;
    Ok(json!({ "dates": dates }))
}

fn template_save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (conn, open) = require_open(state)?;
    check_generation(open, params)?;

    // Templates store the plan shape: statuses back to planned, no
    // provenance, no confirmation concept.
    let mut rows = open.schedule.rows.clone();
    for row in rows.iter_mut() {
        if row.kind != RowKind::Normal {
            continue;
        }
        for cell in row.periods.iter_mut() {
            for a in cell.iter_mut() {
                a.status = AssignmentStatus::Planned;
                a.clear_provenance();
            }
        }
    }
    let year = open.date.year();
    let month = open.date.month();
    let weekday = open.date.weekday().num_days_from_sunday();
    store::save_template(conn, &open.classroom_code, year, month, weekday, &rows).map_err(
        |e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "template_docs" })),
        },
    )?;
    Ok(json!({
        "docKey": store::template_doc_key(&open.classroom_code, year, month, weekday)
    }))
}

fn respond(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let params = req.params.clone();
    match f(state, &params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "periods.list" => Some(handle_periods_list(req)),
        "schedule.open" => Some(respond(state, req, schedule_open)),
        "schedule.conflicts" => Some(respond(state, req, |s, _| schedule_conflicts(s))),
        "schedule.save" => Some(respond(state, req, schedule_save)),
        "schedule.confirm" => Some(respond(state, req, schedule_confirm)),
        "schedule.confirmedDates" => Some(respond(state, req, schedule_confirmed_dates)),
        "template.save" => Some(respond(state, req, template_save)),
        _ => None,
    }
}
