use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
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

fn teachers_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let include_inactive = params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let mut stmt = conn
        .prepare(
            "SELECT code, name, active, sort_order FROM teachers
             ORDER BY sort_order, code",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)? != 0,
                r.get::<_, i64>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let teachers: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|(_, _, active, _)| include_inactive || *active)
        .map(|(code, name, active, sort_order)| {
            json!({
                "code": code,
                "name": name,
                "active": active,
                "sortOrder": sort_order
            })
        })
        .collect();
    Ok(json!({ "teachers": teachers }))
}

fn teachers_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_str(params, "code")?;
    let name = get_required_str(params, "name")?;
    let active = params.get("active").and_then(|v| v.as_bool()).unwrap_or(true);
    let sort_order = params.get("sortOrder").and_then(|v| v.as_i64()).unwrap_or(0);
    conn.execute(
        "INSERT INTO teachers(code, name, active, sort_order)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(code) DO UPDATE SET
           name = excluded.name,
           active = excluded.active,
           sort_order = excluded.sort_order",
        (&code, &name, active as i64, sort_order),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "teachers" })),
    })?;
    Ok(json!({ "code": code }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let include_inactive = params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let mut stmt = conn
        .prepare(
            "SELECT id, name, grade, active, sort_order FROM students
             ORDER BY sort_order, id",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)? != 0,
                r.get::<_, i64>(4)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|(_, _, _, active, _)| include_inactive || *active)
        .map(|(id, name, grade, active, sort_order)| {
            json!({
                "id": id,
                "name": name,
                "grade": grade,
                "active": active,
                "sortOrder": sort_order
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn students_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let name = get_required_str(params, "name")?;
    let grade = params
        .get("grade")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let active = params.get("active").and_then(|v| v.as_bool()).unwrap_or(true);
    let sort_order = params.get("sortOrder").and_then(|v| v.as_i64()).unwrap_or(0);
    conn.execute(
        "INSERT INTO students(id, name, grade, active, sort_order)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           grade = excluded.grade,
           active = excluded.active,
           sort_order = excluded.sort_order",
        (&id, &name, &grade, active as i64, sort_order),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;
    Ok(json!({ "id": id }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.teachers.list" => Some(with_conn(state, req, teachers_list)),
        "roster.teachers.upsert" => Some(with_conn(state, req, teachers_upsert)),
        "roster.students.list" => Some(with_conn(state, req, students_list)),
        "roster.students.upsert" => Some(with_conn(state, req, students_upsert)),
        _ => None,
    }
}
