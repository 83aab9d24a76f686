use std::collections::HashSet;

use crate::model::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub student_id: String,
    pub period: u8,
}

/// Reports every period in which the same student appears more than once
/// across all rows, special rows included. One record per repeat occurrence
/// beyond the first, in row-major order. Pure; callers must run this before
/// every persist and reject the save on a non-empty result.
pub fn find_conflicts(rows: &[Row]) -> Vec<Conflict> {
    let mut seen: HashSet<(u8, String)> = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        for (idx, cell) in row.periods.iter().enumerate() {
            let period = (idx + 1) as u8;
            for a in cell {
                if !seen.insert((period, a.student_id.clone())) {
                    out.push(Conflict {
                        student_id: a.student_id.clone(),
                        period,
                    });
                }
            }
        }
    }
    out
}

pub fn conflicts_to_json(conflicts: &[Conflict]) -> serde_json::Value {
    let out: Vec<serde_json::Value> = conflicts
        .iter()
        .map(|c| {
            serde_json::json!({
                "studentId": c.student_id,
                "period": c.period,
            })
        })
        .collect();
    serde_json::Value::Array(out)
}
