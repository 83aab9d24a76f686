use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;

use crate::model::{AssignmentStatus, RowKind, Schedule};
use crate::store;

/// How many year-months the weekday-template walk may step back from the
/// target date's own month.
pub const TEMPLATE_LOOKBACK_MONTHS: u32 = 12;

fn step_back_month(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let total = year * 12 + month as i32 - 1 - offset as i32;
    (total.div_euclid(12), total.rem_euclid(12) as u32 + 1)
}

/// Materializes the schedule for a date: the date-specific document wins;
/// otherwise the most recent weekday template within the lookback horizon,
/// reused as a fresh plan; otherwise the empty fixed-rows schedule.
pub fn resolve(
    conn: &Connection,
    classroom_code: &str,
    date: NaiveDate,
) -> anyhow::Result<Schedule> {
    if let Some(mut schedule) = store::load_schedule(conn, classroom_code, date)? {
        // Legacy documents can be missing special rows; heal on open.
        schedule.ensure_special_rows();
        return Ok(schedule);
    }

    let weekday = date.weekday().num_days_from_sunday();
    for offset in 0..=TEMPLATE_LOOKBACK_MONTHS {
        let (year, month) = step_back_month(date.year(), date.month(), offset);
        let Some(rows) = store::load_template(conn, classroom_code, year, month, weekday)? else {
            continue;
        };
        let mut schedule = Schedule {
            rows,
            is_confirmed: false,
        };
        // A template is reused as a fresh plan, not as history.
        for row in schedule.rows.iter_mut() {
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
        schedule.ensure_special_rows();
        return Ok(schedule);
    }

    Ok(Schedule::empty_with_special_rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db;
    use crate::model::{Row, StudentAssignment, TeacherRef};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn template_rows(teacher_code: &str, student_id: &str, period: u8) -> Vec<Row> {
        let mut row = Row::new_normal(Some(TeacherRef {
            code: teacher_code.to_string(),
            name: "青木".to_string(),
        }));
        row.cell_mut(period).push(StudentAssignment {
            student_id: student_id.to_string(),
            name: "佐藤".to_string(),
            grade: "中2".to_string(),
            seat: "A-1".to_string(),
            subject: "数学".to_string(),
            class_type: String::new(),
            duration: None,
            status: AssignmentStatus::Attended,
            origin_row: None,
            origin_teacher: None,
            origin_period: None,
        });
        vec![row]
    }

    #[test]
    fn step_back_crosses_year_boundaries() {
        assert_eq!(step_back_month(2026, 3, 0), (2026, 3));
        assert_eq!(step_back_month(2026, 3, 3), (2025, 12));
        assert_eq!(step_back_month(2026, 1, 13), (2024, 12));
    }

    #[test]
    fn nearest_template_within_horizon_wins() {
        let conn = open_db(&temp_workspace("jikanwari-resolver-near")).expect("open db");
        // Wednesday 2026-03-04, weekday index 3.
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        store::save_template(&conn, "K01", 2025, 10, 3, &template_rows("T-A", "S5", 2))
            .expect("save 5 months back");
        store::save_template(&conn, "K01", 2025, 4, 3, &template_rows("T-B", "S11", 2))
            .expect("save 11 months back");

        let schedule = resolve(&conn, "K01", date).expect("resolve");
        let normal: Vec<_> = schedule
            .rows
            .iter()
            .filter(|r| r.kind == RowKind::Normal)
            .collect();
        assert_eq!(normal.len(), 1);
        assert_eq!(
            normal[0].teacher.as_ref().map(|t| t.code.as_str()),
            Some("T-A")
        );
        // Fresh plan: statuses reset, not history.
        assert_eq!(normal[0].cell(2)[0].status, AssignmentStatus::Planned);
        assert!(!schedule.is_confirmed);
    }

    #[test]
    fn horizon_is_twelve_months_back() {
        let conn = open_db(&temp_workspace("jikanwari-resolver-horizon")).expect("open db");
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        // 13 months back: outside the horizon.
        store::save_template(&conn, "K01", 2025, 2, 3, &template_rows("T-A", "S1", 1))
            .expect("save template");

        let schedule = resolve(&conn, "K01", date).expect("resolve");
        assert!(schedule.rows.iter().all(|r| r.kind != RowKind::Normal));
        assert_eq!(schedule.rows.len(), 3);

        // Exactly 12 months back is still found.
        store::save_template(&conn, "K02", 2025, 3, 3, &template_rows("T-C", "S2", 1))
            .expect("save template");
        let schedule = resolve(&conn, "K02", date).expect("resolve");
        assert!(schedule.rows.iter().any(|r| r.kind == RowKind::Normal));
    }

    #[test]
    fn wrong_weekday_template_is_ignored() {
        let conn = open_db(&temp_workspace("jikanwari-resolver-weekday")).expect("open db");
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        store::save_template(&conn, "K01", 2026, 3, 4, &template_rows("T-A", "S1", 1))
            .expect("save thursday template");
        let schedule = resolve(&conn, "K01", date).expect("resolve");
        assert!(schedule.rows.iter().all(|r| r.kind != RowKind::Normal));
    }

    #[test]
    fn date_specific_document_wins_over_templates() {
        let conn = open_db(&temp_workspace("jikanwari-resolver-override")).expect("open db");
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        store::save_template(&conn, "K01", 2026, 3, 3, &template_rows("T-A", "S1", 1))
            .expect("save template");
        let override_schedule = Schedule {
            rows: template_rows("T-Z", "S9", 6),
            is_confirmed: false,
        };
        store::save_schedule(&conn, "K01", date, &override_schedule).expect("save override");

        let schedule = resolve(&conn, "K01", date).expect("resolve");
        let normal = schedule
            .rows
            .iter()
            .find(|r| r.kind == RowKind::Normal)
            .expect("normal row");
        assert_eq!(normal.teacher.as_ref().map(|t| t.code.as_str()), Some("T-Z"));
        // Overrides are returned as stored: no status reset.
        assert_eq!(normal.cell(6)[0].status, AssignmentStatus::Attended);
        // Legacy healing: the stored document had no special rows.
        assert_eq!(schedule.rows.len(), 4);
    }
}
