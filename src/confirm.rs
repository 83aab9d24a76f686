use chrono::NaiveDate;

use crate::model::{AssignmentStatus, RowKind, Schedule};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    FutureDate { date: NaiveDate },
    AlreadyConfirmed,
}

impl ConfirmError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfirmError::FutureDate { .. } => "future_date",
            ConfirmError::AlreadyConfirmed => "already_confirmed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ConfirmError::FutureDate { date } => {
                format!("cannot confirm attendance for future date {}", date)
            }
            ConfirmError::AlreadyConfirmed => {
                "attendance is already confirmed for this date".to_string()
            }
        }
    }
}

/// Planned → Confirmed. Builds the fully confirmed successor schedule or
/// refuses; the caller persists the successor first and only then swaps it
/// in, so a failed write leaves everything unchanged.
pub fn confirm_attendance(
    schedule: &Schedule,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<Schedule, ConfirmError> {
    if date > today {
        return Err(ConfirmError::FutureDate { date });
    }
    if schedule.is_confirmed {
        return Err(ConfirmError::AlreadyConfirmed);
    }

    let mut confirmed = schedule.clone();
    for row in confirmed.rows.iter_mut() {
        if row.kind != RowKind::Normal {
            continue;
        }
        for cell in row.periods.iter_mut() {
            for a in cell.iter_mut() {
                if a.status == AssignmentStatus::Planned {
                    a.status = AssignmentStatus::Attended;
                }
            }
        }
    }
    confirmed.is_confirmed = true;
    Ok(confirmed)
}
