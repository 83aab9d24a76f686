use crate::model::{period_in_range, AssignmentStatus, Row, RowKind, StudentAssignment};

/// Rejections raised by the reassignment operations. These are validation
/// errors; none of them leaves a partially applied rows array behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignError {
    BadPeriod { period: u8 },
    RowNotFound { row_id: String },
    SpecialRowMissing { kind: RowKind },
    AssignmentNotFound { student_id: String, period: u8 },
    DuplicateInPeriod { student_id: String, period: u8 },
    NotNormalRow { row_id: String },
    NotRoutableKind { kind: RowKind },
    NotSpecialRow { row_id: String },
    NoProvenance { student_id: String },
    OriginMissing { student_id: String },
    AlreadyInPeriod { student_id: String, period: u8 },
}

impl ReassignError {
    pub fn code(&self) -> &'static str {
        match self {
            ReassignError::BadPeriod { .. } => "bad_params",
            ReassignError::RowNotFound { .. } => "not_found",
            ReassignError::SpecialRowMissing { .. } => "not_found",
            ReassignError::AssignmentNotFound { .. } => "not_found",
            ReassignError::DuplicateInPeriod { .. } => "duplicate_in_period",
            ReassignError::NotNormalRow { .. } => "bad_params",
            ReassignError::NotRoutableKind { .. } => "bad_params",
            ReassignError::NotSpecialRow { .. } => "bad_params",
            ReassignError::NoProvenance { .. } => "no_provenance",
            ReassignError::OriginMissing { .. } => "no_provenance",
            ReassignError::AlreadyInPeriod { .. } => "duplicate_in_period",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ReassignError::BadPeriod { period } => {
                format!("period {} is out of range 1..8", period)
            }
            ReassignError::RowNotFound { row_id } => format!("row {} not found", row_id),
            ReassignError::SpecialRowMissing { kind } => {
                format!("schedule has no {} row", kind.as_key())
            }
            ReassignError::AssignmentNotFound { student_id, period } => {
                format!("student {} is not in period {}", student_id, period)
            }
            ReassignError::DuplicateInPeriod { student_id, period } => format!(
                "student {} already has a placement in period {}",
                student_id, period
            ),
            ReassignError::NotNormalRow { row_id } => {
                format!("row {} is not a teacher row", row_id)
            }
            ReassignError::NotRoutableKind { kind } => {
                format!("cannot route to the {} row", kind.as_key())
            }
            ReassignError::NotSpecialRow { row_id } => {
                format!("row {} is not a special row", row_id)
            }
            ReassignError::NoProvenance { student_id } => format!(
                "student {} carries no origin information to undo with",
                student_id
            ),
            ReassignError::OriginMissing { student_id } => format!(
                "origin row for student {} no longer exists",
                student_id
            ),
            ReassignError::AlreadyInPeriod { student_id, period } => format!(
                "student {} already has a placement in period {}",
                student_id, period
            ),
        }
    }
}

fn row_index(rows: &[Row], row_id: &str) -> Result<usize, ReassignError> {
    rows.iter()
        .position(|r| r.id == row_id)
        .ok_or_else(|| ReassignError::RowNotFound {
            row_id: row_id.to_string(),
        })
}

fn special_row_index(rows: &[Row], kind: RowKind) -> Result<usize, ReassignError> {
    rows.iter()
        .position(|r| r.kind == kind)
        .ok_or(ReassignError::SpecialRowMissing { kind })
}

fn check_period(period: u8) -> Result<(), ReassignError> {
    if period_in_range(period) {
        Ok(())
    } else {
        Err(ReassignError::BadPeriod { period })
    }
}

fn take_assignment(
    row: &mut Row,
    period: u8,
    student_id: &str,
) -> Result<StudentAssignment, ReassignError> {
    let cell = row.cell_mut(period);
    let pos = cell
        .iter()
        .position(|a| a.student_id == student_id)
        .ok_or_else(|| ReassignError::AssignmentNotFound {
            student_id: student_id.to_string(),
            period,
        })?;
    Ok(cell.remove(pos))
}

/// True when `student_id` sits in `period` of any cell other than the one at
/// (`skip_row`, `skip_period`).
fn held_in_period_besides(
    rows: &[Row],
    period: u8,
    student_id: &str,
    skip_row: &str,
    skip_period: u8,
) -> bool {
    rows.iter().any(|r| {
        if r.id == skip_row && period == skip_period {
            return false;
        }
        r.cell(period).iter().any(|a| a.student_id == student_id)
    })
}

/// Drag/drop between two cells. The whole rows array is transformed in one
/// step; a rejected move returns Err without touching anything.
pub fn move_assignment(
    rows: &[Row],
    student_id: &str,
    from_row: &str,
    from_period: u8,
    to_row: &str,
    to_period: u8,
) -> Result<Vec<Row>, ReassignError> {
    check_period(from_period)?;
    check_period(to_period)?;
    let from_idx = row_index(rows, from_row)?;
    let to_idx = row_index(rows, to_row)?;
    if !rows[from_idx]
        .cell(from_period)
        .iter()
        .any(|a| a.student_id == student_id)
    {
        return Err(ReassignError::AssignmentNotFound {
            student_id: student_id.to_string(),
            period: from_period,
        });
    }
    // Fast pre-check for dropping onto a period where another cell already
    // holds this student.
    if held_in_period_besides(rows, to_period, student_id, from_row, from_period) {
        return Err(ReassignError::DuplicateInPeriod {
            student_id: student_id.to_string(),
            period: to_period,
        });
    }

    let mut next = rows.to_vec();
    let moved = take_assignment(&mut next[from_idx], from_period, student_id)?;
    next[to_idx].cell_mut(to_period).push(moved);
    Ok(next)
}

/// Pulls a student out of a teacher row into the Transferred or Absent row,
/// same period, stamping provenance so the move can be undone.
pub fn route_to_special(
    rows: &[Row],
    student_id: &str,
    from_row: &str,
    from_period: u8,
    target: RowKind,
) -> Result<Vec<Row>, ReassignError> {
    check_period(from_period)?;
    if !matches!(target, RowKind::Transferred | RowKind::Absent) {
        return Err(ReassignError::NotRoutableKind { kind: target });
    }
    let from_idx = row_index(rows, from_row)?;
    if rows[from_idx].kind != RowKind::Normal {
        return Err(ReassignError::NotNormalRow {
            row_id: from_row.to_string(),
        });
    }
    let target_idx = special_row_index(rows, target)?;
    if rows[target_idx]
        .cell(from_period)
        .iter()
        .any(|a| a.student_id == student_id)
    {
        return Err(ReassignError::DuplicateInPeriod {
            student_id: student_id.to_string(),
            period: from_period,
        });
    }

    let mut next = rows.to_vec();
    let origin_teacher = next[from_idx].teacher.as_ref().map(|t| t.code.clone());
    let origin_row = next[from_idx].id.clone();
    let mut moved = take_assignment(&mut next[from_idx], from_period, student_id)?;
    moved.status = match target {
        RowKind::Transferred => AssignmentStatus::Transferred,
        _ => AssignmentStatus::Absent,
    };
    moved.origin_row = Some(origin_row);
    moved.origin_teacher = origin_teacher;
    moved.origin_period = Some(from_period);
    next[target_idx].cell_mut(from_period).push(moved);
    Ok(next)
}

/// Reverses a routing using the provenance stamped by `route_to_special`.
/// Undefined without provenance, so it is rejected rather than guessed.
pub fn undo_route(
    rows: &[Row],
    student_id: &str,
    special_row: &str,
    period: u8,
) -> Result<Vec<Row>, ReassignError> {
    check_period(period)?;
    let special_idx = row_index(rows, special_row)?;
    if !rows[special_idx].kind.is_special() {
        return Err(ReassignError::NotSpecialRow {
            row_id: special_row.to_string(),
        });
    }
    let held = rows[special_idx]
        .cell(period)
        .iter()
        .find(|a| a.student_id == student_id)
        .ok_or_else(|| ReassignError::AssignmentNotFound {
            student_id: student_id.to_string(),
            period,
        })?;
    if !held.has_provenance() {
        return Err(ReassignError::NoProvenance {
            student_id: student_id.to_string(),
        });
    }
    let origin_period = held.origin_period.unwrap_or(period);
    check_period(origin_period)?;

    // Resolve the origin row: by stable id first (same session), then by
    // teacher code (documents reloaded from the store).
    let origin_idx = held
        .origin_row
        .as_ref()
        .and_then(|id| rows.iter().position(|r| r.id == *id && r.kind == RowKind::Normal))
        .or_else(|| {
            held.origin_teacher.as_ref().and_then(|code| {
                rows.iter().position(|r| {
                    r.kind == RowKind::Normal
                        && r.teacher.as_ref().map(|t| t.code.as_str()) == Some(code.as_str())
                })
            })
        })
        .ok_or_else(|| ReassignError::OriginMissing {
            student_id: student_id.to_string(),
        })?;

    if held_in_period_besides(rows, origin_period, student_id, special_row, period) {
        return Err(ReassignError::DuplicateInPeriod {
            student_id: student_id.to_string(),
            period: origin_period,
        });
    }

    let mut next = rows.to_vec();
    let mut moved = take_assignment(&mut next[special_idx], period, student_id)?;
    moved.status = AssignmentStatus::Planned;
    moved.clear_provenance();
    next[origin_idx].cell_mut(origin_period).push(moved);
    Ok(next)
}

/// Pulls the student out of the day's plan entirely.
pub fn remove_assignment(
    rows: &[Row],
    student_id: &str,
    row_id: &str,
    period: u8,
) -> Result<Vec<Row>, ReassignError> {
    check_period(period)?;
    let idx = row_index(rows, row_id)?;
    let mut next = rows.to_vec();
    take_assignment(&mut next[idx], period, student_id)?;
    Ok(next)
}

/// Initial placement from the roster. Same duplicate discipline as Move: a
/// student can only hold one cell per period.
pub fn assign(
    rows: &[Row],
    row_id: &str,
    period: u8,
    assignment: StudentAssignment,
) -> Result<Vec<Row>, ReassignError> {
    check_period(period)?;
    let idx = row_index(rows, row_id)?;
    let student_id = assignment.student_id.clone();
    if rows
        .iter()
        .any(|r| r.cell(period).iter().any(|a| a.student_id == student_id))
    {
        return Err(ReassignError::AlreadyInPeriod { student_id, period });
    }
    let mut next = rows.to_vec();
    next[idx].cell_mut(period).push(assignment);
    Ok(next)
}

/// Free-text edits on an assignment in place; identity and status fields are
/// not reachable through this path.
pub struct AssignmentPatch {
    pub seat: Option<String>,
    pub subject: Option<String>,
    pub class_type: Option<String>,
    pub duration: Option<Option<i64>>,
}

pub fn update_assignment(
    rows: &[Row],
    row_id: &str,
    period: u8,
    student_id: &str,
    patch: AssignmentPatch,
) -> Result<Vec<Row>, ReassignError> {
    check_period(period)?;
    let idx = row_index(rows, row_id)?;
    let mut next = rows.to_vec();
    let cell = next[idx].cell_mut(period);
    let a = cell
        .iter_mut()
        .find(|a| a.student_id == student_id)
        .ok_or_else(|| ReassignError::AssignmentNotFound {
            student_id: student_id.to_string(),
            period,
        })?;
    if let Some(seat) = patch.seat {
        a.seat = seat;
    }
    if let Some(subject) = patch.subject {
        a.subject = subject;
    }
    if let Some(class_type) = patch.class_type {
        a.class_type = class_type;
    }
    if let Some(duration) = patch.duration {
        a.duration = duration;
    }
    Ok(next)
}
