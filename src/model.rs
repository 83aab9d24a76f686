use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

pub const PERIOD_COUNT: usize = 8;

/// Fixed daily time slots. Owned by configuration; the schedule only ever
/// refers to them by 1-based index.
pub struct PeriodInfo {
    pub index: u8,
    pub label: &'static str,
    pub starts: &'static str,
    pub ends: &'static str,
}

pub const PERIODS: [PeriodInfo; PERIOD_COUNT] = [
    PeriodInfo { index: 1, label: "1限", starts: "09:00", ends: "10:10" },
    PeriodInfo { index: 2, label: "2限", starts: "10:20", ends: "11:30" },
    PeriodInfo { index: 3, label: "3限", starts: "11:40", ends: "12:50" },
    PeriodInfo { index: 4, label: "4限", starts: "13:40", ends: "14:50" },
    PeriodInfo { index: 5, label: "5限", starts: "15:00", ends: "16:10" },
    PeriodInfo { index: 6, label: "6限", starts: "16:20", ends: "17:30" },
    PeriodInfo { index: 7, label: "7限", starts: "17:40", ends: "18:50" },
    PeriodInfo { index: 8, label: "8限", starts: "19:00", ends: "20:10" },
];

pub fn period_in_range(period: u8) -> bool {
    (1..=PERIOD_COUNT as u8).contains(&period)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherRef {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Normal,
    Undecided,
    Transferred,
    Absent,
}

impl RowKind {
    /// Status string used in persisted documents.
    pub fn as_wire(self) -> &'static str {
        match self {
            RowKind::Normal => "予定",
            RowKind::Undecided => "未定",
            RowKind::Transferred => "振替",
            RowKind::Absent => "欠席",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "予定" => Some(RowKind::Normal),
            "未定" => Some(RowKind::Undecided),
            "振替" => Some(RowKind::Transferred),
            "欠席" => Some(RowKind::Absent),
            _ => None,
        }
    }

    /// Identifier used in IPC responses and params.
    pub fn as_key(self) -> &'static str {
        match self {
            RowKind::Normal => "normal",
            RowKind::Undecided => "undecided",
            RowKind::Transferred => "transferred",
            RowKind::Absent => "absent",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(RowKind::Normal),
            "undecided" => Some(RowKind::Undecided),
            "transferred" => Some(RowKind::Transferred),
            "absent" => Some(RowKind::Absent),
            _ => None,
        }
    }

    pub fn is_special(self) -> bool {
        !matches!(self, RowKind::Normal)
    }
}

/// The three special rows every materialized schedule carries, in display
/// order.
pub const SPECIAL_ROW_KINDS: [RowKind; 3] =
    [RowKind::Undecided, RowKind::Transferred, RowKind::Absent];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Planned,
    Attended,
    Absent,
    Transferred,
    Undecided,
}

impl AssignmentStatus {
    pub fn as_wire(self) -> &'static str {
        match self {
            AssignmentStatus::Planned => "予定",
            AssignmentStatus::Attended => "出席",
            AssignmentStatus::Absent => "欠席",
            AssignmentStatus::Transferred => "振替",
            AssignmentStatus::Undecided => "未定",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "予定" => Some(AssignmentStatus::Planned),
            "出席" => Some(AssignmentStatus::Attended),
            "欠席" => Some(AssignmentStatus::Absent),
            "振替" => Some(AssignmentStatus::Transferred),
            "未定" => Some(AssignmentStatus::Undecided),
            _ => None,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            AssignmentStatus::Planned => "planned",
            AssignmentStatus::Attended => "attended",
            AssignmentStatus::Absent => "absent",
            AssignmentStatus::Transferred => "transferred",
            AssignmentStatus::Undecided => "undecided",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(AssignmentStatus::Planned),
            "attended" => Some(AssignmentStatus::Attended),
            "absent" => Some(AssignmentStatus::Absent),
            "transferred" => Some(AssignmentStatus::Transferred),
            "undecided" => Some(AssignmentStatus::Undecided),
            _ => None,
        }
    }
}

/// One student's placement in one period of one row. Owned by exactly one
/// (row, period) cell; moving it is delete-then-insert, never a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentAssignment {
    pub student_id: String,
    pub name: String,
    pub grade: String,
    pub seat: String,
    pub subject: String,
    pub class_type: String,
    pub duration: Option<i64>,
    pub status: AssignmentStatus,
    /// Provenance, set only while the assignment sits in a special row.
    /// `origin_row` is session-local (row ids are regenerated on load);
    /// `origin_teacher` survives persistence.
    pub origin_row: Option<String>,
    pub origin_teacher: Option<String>,
    pub origin_period: Option<u8>,
}

impl StudentAssignment {
    pub fn has_provenance(&self) -> bool {
        self.origin_period.is_some() && (self.origin_row.is_some() || self.origin_teacher.is_some())
    }

    pub fn clear_provenance(&mut self) {
        self.origin_row = None;
        self.origin_teacher = None;
        self.origin_period = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub teacher: Option<TeacherRef>,
    pub kind: RowKind,
    pub periods: [Vec<StudentAssignment>; PERIOD_COUNT],
}

impl Row {
    pub fn new_normal(teacher: Option<TeacherRef>) -> Self {
        Row {
            id: Uuid::new_v4().to_string(),
            teacher,
            kind: RowKind::Normal,
            periods: empty_periods(),
        }
    }

    pub fn new_special(kind: RowKind) -> Self {
        Row {
            id: Uuid::new_v4().to_string(),
            teacher: None,
            kind,
            periods: empty_periods(),
        }
    }

    pub fn cell(&self, period: u8) -> &[StudentAssignment] {
        &self.periods[(period - 1) as usize]
    }

    pub fn cell_mut(&mut self, period: u8) -> &mut Vec<StudentAssignment> {
        &mut self.periods[(period - 1) as usize]
    }
}

pub fn empty_periods() -> [Vec<StudentAssignment>; PERIOD_COUNT] {
    std::array::from_fn(|_| Vec::new())
}

/// The aggregate for one (classroomCode, date) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub rows: Vec<Row>,
    pub is_confirmed: bool,
}

impl Schedule {
    /// Schedule with no teacher rows, only the three empty special rows.
    pub fn empty_with_special_rows() -> Self {
        let mut s = Schedule {
            rows: Vec::new(),
            is_confirmed: false,
        };
        s.ensure_special_rows();
        s
    }

    /// Synthesizes any missing special row as empty. Legacy documents can
    /// lack them; callers depend on always finding exactly one per kind.
    pub fn ensure_special_rows(&mut self) {
        for kind in SPECIAL_ROW_KINDS {
            if !self.rows.iter().any(|r| r.kind == kind) {
                self.rows.push(Row::new_special(kind));
            }
        }
    }

    pub fn special_row(&self, kind: RowKind) -> Option<&Row> {
        self.rows.iter().find(|r| r.kind == kind)
    }
}

fn assignment_to_json(a: &StudentAssignment) -> serde_json::Value {
    let mut v = json!({
        "studentId": a.student_id,
        "name": a.name,
        "grade": a.grade,
        "seat": a.seat,
        "subject": a.subject,
        "classType": a.class_type,
        "status": a.status.as_key(),
    });
    if let Some(d) = a.duration {
        v["duration"] = json!(d);
    }
    if let Some(t) = &a.origin_teacher {
        v["originTeacher"] = json!(t);
    }
    if let Some(p) = a.origin_period {
        v["originPeriod"] = json!(p);
    }
    v
}

/// In-memory grid projection used by IPC responses: periods as an 8-array,
/// statuses as English keys. The persisted wire shape lives in `store`.
pub fn rows_to_json(rows: &[Row]) -> serde_json::Value {
    let out: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let periods: Vec<serde_json::Value> = row
                .periods
                .iter()
                .map(|cell| {
                    serde_json::Value::Array(cell.iter().map(assignment_to_json).collect())
                })
                .collect();
            json!({
                "rowId": row.id,
                "kind": row.kind.as_key(),
                "teacher": row.teacher.as_ref().map(|t| json!({ "code": t.code, "name": t.name })),
                "periods": periods,
            })
        })
        .collect();
    serde_json::Value::Array(out)
}

pub fn periods_to_json() -> serde_json::Value {
    let out: Vec<serde_json::Value> = PERIODS
        .iter()
        .map(|p| {
            json!({
                "index": p.index,
                "label": p.label,
                "starts": p.starts,
                "ends": p.ends,
            })
        })
        .collect();
    serde_json::Value::Array(out)
}
