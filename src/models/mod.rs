use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Classroom API Models (wire payloads, every field optional)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub section: Option<String>,
    pub course_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseUser {
    pub course_id: Option<String>,
    pub user_id: Option<String>,
    pub profile: Option<UserProfile>,
}

impl CourseUser {
    /// Classroom user id, preferring the membership's `userId`.
    pub fn classroom_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or_else(|| self.profile.as_ref().and_then(|p| p.id.as_deref()))
    }

    pub fn full_name(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.name.as_ref())
            .and_then(|n| n.full_name.as_deref())
    }

    pub fn email(&self) -> Option<&str> {
        self.profile.as_ref().and_then(|p| p.email_address.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub id: Option<String>,
    pub name: Option<UserName>,
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserName {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseWorkPayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub due_date: Option<DatePayload>,
    pub due_time: Option<TimeOfDayPayload>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatePayload {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeOfDayPayload {
    pub hours: Option<u32>,
    pub minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentSubmissionPayload {
    pub id: Option<String>,
    pub course_work_id: Option<String>,
    pub user_id: Option<String>,
    pub state: Option<String>,
    pub late: Option<bool>,
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoursesPage {
    pub courses: Vec<Course>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentsPage {
    pub students: Vec<CourseUser>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeachersPage {
    pub teachers: Vec<CourseUser>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseWorkPage {
    pub course_work: Vec<CourseWorkPayload>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionsPage {
    pub student_submissions: Vec<StudentSubmissionPayload>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// Classification Entities
// ============================================================================

/// A calendar date whose components may be missing upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DueDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl DueDate {
    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DueTime {
    pub hours: u32,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub due_date: Option<DueDate>,
    pub due_time: Option<DueTime>,
}

impl Assignment {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            due_date: None,
            due_time: None,
        }
    }

    pub fn due(mut self, date: DueDate, time: Option<DueTime>) -> Self {
        self.due_date = Some(date);
        self.due_time = time;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    New,
    Created,
    TurnedIn,
    Returned,
    ReclaimedByStudent,
    Other(String),
}

impl SubmissionState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NEW" => Self::New,
            "CREATED" => Self::Created,
            "TURNED_IN" => Self::TurnedIn,
            "RETURNED" => Self::Returned,
            "RECLAIMED_BY_STUDENT" => Self::ReclaimedByStudent,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub assignment_id: String,
    pub state: SubmissionState,
    /// Only meaningful for `TurnedIn`.
    pub late: bool,
}

impl SubmissionRecord {
    pub fn new(assignment_id: impl Into<String>, state: SubmissionState, late: bool) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            state,
            late,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubmissionStatus {
    #[serde(rename = "asignada")]
    Assigned,
    #[serde(rename = "entregada")]
    TurnedIn,
    #[serde(rename = "entregadaConRetraso")]
    TurnedInLate,
    #[serde(rename = "sinEntregar")]
    Missing,
    #[serde(rename = "devueltaCalificada")]
    Returned,
}

impl SubmissionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Assigned => "Assigned",
            Self::TurnedIn => "Turned in",
            Self::TurnedInLate => "Turned in late",
            Self::Missing => "Missing",
            Self::Returned => "Returned",
        }
    }
}

/// Per-student, per-course bucket counts. Derived, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionStats {
    #[serde(rename = "asignada")]
    pub assigned: u32,
    #[serde(rename = "entregada")]
    pub turned_in: u32,
    #[serde(rename = "entregadaConRetraso")]
    pub turned_in_late: u32,
    #[serde(rename = "sinEntregar")]
    pub missing: u32,
    #[serde(rename = "devueltaCalificada")]
    pub returned: u32,
}

impl SubmissionStats {
    pub fn record(&mut self, status: SubmissionStatus) {
        match status {
            SubmissionStatus::Assigned => self.assigned += 1,
            SubmissionStatus::TurnedIn => self.turned_in += 1,
            SubmissionStatus::TurnedInLate => self.turned_in_late += 1,
            SubmissionStatus::Missing => self.missing += 1,
            SubmissionStatus::Returned => self.returned += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.assigned + self.turned_in + self.turned_in_late + self.missing + self.returned
    }

    pub fn delivered(&self) -> u32 {
        self.turned_in + self.turned_in_late + self.returned
    }

    fn add(&mut self, other: &SubmissionStats) {
        self.assigned += other.assigned;
        self.turned_in += other.turned_in;
        self.turned_in_late += other.turned_in_late;
        self.missing += other.missing;
        self.returned += other.returned;
    }
}

// ============================================================================
// Report Models
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub course_id: String,
    pub course_name: String,
    pub teachers: Vec<String>,
    pub cell: Option<String>,
    #[serde(flatten)]
    pub stats: SubmissionStats,
    /// Assignment id -> (title, status), in course order.
    #[serde(skip)]
    pub statuses: IndexMap<String, (String, SubmissionStatus)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StudentProgress {
    pub fn new(course: &Course, student: &CourseUser) -> Self {
        Self {
            student_id: student.classroom_id().unwrap_or("unknown").to_string(),
            name: student.full_name().unwrap_or("Unknown Student").to_string(),
            email: student.email().unwrap_or_default().to_string(),
            course_id: course.id.clone(),
            course_name: course.name.clone(),
            teachers: Vec::new(),
            cell: None,
            stats: SubmissionStats::default(),
            statuses: IndexMap::new(),
            error: None,
        }
    }

    /// Zero-filled row used when a student's progress could not be computed.
    pub fn unavailable(course: &Course, student: &CourseUser, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(course, student)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReport {
    pub course: Course,
    pub rows: Vec<StudentProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSummary {
    pub students_processed: usize,
    pub errors: usize,
    pub totals: SubmissionStats,
    pub total_assignments: u32,
    pub completion_rate: f64,
}

impl ProgressSummary {
    pub fn calculate(rows: &[StudentProgress]) -> Self {
        let mut totals = SubmissionStats::default();
        for row in rows {
            totals.add(&row.stats);
        }

        let total_assignments = totals.total();
        let completion_rate = if total_assignments > 0 {
            (totals.delivered() as f64 / total_assignments as f64) * 100.0
        } else {
            0.0
        };

        Self {
            students_processed: rows.len(),
            errors: rows.iter().filter(|r| r.error.is_some()).count(),
            totals,
            total_assignments,
            completion_rate,
        }
    }
}
