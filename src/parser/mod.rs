use crate::models::{
    Assignment, CourseWorkPayload, DueDate, DueTime, StudentSubmissionPayload, SubmissionRecord,
    SubmissionState,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{entity} payload is missing `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}

/// Convert one course work payload into a strict `Assignment`
pub fn parse_course_work(payload: &CourseWorkPayload) -> Result<Assignment, ParseError> {
    let id = payload
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingField {
            entity: "courseWork",
            field: "id",
        })?;

    let title = payload
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| id.clone());

    let due_date = payload.due_date.map(|d| DueDate {
        year: d.year,
        month: d.month,
        day: d.day,
    });

    // Omitted fields fall back to the end of the due day
    let due_time = payload.due_time.map(|t| DueTime {
        hours: t.hours.unwrap_or(23),
        minutes: t.minutes.unwrap_or(59),
    });

    Ok(Assignment {
        id,
        title,
        due_date,
        due_time,
    })
}

/// Convert one student submission payload into a strict `SubmissionRecord`
pub fn parse_submission(payload: &StudentSubmissionPayload) -> Result<SubmissionRecord, ParseError> {
    let assignment_id = payload
        .course_work_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingField {
            entity: "studentSubmission",
            field: "courseWorkId",
        })?;

    let state = payload
        .state
        .as_deref()
        .map(SubmissionState::parse)
        .unwrap_or_else(|| SubmissionState::Other(String::new()));

    Ok(SubmissionRecord {
        assignment_id,
        state,
        late: payload.late.unwrap_or(false),
    })
}

/// Parse a course's course work, dropping entries that cannot be identified
pub fn parse_assignments(payloads: &[CourseWorkPayload]) -> Vec<Assignment> {
    payloads
        .iter()
        .filter_map(|p| match parse_course_work(p) {
            Ok(assignment) => Some(assignment),
            Err(e) => {
                warn!(title = ?p.title, "Skipping course work: {}", e);
                None
            }
        })
        .collect()
}

/// Parse a student's submissions, keeping input order
pub fn parse_submissions(payloads: &[StudentSubmissionPayload]) -> Vec<SubmissionRecord> {
    payloads
        .iter()
        .filter_map(|p| match parse_submission(p) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(submission_id = ?p.id, "Skipping submission: {}", e);
                None
            }
        })
        .collect()
}
