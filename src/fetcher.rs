use crate::api::ClassroomSource;
use crate::cache::{teacher_names, TeacherCache};
use crate::classifier;
use crate::models::{Assignment, Course, CourseReport, CourseUser, StudentProgress};
use crate::parser;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Progress updates as `(completed, total, student_name)`
pub type ProgressFn<'a> = dyn Fn(usize, usize, &str) + Send + Sync + 'a;

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Students fetched at the same time
    pub concurrency: usize,
    /// Upper bound for one student's fetch + classify
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Fetch one student's submissions and classify them against the course's assignments
pub async fn fetch_student_progress(
    source: &dyn ClassroomSource,
    course: &Course,
    student: &CourseUser,
    assignments: &[Assignment],
    now: DateTime<Utc>,
) -> Result<StudentProgress> {
    let student_id = student
        .classroom_id()
        .context("Student has no classroom user id")?;

    let payloads = source
        .list_student_submissions(&course.id, student_id)
        .await
        .context(format!("Failed to fetch submissions for {}", student_id))?;
    let submissions = parser::parse_submissions(&payloads);

    let classified = classifier::classify_assignments(assignments, &submissions, now);
    let mut row = StudentProgress::new(course, student);
    for (assignment, status) in classified {
        row.stats.record(status);
        row.statuses
            .insert(assignment.id.clone(), (assignment.title.clone(), status));
    }

    Ok(row)
}

/// Fetch and classify every student of a course.
///
/// Only a failure to list the course's students is an error. Any other
/// failure is confined to the students it affects, whose rows are zero-filled
/// and carry the error text.
pub async fn fetch_course_progress(
    source: &dyn ClassroomSource,
    course: &Course,
    cache: &TeacherCache,
    options: FetchOptions,
    now: DateTime<Utc>,
    progress: Option<&ProgressFn<'_>>,
) -> Result<CourseReport> {
    let students = source
        .list_students(&course.id)
        .await
        .context(format!("Failed to fetch students for course {}", course.name))?;

    let teachers = match cache.teachers_for(source, &course.id).await {
        Ok(teachers) => teacher_names(&teachers),
        Err(e) => {
            warn!(course_id = %course.id, "Teacher lookup failed: {:#}", e);
            Vec::new()
        }
    };

    let assignments = match source.list_course_work(&course.id).await {
        Ok(payloads) => Ok(parser::parse_assignments(&payloads)),
        Err(e) => {
            warn!(course_id = %course.id, "Course work fetch failed: {:#}", e);
            Err(format!("Failed to fetch course work: {:#}", e))
        }
    };

    let total = students.len();
    let completed = AtomicUsize::new(0);

    let mut rows: Vec<StudentProgress> = match &assignments {
        Err(message) => students
            .iter()
            .map(|s| StudentProgress::unavailable(course, s, message.clone()))
            .collect(),
        Ok(assignments) => {
            let completed = &completed;
            // Futures are built up front so the stream holds no closure over borrowed students
            let rows: Vec<_> = students
                .iter()
                .map(|student| {
                    async move {
                        let row =
                            student_row(source, course, student, assignments, options, now).await;
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        if let Some(callback) = progress {
                            callback(done, total, &row.name);
                        }
                        row
                    }
                    .boxed()
                })
                .collect();
            stream::iter(rows)
                .buffered(options.concurrency.max(1))
                .collect()
                .await
        }
    };

    for row in &mut rows {
        row.teachers = teachers.clone();
    }

    let failed = rows.iter().filter(|r| r.error.is_some()).count();
    info!(
        course_id = %course.id,
        students = rows.len(),
        failed,
        "Computed course progress"
    );

    Ok(CourseReport {
        course: course.clone(),
        rows,
        error: None,
    })
}

/// One student's row; failures and timeouts become a zero-filled row with the error text
async fn student_row(
    source: &dyn ClassroomSource,
    course: &Course,
    student: &CourseUser,
    assignments: &[Assignment],
    options: FetchOptions,
    now: DateTime<Utc>,
) -> StudentProgress {
    let outcome = tokio::time::timeout(
        options.timeout,
        fetch_student_progress(source, course, student, assignments, now),
    )
    .await;

    match outcome {
        Ok(Ok(row)) => row,
        Ok(Err(e)) => {
            warn!(
                course_id = %course.id,
                student = ?student.classroom_id(),
                "Using empty stats: {:#}",
                e
            );
            StudentProgress::unavailable(course, student, format!("{:#}", e))
        }
        Err(_) => {
            warn!(
                course_id = %course.id,
                student = ?student.classroom_id(),
                "Student fetch timed out"
            );
            StudentProgress::unavailable(
                course,
                student,
                format!("Timed out after {}s", options.timeout.as_secs()),
            )
        }
    }
}

/// Fetch progress for several courses; a failing course does not stop the others
pub async fn fetch_all_progress(
    source: &dyn ClassroomSource,
    courses: &[Course],
    cache: &TeacherCache,
    options: FetchOptions,
    now: DateTime<Utc>,
    progress: Option<&ProgressFn<'_>>,
) -> Vec<CourseReport> {
    let mut reports = Vec::with_capacity(courses.len());

    for course in courses {
        match fetch_course_progress(source, course, cache, options, now, progress).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(course_id = %course.id, "Skipping course: {:#}", e);
                reports.push(CourseReport {
                    course: course.clone(),
                    rows: Vec::new(),
                    error: Some(format!("{:#}", e)),
                });
            }
        }
    }

    info!(
        courses = reports.len(),
        cached_teacher_lookups = cache.len(),
        "Computed progress for all courses"
    );
    reports
}

/// Attach cell names (keyed by classroom user id) to a report's rows
pub fn apply_cells(report: &mut CourseReport, cells: &HashMap<String, String>) {
    for row in &mut report.rows {
        row.cell = cells.get(&row.student_id).cloned();
    }
}
