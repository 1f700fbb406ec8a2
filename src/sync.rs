use crate::api::ClassroomSource;
use crate::cache::TeacherCache;
use crate::models::Course;
use crate::store::{Role, Store, UpsertOutcome};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub courses_synced: usize,
    pub teachers_found: usize,
    pub teachers_created: usize,
    pub teachers_updated: usize,
    pub students_created: usize,
    pub students_updated: usize,
    pub failed_courses: Vec<String>,
}

impl SyncSummary {
    fn count(&mut self, role: Role, outcome: UpsertOutcome) {
        match (role, outcome) {
            (Role::Teacher, UpsertOutcome::Created) => self.teachers_created += 1,
            (Role::Teacher, UpsertOutcome::Updated) => self.teachers_updated += 1,
            (Role::Student, UpsertOutcome::Created) => self.students_created += 1,
            (Role::Student, UpsertOutcome::Updated) => self.students_updated += 1,
        }
    }
}

/// Pull courses, teachers and students into the local store.
///
/// Listing courses is the only fatal step. A course whose roster cannot be
/// fetched is recorded in `failed_courses` and skipped.
pub async fn sync_roster(
    source: &dyn ClassroomSource,
    store: &Store,
    cache: &TeacherCache,
) -> Result<SyncSummary> {
    let courses = source
        .list_courses()
        .await
        .context("Failed to list courses")?;
    info!(count = courses.len(), "Syncing courses");

    let mut summary = SyncSummary::default();

    for course in &courses {
        store
            .upsert_course(course)
            .context(format!("Failed to store course {}", course.id))?;
        summary.courses_synced += 1;

        if let Err(e) = sync_course_roster(source, store, cache, course, &mut summary).await {
            warn!(course_id = %course.id, "Roster sync failed: {:#}", e);
            summary.failed_courses.push(course.id.clone());
        }
    }

    info!(
        courses = summary.courses_synced,
        teachers_found = summary.teachers_found,
        teachers_created = summary.teachers_created,
        students_created = summary.students_created,
        failed = summary.failed_courses.len(),
        "Roster sync finished"
    );
    Ok(summary)
}

async fn sync_course_roster(
    source: &dyn ClassroomSource,
    store: &Store,
    cache: &TeacherCache,
    course: &Course,
    summary: &mut SyncSummary,
) -> Result<()> {
    let teachers = cache
        .teachers_for(source, &course.id)
        .await
        .context("Failed to fetch teachers")?;
    let students = source
        .list_students(&course.id)
        .await
        .context("Failed to fetch students")?;

    summary.teachers_found += teachers.len();
    for teacher in teachers.iter() {
        if teacher.profile.as_ref().and_then(|p| p.id.as_deref()).is_none() {
            warn!(course_id = %course.id, "Skipping teacher without profile id");
            continue;
        }
        let (stored, outcome) = store
            .upsert_user(teacher, Role::Teacher)
            .context("Failed to store teacher")?;
        debug!(user_id = %stored.id, ?outcome, "Teacher synced");
        summary.count(Role::Teacher, outcome);
    }

    for student in &students {
        if student.classroom_id().is_none() {
            warn!(course_id = %course.id, "Skipping student without user id");
            continue;
        }
        let (_, outcome) = store
            .upsert_user(student, Role::Student)
            .context("Failed to store student")?;
        summary.count(Role::Student, outcome);
    }

    Ok(())
}
