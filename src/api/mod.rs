mod classroom;

pub use classroom::ClassroomClient;

use crate::models::{Course, CourseUser, CourseWorkPayload, StudentSubmissionPayload};
use anyhow::Result;
use async_trait::async_trait;

/// Read-only view of the classroom API used by sync and the submission fetcher.
#[async_trait]
pub trait ClassroomSource: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>>;

    async fn list_students(&self, course_id: &str) -> Result<Vec<CourseUser>>;

    async fn list_teachers(&self, course_id: &str) -> Result<Vec<CourseUser>>;

    async fn list_course_work(&self, course_id: &str) -> Result<Vec<CourseWorkPayload>>;

    async fn list_student_submissions(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Vec<StudentSubmissionPayload>>;
}
