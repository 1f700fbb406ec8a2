//! In-memory `ClassroomSource` for unit tests.

use crate::api::ClassroomSource;
use crate::models::{
    Course, CourseUser, CourseWorkPayload, DatePayload, StudentSubmissionPayload, UserName,
    UserProfile,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct FakeClassroom {
    courses: Vec<Course>,
    students: HashMap<String, Vec<CourseUser>>,
    teachers: HashMap<String, Vec<CourseUser>>,
    course_work: HashMap<String, Vec<CourseWorkPayload>>,
    submissions: HashMap<(String, String), Vec<StudentSubmissionPayload>>,
    failing: HashSet<String>,
    slow_students: HashMap<String, Duration>,
    teacher_calls: AtomicUsize,
}

pub fn user(id: &str, name: &str) -> CourseUser {
    CourseUser {
        course_id: None,
        user_id: Some(id.to_string()),
        profile: Some(UserProfile {
            id: Some(id.to_string()),
            name: Some(UserName {
                full_name: Some(name.to_string()),
            }),
            email_address: Some(format!("{}@school.test", id)),
        }),
    }
}

impl FakeClassroom {
    pub fn with_course(mut self, id: &str, name: &str) -> Self {
        self.courses.push(Course {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn with_student(mut self, course_id: &str, id: &str, name: &str) -> Self {
        self.students
            .entry(course_id.to_string())
            .or_default()
            .push(user(id, name));
        self
    }

    pub fn with_student_user(mut self, course_id: &str, student: CourseUser) -> Self {
        self.students
            .entry(course_id.to_string())
            .or_default()
            .push(student);
        self
    }

    pub fn with_teacher(mut self, course_id: &str, id: &str, name: &str) -> Self {
        self.teachers
            .entry(course_id.to_string())
            .or_default()
            .push(user(id, name));
        self
    }

    pub fn with_teacher_user(mut self, course_id: &str, teacher: CourseUser) -> Self {
        self.teachers
            .entry(course_id.to_string())
            .or_default()
            .push(teacher);
        self
    }

    /// Course work due at the end of the given day, or undated.
    pub fn with_work(mut self, course_id: &str, id: &str, due: Option<(i32, u32, u32)>) -> Self {
        self.course_work
            .entry(course_id.to_string())
            .or_default()
            .push(CourseWorkPayload {
                id: Some(id.to_string()),
                title: Some(format!("Work {}", id)),
                due_date: due.map(|(year, month, day)| DatePayload {
                    year: Some(year),
                    month: Some(month),
                    day: Some(day),
                }),
                due_time: None,
                state: Some("PUBLISHED".to_string()),
            });
        self
    }

    pub fn with_submission(
        mut self,
        course_id: &str,
        user_id: &str,
        work_id: &str,
        state: &str,
        late: bool,
    ) -> Self {
        self.submissions
            .entry((course_id.to_string(), user_id.to_string()))
            .or_default()
            .push(StudentSubmissionPayload {
                id: Some(format!("{}-{}", user_id, work_id)),
                course_work_id: Some(work_id.to_string()),
                user_id: Some(user_id.to_string()),
                state: Some(state.to_string()),
                late: Some(late),
                update_time: None,
            });
        self
    }

    fn failing_on(mut self, key: String) -> Self {
        self.failing.insert(key);
        self
    }

    pub fn failing_students(self, course_id: &str) -> Self {
        self.failing_on(format!("students:{}", course_id))
    }

    pub fn failing_teachers(self, course_id: &str) -> Self {
        self.failing_on(format!("teachers:{}", course_id))
    }

    pub fn failing_course_work(self, course_id: &str) -> Self {
        self.failing_on(format!("courseWork:{}", course_id))
    }

    pub fn failing_submissions(self, user_id: &str) -> Self {
        self.failing_on(format!("submissions:{}", user_id))
    }

    pub fn failing_courses(self) -> Self {
        self.failing_on("courses".to_string())
    }

    pub fn slow_submissions(mut self, user_id: &str, delay: Duration) -> Self {
        self.slow_students.insert(user_id.to_string(), delay);
        self
    }

    pub fn teacher_calls(&self) -> usize {
        self.teacher_calls.load(Ordering::SeqCst)
    }

    fn check(&self, key: String) -> Result<()> {
        if self.failing.contains(&key) {
            anyhow::bail!("simulated failure for {}", key);
        }
        Ok(())
    }
}

#[async_trait]
impl ClassroomSource for FakeClassroom {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.check("courses".to_string())?;
        Ok(self.courses.clone())
    }

    async fn list_students(&self, course_id: &str) -> Result<Vec<CourseUser>> {
        self.check(format!("students:{}", course_id))?;
        Ok(self.students.get(course_id).cloned().unwrap_or_default())
    }

    async fn list_teachers(&self, course_id: &str) -> Result<Vec<CourseUser>> {
        self.teacher_calls.fetch_add(1, Ordering::SeqCst);
        self.check(format!("teachers:{}", course_id))?;
        Ok(self.teachers.get(course_id).cloned().unwrap_or_default())
    }

    async fn list_course_work(&self, course_id: &str) -> Result<Vec<CourseWorkPayload>> {
        self.check(format!("courseWork:{}", course_id))?;
        Ok(self.course_work.get(course_id).cloned().unwrap_or_default())
    }

    async fn list_student_submissions(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Vec<StudentSubmissionPayload>> {
        if let Some(delay) = self.slow_students.get(user_id) {
            tokio::time::sleep(*delay).await;
        }
        self.check(format!("submissions:{}", user_id))?;
        Ok(self
            .submissions
            .get(&(course_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
