use crate::api::ClassroomSource;
use crate::models::CourseUser;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Teacher lookups memoized by course id for the lifetime of one run.
///
/// Entries are only ever inserted, never replaced. Failed lookups are not
/// stored, so the next caller simply fetches again.
#[derive(Default)]
pub struct TeacherCache {
    entries: DashMap<String, Arc<Vec<CourseUser>>>,
}

impl TeacherCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, course_id: &str) -> Option<Arc<Vec<CourseUser>>> {
        self.entries.get(course_id).map(|e| Arc::clone(e.value()))
    }

    pub async fn teachers_for(
        &self,
        source: &dyn ClassroomSource,
        course_id: &str,
    ) -> Result<Arc<Vec<CourseUser>>> {
        if let Some(hit) = self.get(course_id) {
            return Ok(hit);
        }

        let fetched = Arc::new(source.list_teachers(course_id).await?);
        debug!(course_id, count = fetched.len(), "Cached teacher lookup");

        // A concurrent caller may have filled the slot first; keep theirs
        let entry = self
            .entries
            .entry(course_id.to_string())
            .or_insert(fetched);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Display names of a course's teachers.
pub fn teacher_names(teachers: &[CourseUser]) -> Vec<String> {
    teachers
        .iter()
        .map(|t| t.full_name().unwrap_or("Sin nombre").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClassroom;

    #[tokio::test]
    async fn test_lookup_is_memoized_per_course() {
        let source = FakeClassroom::default()
            .with_teacher("c1", "t1", "Marta Ruiz")
            .with_teacher("c2", "t2", "Luis Gil");
        let cache = TeacherCache::new();

        let first = cache.teachers_for(&source, "c1").await.unwrap();
        let second = cache.teachers_for(&source, "c1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.teacher_calls(), 1);

        let other = cache.teachers_for(&source, "c2").await.unwrap();
        assert_eq!(teacher_names(&other), vec!["Luis Gil".to_string()]);
        assert_eq!(source.teacher_calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let source = FakeClassroom::default().failing_teachers("c1");
        let cache = TeacherCache::new();

        assert!(cache.teachers_for(&source, "c1").await.is_err());
        assert!(cache.teachers_for(&source, "c1").await.is_err());
        assert_eq!(source.teacher_calls(), 2);
        assert!(cache.is_empty());
    }
}
