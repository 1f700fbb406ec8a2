use crate::models::{Course, CourseReport, ProgressSummary};
use crate::store::Cell;
use crate::sync::SyncSummary;

#[derive(Debug, Clone)]
pub enum AppState {
    LoadingCourses,
    CourseSelection {
        courses: Vec<Course>,
        selected_index: usize,
    },
    FetchingProgress {
        course: Course,
        progress: FetchProgress,
    },
    ProgressReport {
        report: CourseReport,
        summary: ProgressSummary,
        selected_index: usize,
        notice: Option<String>,
    },
    StudentDetail {
        report: CourseReport,
        summary: ProgressSummary,
        row_index: usize,
    },
    Syncing,
    SyncComplete {
        summary: SyncSummary,
    },
    CellList {
        course: Course,
        cells: Vec<Cell>,
        selected_index: usize,
        notice: Option<String>,
    },
    CellNameInput {
        course: Course,
        name_input: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct FetchProgress {
    pub total_students: usize,
    pub completed: usize,
    pub current_student: String,
    pub status_messages: Vec<String>,
}

impl FetchProgress {
    pub fn new(total_students: usize) -> Self {
        Self {
            total_students,
            completed: 0,
            current_student: String::new(),
            status_messages: vec!["Initializing...".to_string()],
        }
    }

    pub fn add_status(&mut self, message: String) {
        self.status_messages.push(message);
        // Keep only the last 20 messages
        if self.status_messages.len() > 20 {
            self.status_messages.remove(0);
        }
    }

    pub fn update(&mut self, completed: usize, total: usize, student: &str) {
        self.completed = completed;
        self.total_students = total;
        self.current_student = student.to_string();
        self.add_status(format!("[{}/{}] {}", completed, total, student));
    }

    pub fn percentage(&self) -> f64 {
        if self.total_students == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total_students as f64) * 100.0
        }
    }
}

pub fn select_previous(index: usize) -> usize {
    index.saturating_sub(1)
}

pub fn select_next(index: usize, len: usize) -> usize {
    if index < len.saturating_sub(1) {
        index + 1
    } else {
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let mut progress = FetchProgress::new(0);
        assert_eq!(progress.percentage(), 0.0);

        progress.update(1, 4, "Ana");
        assert_eq!(progress.percentage(), 25.0);
        assert_eq!(progress.current_student, "Ana");
        assert_eq!(progress.status_messages.last().unwrap(), "[1/4] Ana");
    }

    #[test]
    fn test_status_log_is_bounded() {
        let mut progress = FetchProgress::new(30);
        for i in 0..30 {
            progress.add_status(format!("line {}", i));
        }
        assert_eq!(progress.status_messages.len(), 20);
        assert_eq!(progress.status_messages[0], "line 10");
    }

    #[test]
    fn test_selection_bounds() {
        assert_eq!(select_previous(0), 0);
        assert_eq!(select_previous(3), 2);
        assert_eq!(select_next(0, 3), 1);
        assert_eq!(select_next(2, 3), 2);
        assert_eq!(select_next(0, 0), 0);
    }
}
