use crate::api::{ClassroomClient, ClassroomSource};
use crate::cache::TeacherCache;
use crate::export;
use crate::fetcher::{self, FetchOptions, ProgressFn};
use crate::models::{Course, CourseReport, ProgressSummary};
use crate::store::Store;
use crate::sync;
use crate::ui::render::render_ui;
use crate::ui::state::{select_next, select_previous, AppState, FetchProgress};
use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A course batch running in the background, polled from the event loop
struct PendingFetch {
    updates: UnboundedReceiver<(usize, usize, String)>,
    task: JoinHandle<Result<CourseReport>>,
}

pub struct App {
    client: ClassroomClient,
    store: Store,
    options: FetchOptions,
    export_dir: PathBuf,
    state: AppState,
    pending: Option<PendingFetch>,
}

impl App {
    pub fn new(
        client: ClassroomClient,
        store: Store,
        options: FetchOptions,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            store,
            options,
            export_dir,
            state: AppState::LoadingCourses,
            pending: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        loop {
            terminal.draw(|f| render_ui(f, &self.state))?;

            // Loading states do their work after they have been drawn once
            match self.state {
                AppState::LoadingCourses => {
                    self.load_courses().await;
                    continue;
                }
                AppState::Syncing => {
                    self.run_sync().await;
                    continue;
                }
                _ => {}
            }

            self.poll_fetch().await;

            if event::poll(std::time::Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key_event(key)? {
                        break; // User quit
                    }
                }
            }

            // Small yield to allow other async tasks to run
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
        Ok(())
    }

    async fn load_courses(&mut self) {
        self.state = match self.client.list_courses().await {
            Ok(courses) if courses.is_empty() => AppState::Error {
                message: "No courses found. Please check your access token scopes.".to_string(),
            },
            Ok(courses) => AppState::CourseSelection {
                courses,
                selected_index: 0,
            },
            Err(e) => {
                error!("Failed to load courses: {:#}", e);
                AppState::Error {
                    message: format!("Failed to load courses: {:#}", e),
                }
            }
        };
    }

    async fn run_sync(&mut self) {
        let cache = TeacherCache::new();
        self.state = match sync::sync_roster(&self.client, &self.store, &cache).await {
            Ok(summary) => AppState::SyncComplete { summary },
            Err(e) => {
                error!("Roster sync failed: {:#}", e);
                AppState::Error {
                    message: format!("Roster sync failed: {:#}", e),
                }
            }
        };
    }

    fn start_fetch(&mut self, course: Course) {
        let (tx, updates) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let cache = Arc::new(TeacherCache::new());
        let options = self.options;
        let task_course = course.clone();

        info!(course_id = %course.id, "Fetching course progress");
        let task = tokio::spawn(async move {
            let callback: &ProgressFn<'_> = &move |completed, total, student| {
                let _ = tx.send((completed, total, student.to_string()));
            };
            fetcher::fetch_course_progress(
                &client,
                &task_course,
                &cache,
                options,
                Utc::now(),
                Some(callback),
            )
            .await
        });

        let mut progress = FetchProgress::new(0);
        progress.add_status(format!("Fetching students of {}...", course.name));
        self.pending = Some(PendingFetch { updates, task });
        self.state = AppState::FetchingProgress { course, progress };
    }

    async fn poll_fetch(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        while let Ok((completed, total, student)) = pending.updates.try_recv() {
            if let AppState::FetchingProgress { progress, .. } = &mut self.state {
                progress.update(completed, total, &student);
            }
        }

        if !pending.task.is_finished() {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        self.state = match pending.task.await {
            Ok(Ok(mut report)) => {
                let cells = self.cell_names(&report.course);
                fetcher::apply_cells(&mut report, &cells);
                let summary = ProgressSummary::calculate(&report.rows);
                AppState::ProgressReport {
                    report,
                    summary,
                    selected_index: 0,
                    notice: None,
                }
            }
            Ok(Err(e)) => AppState::Error {
                message: format!("Failed to fetch progress: {:#}", e),
            },
            Err(e) => AppState::Error {
                message: format!("Progress task failed: {}", e),
            },
        };
    }

    /// Cell names for the course's students, empty when the course was never synced
    fn cell_names(&self, course: &Course) -> HashMap<String, String> {
        match self.store.find_course(&course.id) {
            Ok(Some(_)) => self.store.cell_names_by_student(&course.id).unwrap_or_else(|e| {
                warn!(course_id = %course.id, "Failed to read cells: {}", e);
                HashMap::new()
            }),
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(course_id = %course.id, "Failed to read course: {}", e);
                HashMap::new()
            }
        }
    }

    fn cell_list(&self, course: Course, notice: Option<String>) -> AppState {
        match self.store.list_cells(&course.id) {
            Ok(cells) => AppState::CellList {
                course,
                cells,
                selected_index: 0,
                notice,
            },
            Err(e) => AppState::Error {
                message: format!(
                    "Failed to load cells for {}: {}. Sync the roster first (s).",
                    course.name, e
                ),
            },
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        let current_state = std::mem::replace(&mut self.state, AppState::LoadingCourses);

        self.state = match current_state {
            AppState::CourseSelection {
                courses,
                selected_index,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Up => AppState::CourseSelection {
                    courses,
                    selected_index: select_previous(selected_index),
                },
                KeyCode::Down => AppState::CourseSelection {
                    selected_index: select_next(selected_index, courses.len()),
                    courses,
                },
                KeyCode::Enter => {
                    self.start_fetch(courses[selected_index].clone());
                    return Ok(false);
                }
                KeyCode::Char('s') => AppState::Syncing,
                KeyCode::Char('c') => self.cell_list(courses[selected_index].clone(), None),
                _ => AppState::CourseSelection {
                    courses,
                    selected_index,
                },
            },
            AppState::ProgressReport {
                report,
                summary,
                selected_index,
                notice,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => AppState::LoadingCourses,
                KeyCode::Up => AppState::ProgressReport {
                    report,
                    summary,
                    selected_index: select_previous(selected_index),
                    notice,
                },
                KeyCode::Down => AppState::ProgressReport {
                    selected_index: select_next(selected_index, report.rows.len()),
                    report,
                    summary,
                    notice,
                },
                KeyCode::Enter if !report.rows.is_empty() => AppState::StudentDetail {
                    report,
                    summary,
                    row_index: selected_index,
                },
                KeyCode::Char('r') => {
                    self.start_fetch(report.course);
                    return Ok(false);
                }
                KeyCode::Char('e') => {
                    let notice = match export::export_progress_to_csv(&report, &self.export_dir) {
                        Ok(path) => {
                            info!(file = %path.display(), "Exported progress report");
                            format!("Exported to {}", path.display())
                        }
                        Err(e) => format!("Export failed: {:#}", e),
                    };
                    AppState::ProgressReport {
                        report,
                        summary,
                        selected_index,
                        notice: Some(notice),
                    }
                }
                _ => AppState::ProgressReport {
                    report,
                    summary,
                    selected_index,
                    notice,
                },
            },
            AppState::StudentDetail {
                report,
                summary,
                row_index,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc | KeyCode::Enter => AppState::ProgressReport {
                    report,
                    summary,
                    selected_index: row_index,
                    notice: None,
                },
                _ => AppState::StudentDetail {
                    report,
                    summary,
                    row_index,
                },
            },
            AppState::SyncComplete { summary } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Enter | KeyCode::Esc => AppState::LoadingCourses,
                _ => AppState::SyncComplete { summary },
            },
            AppState::CellList {
                course,
                cells,
                selected_index,
                notice,
            } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Esc => AppState::LoadingCourses,
                KeyCode::Up => AppState::CellList {
                    course,
                    cells,
                    selected_index: select_previous(selected_index),
                    notice,
                },
                KeyCode::Down => AppState::CellList {
                    selected_index: select_next(selected_index, cells.len()),
                    course,
                    cells,
                    notice,
                },
                KeyCode::Char('n') => AppState::CellNameInput {
                    course,
                    name_input: String::new(),
                },
                KeyCode::Char('d') if !cells.is_empty() => {
                    let cell = &cells[selected_index];
                    let notice = match self.store.delete_cell(&cell.id) {
                        Ok(()) => format!("Deleted cell {}", cell.name),
                        Err(e) => format!("Delete failed: {}", e),
                    };
                    self.cell_list(course, Some(notice))
                }
                _ => AppState::CellList {
                    course,
                    cells,
                    selected_index,
                    notice,
                },
            },
            AppState::CellNameInput {
                course,
                mut name_input,
            } => match key.code {
                KeyCode::Esc => self.cell_list(course, None),
                KeyCode::Enter => {
                    let notice = match self.store.create_cell(&course.id, &name_input, None) {
                        Ok(cell) => format!("Created cell {}", cell.name),
                        Err(e) => format!("Create failed: {}", e),
                    };
                    self.cell_list(course, Some(notice))
                }
                KeyCode::Backspace => {
                    name_input.pop();
                    AppState::CellNameInput { course, name_input }
                }
                KeyCode::Char(c) => {
                    if name_input.chars().count() < 60 {
                        name_input.push(c);
                    }
                    AppState::CellNameInput { course, name_input }
                }
                _ => AppState::CellNameInput { course, name_input },
            },
            AppState::Error { message } => match key.code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Enter | KeyCode::Esc => AppState::LoadingCourses,
                _ => AppState::Error { message },
            },
            // Loading and fetching states ignore input
            state => match key.code {
                KeyCode::Char('q') => return Ok(true),
                _ => state,
            },
        };

        Ok(false)
    }
}
