use crate::models::{Course, CourseReport, ProgressSummary, StudentProgress, SubmissionStatus};
use crate::store::Cell;
use crate::sync::SyncSummary;
use crate::ui::state::{AppState, FetchProgress};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell as TableCell, Gauge, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame,
};

const TITLE: &str = "Classroom Cells";

pub fn render_ui(frame: &mut Frame, state: &AppState) {
    match state {
        AppState::LoadingCourses => render_loading(frame, "Loading courses..."),
        AppState::CourseSelection {
            courses,
            selected_index,
        } => render_course_selection(frame, courses, *selected_index),
        AppState::FetchingProgress { course, progress } => {
            render_fetching_progress(frame, course, progress)
        }
        AppState::ProgressReport {
            report,
            summary,
            selected_index,
            notice,
        } => render_progress_report(frame, report, summary, *selected_index, notice.as_deref()),
        AppState::StudentDetail {
            report, row_index, ..
        } => {
            if let Some(row) = report.rows.get(*row_index) {
                render_student_detail(frame, row)
            }
        }
        AppState::Syncing => render_loading(frame, "Syncing courses, teachers and students..."),
        AppState::SyncComplete { summary } => render_sync_complete(frame, summary),
        AppState::CellList {
            course,
            cells,
            selected_index,
            notice,
        } => render_cell_list(frame, course, cells, *selected_index, notice.as_deref()),
        AppState::CellNameInput { course, name_input } => {
            render_cell_name_input(frame, course, name_input)
        }
        AppState::Error { message } => render_error(frame, message),
    }
}

fn selected_style(selected: bool) -> Style {
    if selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn help_bar(text: &str) -> Paragraph<'_> {
    Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
}

fn status_color(status: SubmissionStatus) -> Color {
    match status {
        SubmissionStatus::Assigned => Color::Blue,
        SubmissionStatus::TurnedIn => Color::Green,
        SubmissionStatus::TurnedInLate => Color::Yellow,
        SubmissionStatus::Missing => Color::Red,
        SubmissionStatus::Returned => Color::Magenta,
    }
}

fn render_loading(frame: &mut Frame, message: &str) {
    let area = frame.area();
    let block = Block::default()
        .title(TITLE)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(message)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn render_course_selection(frame: &mut Frame, courses: &[Course], selected_index: usize) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let items: Vec<ListItem> = courses
        .iter()
        .enumerate()
        .map(|(i, course)| {
            let prefix = if i == selected_index { "> " } else { "  " };
            let section = course
                .section
                .as_deref()
                .map(|s| format!(" ({})", s))
                .unwrap_or_default();
            let archived = match course.course_state.as_deref() {
                Some("ARCHIVED") => " [Archived]",
                _ => "",
            };
            let content = format!("{}{}{}{}", prefix, course.name, section, archived);

            ListItem::new(content).style(selected_style(i == selected_index))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Select Course")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, chunks[0]);

    let help = format!(
        "Found: {} course(s) | [↑↓: Navigate | Enter: Progress | s: Sync | c: Cells | q: Quit]",
        courses.len()
    );
    frame.render_widget(help_bar(&help), chunks[1]);
}

fn render_fetching_progress(frame: &mut Frame, course: &Course, progress: &FetchProgress) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(area);

    let title = Paragraph::new(format!("Fetching Progress: {}", course.name))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(title, chunks[0]);

    let gauge = Gauge::default()
        .block(Block::default().title("Progress").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(progress.percentage().min(100.0) as u16)
        .label(format!(
            "{}/{} students",
            progress.completed, progress.total_students
        ));

    frame.render_widget(gauge, chunks[1]);

    // Status messages (scrolling log)
    let status_items: Vec<ListItem> = progress
        .status_messages
        .iter()
        .map(|msg| ListItem::new(format!("• {}", msg)).style(Style::default().fg(Color::Green)))
        .collect();

    let status_list = List::new(status_items).block(
        Block::default()
            .title("Status Log")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );

    frame.render_widget(status_list, chunks[2]);

    let info_text = if progress.current_student.is_empty() {
        "Preparing...".to_string()
    } else {
        format!("Last student: {}", progress.current_student)
    };

    let info = Paragraph::new(info_text)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(info, chunks[3]);
}

fn render_progress_report(
    frame: &mut Frame,
    report: &CourseReport,
    summary: &ProgressSummary,
    selected_index: usize,
    notice: Option<&str>,
) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(area);

    let totals = &summary.totals;
    let mut header_lines = vec![Line::from(vec![
        Span::styled("Students: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{} ", summary.students_processed)),
        Span::styled("Errors: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{} ", summary.errors)),
        Span::styled("Completion: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "{:.1}% | A {} E {} R {} S {} D {}",
            summary.completion_rate,
            totals.assigned,
            totals.turned_in,
            totals.turned_in_late,
            totals.missing,
            totals.returned
        )),
    ])];
    if let Some(notice) = notice {
        header_lines.push(Line::styled(notice, Style::default().fg(Color::Green)));
    }

    let header = Paragraph::new(header_lines).block(
        Block::default()
            .title(format!("Progress: {}", report.course.name))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(header, chunks[0]);

    let rows: Vec<Row> = report
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let stats = &row.stats;
            let name = if row.error.is_some() {
                format!("{} ⚠", row.name)
            } else {
                row.name.clone()
            };
            Row::new(vec![
                TableCell::from(name),
                TableCell::from(row.cell.clone().unwrap_or_else(|| "-".to_string())),
                TableCell::from(stats.assigned.to_string()),
                TableCell::from(stats.turned_in.to_string()),
                TableCell::from(stats.turned_in_late.to_string()),
                TableCell::from(stats.missing.to_string()),
                TableCell::from(stats.returned.to_string()),
            ])
            .style(selected_style(i == selected_index))
        })
        .collect();

    let widths = [
        Constraint::Min(20),
        Constraint::Length(16),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(10),
        Constraint::Length(11),
        Constraint::Length(10),
    ];
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec![
                "Student",
                "Cell",
                "Asignada",
                "Entregada",
                "Con retraso",
                "Sin entregar",
                "Devuelta",
            ])
            .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(table, chunks[1]);

    frame.render_widget(
        help_bar("[↑↓: Navigate | Enter: Detail | e: Export CSV | r: Refresh | Esc: Back | q: Quit]"),
        chunks[2],
    );
}

fn render_student_detail(frame: &mut Frame, row: &StudentProgress) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    let mut info_lines = vec![
        Line::from(vec![
            Span::styled("Student: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("{} <{}>", row.name, row.email)),
        ]),
        Line::from(vec![
            Span::styled("Teachers: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(row.teachers.join(", ")),
        ]),
    ];
    if let Some(error) = &row.error {
        info_lines.push(Line::styled(
            format!("Error: {}", error),
            Style::default().fg(Color::Red),
        ));
    }

    let info = Paragraph::new(info_lines)
        .block(
            Block::default()
                .title(row.course_name.as_str())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(info, chunks[0]);

    let items: Vec<ListItem> = row
        .statuses
        .values()
        .map(|(title, status)| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<22}", status.label()),
                    Style::default().fg(status_color(*status)),
                ),
                Span::raw(title.as_str()),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!("Assignments ({})", row.stats.total()))
            .borders(Borders::ALL),
    );
    frame.render_widget(list, chunks[1]);

    frame.render_widget(help_bar("[Esc: Back | q: Quit]"), chunks[2]);
}

fn render_sync_complete(frame: &mut Frame, summary: &SyncSummary) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(label.to_string(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(value),
        ])
    };

    let mut text = vec![
        Line::from(vec![Span::styled(
            "Roster Synced!",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        field("Courses: ", summary.courses_synced.to_string()),
        field("Teachers found: ", summary.teachers_found.to_string()),
        field(
            "Teachers created / updated: ",
            format!("{} / {}", summary.teachers_created, summary.teachers_updated),
        ),
        field(
            "Students created / updated: ",
            format!("{} / {}", summary.students_created, summary.students_updated),
        ),
    ];
    if !summary.failed_courses.is_empty() {
        text.push(Line::styled(
            format!("Failed courses: {}", summary.failed_courses.join(", ")),
            Style::default().fg(Color::Red),
        ));
    }

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(paragraph, chunks[0]);
    frame.render_widget(help_bar("[Enter: Continue | q: Quit]"), chunks[1]);
}

fn render_cell_list(
    frame: &mut Frame,
    course: &Course,
    cells: &[Cell],
    selected_index: usize,
    notice: Option<&str>,
) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let items: Vec<ListItem> = if cells.is_empty() {
        vec![ListItem::new("  No cells yet. Press n to create one.")]
    } else {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let prefix = if i == selected_index { "> " } else { "  " };
                let teachers: Vec<&str> = cell.teachers().map(|m| m.name.as_str()).collect();
                let content = format!(
                    "{}{} - {} student(s){}",
                    prefix,
                    cell.name,
                    cell.students().count(),
                    if teachers.is_empty() {
                        String::new()
                    } else {
                        format!(" | {}", teachers.join(", "))
                    }
                );
                ListItem::new(content).style(selected_style(i == selected_index))
            })
            .collect()
    };

    let title = match notice {
        Some(notice) => format!("Cells: {} - {}", course.name, notice),
        None => format!("Cells: {}", course.name),
    };
    let list = List::new(items).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, chunks[0]);
    frame.render_widget(
        help_bar("[↑↓: Navigate | n: New cell | d: Delete | Esc: Back | q: Quit]"),
        chunks[1],
    );
}

fn render_cell_name_input(frame: &mut Frame, course: &Course, name_input: &str) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(area);

    let title = Paragraph::new(format!("New cell for: {}", course.name))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(title, chunks[0]);

    let input = Paragraph::new(format!("Name: {}_", name_input)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(selected_style(true)),
    );

    frame.render_widget(input, chunks[1]);
    frame.render_widget(help_bar("[Enter: Create | Esc: Cancel]"), chunks[3]);
}

fn render_error(frame: &mut Frame, message: &str) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let text = vec![
        Line::from(vec![Span::styled(
            "Error",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from(message),
    ];

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, chunks[0]);
    frame.render_widget(help_bar("[Enter: Continue | q: Quit]"), chunks[1]);
}
