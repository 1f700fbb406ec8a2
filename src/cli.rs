use crate::api::{ClassroomClient, ClassroomSource};
use crate::cache::TeacherCache;
use crate::export;
use crate::fetcher::{self, FetchOptions};
use crate::models::{CourseReport, CourseUser, ProgressSummary};
use crate::store::{Role, Store};
use crate::sync;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

/// Classroom roster sync, submission progress and study cells
#[derive(Parser, Debug)]
#[command(name = "classroom-cells")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Run a single command instead of the dashboard
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull courses, teachers and students into the local database
    Sync,

    /// Classify submissions for one course or all courses
    Report {
        /// Classroom course id (all courses when omitted)
        #[arg(long)]
        course: Option<String>,

        /// Write one CSV file per course into this directory
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage study cells
    #[command(subcommand)]
    Cells(CellsCommands),

    /// Student queries
    #[command(subcommand)]
    Students(StudentsCommands),

    /// Locally stored users
    #[command(subcommand)]
    Users(UsersCommands),
}

#[derive(Subcommand, Debug)]
pub enum CellsCommands {
    /// List the cells of a course with their members
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        course: String,
    },
    /// Create a cell, optionally led by a teacher
    Create {
        #[arg(long)]
        course: String,
        #[arg(long)]
        name: String,
        /// Local user id of the teacher
        #[arg(long)]
        teacher: Option<String>,
    },
    Rename {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Add a user to a cell
    Assign {
        #[arg(long)]
        cell: String,
        /// Local user id
        #[arg(long)]
        user: String,
    },
    /// Remove a user from a cell
    Unassign {
        #[arg(long)]
        cell: String,
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum StudentsCommands {
    /// Students of a course that are not in any of its cells
    Available {
        #[arg(long)]
        course: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    #[command(alias = "ls")]
    List {
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },
    /// Set or clear a user's WhatsApp phone
    Phone {
        #[arg(long)]
        id: String,
        /// Omit to clear the stored number
        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Student,
    Teacher,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Student => Role::Student,
            RoleArg::Teacher => Role::Teacher,
        }
    }
}

pub async fn run(
    command: Commands,
    client: &ClassroomClient,
    store: &Store,
    options: FetchOptions,
) -> Result<()> {
    match command {
        Commands::Sync => {
            let summary = sync::sync_roster(client, store, &TeacherCache::new()).await?;
            println!("Courses synced:   {}", summary.courses_synced);
            println!("Teachers found:   {}", summary.teachers_found);
            println!(
                "Teachers:         {} created, {} updated",
                summary.teachers_created, summary.teachers_updated
            );
            println!(
                "Students:         {} created, {} updated",
                summary.students_created, summary.students_updated
            );
            if !summary.failed_courses.is_empty() {
                println!("Failed courses:   {}", summary.failed_courses.join(", "));
            }
        }
        Commands::Report { course, csv, json } => {
            let courses = match course {
                Some(id) => vec![client
                    .get_course(&id)
                    .await
                    .context(format!("Failed to fetch course {}", id))?],
                None => client.list_courses().await.context("Failed to list courses")?,
            };

            let cache = TeacherCache::new();
            let mut reports =
                fetcher::fetch_all_progress(client, &courses, &cache, options, Utc::now(), None)
                    .await;
            for report in &mut reports {
                // Courses that were never synced simply have no cells
                if let Ok(cells) = store.cell_names_by_student(&report.course.id) {
                    fetcher::apply_cells(report, &cells);
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print!("{}", report_table(report));
                }
            }

            if let Some(dir) = csv {
                std::fs::create_dir_all(&dir)
                    .context(format!("Failed to create {}", dir.display()))?;
                for report in reports.iter().filter(|r| !r.rows.is_empty()) {
                    let path = export::export_progress_to_csv(report, &dir)?;
                    info!(file = %path.display(), "Exported progress report");
                    eprintln!("Exported {}", path.display());
                }
            }
        }
        Commands::Cells(command) => run_cells(command, store)?,
        Commands::Users(UsersCommands::List { role }) => {
            for user in store.list_users(role.map(Role::from))? {
                println!(
                    "{}\t{:<8}\t{}\t{}\t{}",
                    user.id,
                    user.role.as_str(),
                    user.name,
                    user.email.as_deref().unwrap_or_default(),
                    user.whatsapp_phone.as_deref().unwrap_or_default()
                );
            }
        }
        Commands::Users(UsersCommands::Phone { id, phone }) => {
            store.set_whatsapp_phone(&id, phone.as_deref())?;
            match phone {
                Some(phone) => println!("Set phone of {} to {}", id, phone),
                None => println!("Cleared phone of {}", id),
            }
        }
        Commands::Students(StudentsCommands::Available { course }) => {
            let assigned = store.assigned_classroom_ids(&course)?;
            let stored = store.require_course(&course)?;
            let students = client
                .list_students(&stored.classroom_id)
                .await
                .context("Failed to fetch students")?;
            for student in available_students(students, &assigned) {
                println!(
                    "{}\t{}\t{}",
                    student.classroom_id().unwrap_or_default(),
                    student.full_name().unwrap_or("Sin nombre"),
                    student.email().unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn run_cells(command: CellsCommands, store: &Store) -> Result<()> {
    match command {
        CellsCommands::List { course } => {
            for cell in store.list_cells(&course)? {
                println!("{}\t{}", cell.id, cell.name);
                for member in &cell.members {
                    println!(
                        "  {:<8} {}\t{}",
                        member.role.as_str(),
                        member.name,
                        member.email.as_deref().unwrap_or_default()
                    );
                }
            }
        }
        CellsCommands::Create {
            course,
            name,
            teacher,
        } => {
            let cell = store.create_cell(&course, &name, teacher.as_deref())?;
            println!("Created cell {} ({})", cell.name, cell.id);
        }
        CellsCommands::Rename { id, name } => {
            let cell = store.rename_cell(&id, &name)?;
            println!("Renamed cell {} to {}", cell.id, cell.name);
        }
        CellsCommands::Delete { id } => {
            store.delete_cell(&id)?;
            println!("Deleted cell {}", id);
        }
        CellsCommands::Assign { cell, user } => {
            let member = store.assign_member(&cell, &user)?;
            println!("Added {} to cell {}", member.name, cell);
        }
        CellsCommands::Unassign { cell, user } => {
            store.remove_member(&cell, &user)?;
            println!("Removed {} from cell {}", user, cell);
        }
    }
    Ok(())
}

fn available_students(students: Vec<CourseUser>, assigned: &HashSet<String>) -> Vec<CourseUser> {
    students
        .into_iter()
        .filter(|s| matches!(s.classroom_id(), Some(id) if !assigned.contains(id)))
        .collect()
}

fn report_table(report: &CourseReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ({})", report.course.name, report.course.id);

    if let Some(error) = &report.error {
        let _ = writeln!(out, "   error: {}", error);
        return out;
    }

    let _ = writeln!(
        out,
        "{:<28} {:<14} {:>8} {:>9} {:>11} {:>11} {:>9}",
        "student", "cell", "asignada", "entregada", "con retraso", "sin entregar", "devuelta"
    );
    for row in &report.rows {
        let stats = &row.stats;
        let _ = writeln!(
            out,
            "{:<28} {:<14} {:>8} {:>9} {:>11} {:>11} {:>9}{}",
            row.name,
            row.cell.as_deref().unwrap_or("-"),
            stats.assigned,
            stats.turned_in,
            stats.turned_in_late,
            stats.missing,
            stats.returned,
            row.error
                .as_deref()
                .map(|e| format!("  ! {}", e))
                .unwrap_or_default()
        );
    }

    let summary = ProgressSummary::calculate(&report.rows);
    let _ = writeln!(
        out,
        "{} students, {} with errors, {:.1}% delivered",
        summary.students_processed, summary.errors, summary.completion_rate
    );
    out
}
