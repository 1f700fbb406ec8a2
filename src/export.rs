use crate::models::CourseReport;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

const HEADERS: [&str; 14] = [
    "student_id",
    "student_name",
    "email",
    "course_id",
    "course_name",
    "cell",
    "teachers",
    "asignada",
    "entregada",
    "entregadaConRetraso",
    "sinEntregar",
    "devueltaCalificada",
    "total",
    "error",
];

/// Keep file names portable: letters, digits, `-` and `_` only
fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "course".to_string()
    } else {
        cleaned
    }
}

/// Export a course's progress rows to a CSV file inside `dir`
pub fn export_progress_to_csv(report: &CourseReport, dir: &Path) -> Result<PathBuf> {
    if report.rows.is_empty() {
        anyhow::bail!("No results to export");
    }

    // Generate filename with timestamp
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    // Course names repeat across sections, the id keeps files apart
    let filename = format!(
        "progress_{}_{}_{}.csv",
        file_safe(&report.course.name),
        file_safe(&report.course.id),
        timestamp
    );
    let filepath = dir.join(filename);

    let mut wtr = csv::Writer::from_path(&filepath).context("Failed to create CSV file")?;

    wtr.write_record(HEADERS)
        .context("Failed to write CSV headers")?;

    for row in &report.rows {
        let stats = &row.stats;
        wtr.write_record([
            row.student_id.clone(),
            row.name.clone(),
            row.email.clone(),
            row.course_id.clone(),
            row.course_name.clone(),
            row.cell.clone().unwrap_or_default(),
            row.teachers.join("; "),
            stats.assigned.to_string(),
            stats.turned_in.to_string(),
            stats.turned_in_late.to_string(),
            stats.missing.to_string(),
            stats.returned.to_string(),
            stats.total().to_string(),
            row.error.clone().unwrap_or_default(),
        ])
        .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;

    Ok(filepath)
}
