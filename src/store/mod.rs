mod cells;

pub use cells::Cell;

use crate::models::{Course, CourseUser};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

const COURSE_COLORS: [&str; 8] = [
    "#1e88e5", "#43a047", "#fb8c00", "#8e24aa", "#e53935", "#00897b", "#3949ab", "#6d4c41",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("user `{user_id}` is already a member of cell `{cell_id}`")]
    AlreadyMember { cell_id: String, user_id: String },
    #[error("student `{user_id}` already belongs to cell `{cell}` in this course")]
    AlreadyInCourseCell { user_id: String, cell: String },
    #[error("cell name must not be empty")]
    InvalidName,
    #[error("classroom user has no id")]
    MissingClassroomId,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    fn from_column(value: &str) -> Self {
        if value == "teacher" {
            Role::Teacher
        } else {
            Role::Student
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredCourse {
    pub id: String,
    pub classroom_id: String,
    pub name: String,
    pub section: Option<String>,
    pub color_hex: String,
}

impl StoredCourse {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            classroom_id: row.get(1)?,
            name: row.get(2)?,
            section: row.get(3)?,
            color_hex: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUser {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub classroom_user_id: Option<String>,
    pub role: Role,
    pub whatsapp_phone: Option<String>,
}

impl StoredUser {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let role: String = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            classroom_user_id: row.get(3)?,
            role: Role::from_column(&role),
            whatsapp_phone: row.get(5)?,
        })
    }
}

const COURSE_COLUMNS: &str = "id, classroom_id, name, section, color_hex";
const USER_COLUMNS: &str = "id, name, email, classroom_user_id, role, whatsapp_phone";

/// Deterministic palette pick so a course keeps its color across syncs
pub fn course_color(classroom_id: &str) -> &'static str {
    let sum: usize = classroom_id.bytes().map(usize::from).sum();
    COURSE_COLORS[sum % COURSE_COLORS.len()]
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS courses(
                id TEXT PRIMARY KEY,
                classroom_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                section TEXT,
                color_hex TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE,
                classroom_user_id TEXT UNIQUE,
                role TEXT NOT NULL,
                whatsapp_phone TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cells(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                course_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(course_id) REFERENCES courses(id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cells_course ON cells(course_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cell_members(
                id TEXT PRIMARY KEY,
                cell_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                FOREIGN KEY(cell_id) REFERENCES cells(id),
                FOREIGN KEY(user_id) REFERENCES users(id),
                UNIQUE(cell_id, user_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cell_members_cell ON cell_members(cell_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cell_members_user ON cell_members(user_id)",
            [],
        )?;

        Ok(Self { conn })
    }

    // ------------------------------------------------------------------
    // Courses
    // ------------------------------------------------------------------

    pub fn upsert_course(&self, course: &Course) -> StoreResult<(StoredCourse, UpsertOutcome)> {
        let existing = self.find_course_by_classroom_id(&course.id)?;

        let outcome = match existing {
            Some(stored) => {
                self.conn.execute(
                    "UPDATE courses SET name = ?1, section = ?2 WHERE id = ?3",
                    (&course.name, &course.section, &stored.id),
                )?;
                UpsertOutcome::Updated
            }
            None => {
                self.conn.execute(
                    "INSERT INTO courses(id, classroom_id, name, section, color_hex)
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                    (
                        Uuid::new_v4().to_string(),
                        &course.id,
                        &course.name,
                        &course.section,
                        course_color(&course.id),
                    ),
                )?;
                UpsertOutcome::Created
            }
        };

        let stored = self
            .find_course_by_classroom_id(&course.id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "course",
                id: course.id.clone(),
            })?;
        Ok((stored, outcome))
    }

    fn find_course_by_classroom_id(&self, classroom_id: &str) -> StoreResult<Option<StoredCourse>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM courses WHERE classroom_id = ?1", COURSE_COLUMNS),
                [classroom_id],
                StoredCourse::from_row,
            )
            .optional()?)
    }

    /// Look a course up by local id or classroom id
    pub fn find_course(&self, key: &str) -> StoreResult<Option<StoredCourse>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM courses WHERE id = ?1 OR classroom_id = ?1 LIMIT 1",
                    COURSE_COLUMNS
                ),
                [key],
                StoredCourse::from_row,
            )
            .optional()?)
    }

    pub fn require_course(&self, key: &str) -> StoreResult<StoredCourse> {
        self.find_course(key)?.ok_or_else(|| StoreError::NotFound {
            entity: "course",
            id: key.to_string(),
        })
    }

    pub fn list_courses(&self) -> StoreResult<Vec<StoredCourse>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM courses ORDER BY name",
            COURSE_COLUMNS
        ))?;
        let courses = stmt
            .query_map([], StoredCourse::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert or refresh a classroom user.
    ///
    /// Matches an existing user by classroom id, then by email. An existing
    /// teacher is never demoted when seen as a student.
    pub fn upsert_user(
        &self,
        user: &CourseUser,
        role: Role,
    ) -> StoreResult<(StoredUser, UpsertOutcome)> {
        let classroom_id = user.classroom_id().ok_or(StoreError::MissingClassroomId)?;
        let email = user.email().filter(|e| !e.is_empty());

        let existing = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM users
                     WHERE classroom_user_id = ?1 OR (?2 IS NOT NULL AND email = ?2)
                     ORDER BY classroom_user_id = ?1 DESC
                     LIMIT 1",
                    USER_COLUMNS
                ),
                (classroom_id, email),
                StoredUser::from_row,
            )
            .optional()?;

        let (id, outcome) = match existing {
            Some(stored) => {
                let role = if stored.role == Role::Teacher {
                    Role::Teacher
                } else {
                    role
                };
                let name = user.full_name().unwrap_or(stored.name.as_str());
                // Emails are unique; one already owned by another row stays there
                let email = match email {
                    Some(address) if stored.email.is_none() => {
                        let owner: Option<String> = self
                            .conn
                            .query_row(
                                "SELECT id FROM users WHERE email = ?1 AND id != ?2",
                                (address, &stored.id),
                                |row| row.get(0),
                            )
                            .optional()?;
                        if let Some(owner) = owner {
                            warn!(
                                user_id = %stored.id,
                                owner_id = %owner,
                                "Email {} already belongs to another user, not linking it",
                                address
                            );
                            None
                        } else {
                            Some(address)
                        }
                    }
                    _ => None,
                };
                self.conn.execute(
                    "UPDATE users SET name = ?1, classroom_user_id = ?2, role = ?3,
                        email = COALESCE(email, ?4)
                     WHERE id = ?5",
                    (name, classroom_id, role.as_str(), email, &stored.id),
                )?;
                (stored.id, UpsertOutcome::Updated)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                self.conn.execute(
                    "INSERT INTO users(id, name, email, classroom_user_id, role)
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                    (
                        &id,
                        user.full_name().unwrap_or("Sin nombre"),
                        email,
                        classroom_id,
                        role.as_str(),
                    ),
                )?;
                (id, UpsertOutcome::Created)
            }
        };

        let stored = self.require_user(&id)?;
        Ok((stored, outcome))
    }

    pub fn find_user(&self, id: &str) -> StoreResult<Option<StoredUser>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [id],
                StoredUser::from_row,
            )
            .optional()?)
    }

    pub fn require_user(&self, id: &str) -> StoreResult<StoredUser> {
        self.find_user(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }

    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<StoredUser>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users WHERE ?1 IS NULL OR role = ?1 ORDER BY name",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([role.map(|r| r.as_str())], StoredUser::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub fn set_whatsapp_phone(&self, user_id: &str, phone: Option<&str>) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET whatsapp_phone = ?1 WHERE id = ?2",
            (phone, user_id),
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;

    fn course(id: &str, name: &str) -> Course {
        Course {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_course_keeps_local_id_and_color() {
        let store = Store::open_in_memory().unwrap();

        let (created, outcome) = store.upsert_course(&course("g-1", "Math")).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(created.color_hex, course_color("g-1"));

        let (updated, outcome) = store.upsert_course(&course("g-1", "Math II")).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Math II");

        assert_eq!(store.find_course(&created.id).unwrap(), Some(updated.clone()));
        assert_eq!(store.find_course("g-1").unwrap(), Some(updated));
        assert_eq!(store.list_courses().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_user_matches_by_classroom_id_then_email() {
        let store = Store::open_in_memory().unwrap();

        let (first, outcome) = store.upsert_user(&user("u1", "Ana"), Role::Student).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(first.email.as_deref(), Some("u1@school.test"));

        let (again, outcome) = store
            .upsert_user(&user("u1", "Ana María"), Role::Student)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(again.id, first.id);
        assert_eq!(again.name, "Ana María");

        // Same email, new classroom id: same person
        let mut moved = user("u1-new", "Ana");
        moved.profile.as_mut().unwrap().email_address = Some("u1@school.test".to_string());
        let (relinked, outcome) = store.upsert_user(&moved, Role::Student).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(relinked.id, first.id);
        assert_eq!(relinked.classroom_user_id.as_deref(), Some("u1-new"));
    }

    #[test]
    fn test_upsert_user_leaves_email_owned_by_another_user() {
        let store = Store::open_in_memory().unwrap();

        let (ana, _) = store.upsert_user(&user("u1", "Ana"), Role::Student).unwrap();
        let mut no_email = user("u2", "Bea");
        no_email.profile.as_mut().unwrap().email_address = None;
        let (bea, _) = store.upsert_user(&no_email, Role::Student).unwrap();
        assert_eq!(bea.email, None);

        // Bea now reports Ana's address
        let mut clash = user("u2", "Bea");
        clash.profile.as_mut().unwrap().email_address = Some("u1@school.test".to_string());
        let (updated, outcome) = store.upsert_user(&clash, Role::Student).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(updated.id, bea.id);
        assert_eq!(updated.email, None);

        let ana = store.require_user(&ana.id).unwrap();
        assert_eq!(ana.email.as_deref(), Some("u1@school.test"));
        assert_eq!(store.list_users(None).unwrap().len(), 2);
    }

    #[test]
    fn test_teacher_is_never_demoted() {
        let store = Store::open_in_memory().unwrap();

        let (student, _) = store.upsert_user(&user("u1", "Luis"), Role::Student).unwrap();
        assert_eq!(student.role, Role::Student);

        let (promoted, _) = store.upsert_user(&user("u1", "Luis"), Role::Teacher).unwrap();
        assert_eq!(promoted.role, Role::Teacher);

        let (still, _) = store.upsert_user(&user("u1", "Luis"), Role::Student).unwrap();
        assert_eq!(still.role, Role::Teacher);

        assert_eq!(store.list_users(Some(Role::Teacher)).unwrap().len(), 1);
        assert_eq!(store.list_users(Some(Role::Student)).unwrap().len(), 0);
        assert_eq!(store.list_users(None).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_user_requires_classroom_id() {
        let store = Store::open_in_memory().unwrap();
        let result = store.upsert_user(&CourseUser::default(), Role::Student);
        assert!(matches!(result, Err(StoreError::MissingClassroomId)));
    }

    #[test]
    fn test_set_whatsapp_phone() {
        let store = Store::open_in_memory().unwrap();
        let (stored, _) = store.upsert_user(&user("u1", "Eva"), Role::Teacher).unwrap();

        store.set_whatsapp_phone(&stored.id, Some("+34600000000")).unwrap();
        let reloaded = store.require_user(&stored.id).unwrap();
        assert_eq!(reloaded.whatsapp_phone.as_deref(), Some("+34600000000"));

        assert!(matches!(
            store.set_whatsapp_phone("missing", None),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_open_on_disk_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("classroom-cells-{}", Uuid::new_v4()));
        let path = dir.join("cells.sqlite3");

        {
            let store = Store::open(&path).unwrap();
            store.upsert_course(&course("g-1", "Math")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_courses().unwrap().len(), 1);

        drop(store);
        std::fs::remove_dir_all(dir).ok();
    }
}
