use super::{Role, Store, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellMember {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub classroom_user_id: Option<String>,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub id: String,
    pub name: String,
    pub course_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub members: Vec<CellMember>,
}

impl Cell {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            course_id: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            members: Vec::new(),
        })
    }

    pub fn teachers(&self) -> impl Iterator<Item = &CellMember> {
        self.members.iter().filter(|m| m.role == Role::Teacher)
    }

    pub fn students(&self) -> impl Iterator<Item = &CellMember> {
        self.members.iter().filter(|m| m.role == Role::Student)
    }
}

const CELL_COLUMNS: &str = "id, name, course_id, created_at, updated_at";

fn valid_name(name: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidName);
    }
    Ok(name.to_string())
}

impl Store {
    /// Create a cell in a course, optionally with its teacher already assigned
    pub fn create_cell(
        &self,
        course_key: &str,
        name: &str,
        teacher_id: Option<&str>,
    ) -> StoreResult<Cell> {
        let name = valid_name(name)?;
        let course = self.require_course(course_key)?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO cells(id, name, course_id, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?4)",
            (&id, &name, &course.id, now),
        )?;
        if let Some(teacher_id) = teacher_id {
            self.insert_member(&id, teacher_id)?;
        }
        tx.commit()?;

        self.require_cell(&id)
    }

    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub fn rename_cell(&self, cell_id: &str, name: &str) -> StoreResult<Cell> {
        let name = valid_name(name)?;
        let changed = self.conn.execute(
            "UPDATE cells SET name = ?1, updated_at = ?2 WHERE id = ?3",
            (&name, Utc::now(), cell_id),
        )?;
        if changed == 0 {
            return Err(cell_not_found(cell_id));
        }
        self.require_cell(cell_id)
    }

    pub fn delete_cell(&self, cell_id: &str) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cell_members WHERE cell_id = ?1", [cell_id])?;
        let changed = tx.execute("DELETE FROM cells WHERE id = ?1", [cell_id])?;
        if changed == 0 {
            return Err(cell_not_found(cell_id));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_cell(&self, cell_id: &str) -> StoreResult<Option<Cell>> {
        let cell = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cells WHERE id = ?1", CELL_COLUMNS),
                [cell_id],
                Cell::from_row,
            )
            .optional()?;

        match cell {
            Some(mut cell) => {
                cell.members = self.members_of(&cell.id)?;
                Ok(Some(cell))
            }
            None => Ok(None),
        }
    }

    pub fn require_cell(&self, cell_id: &str) -> StoreResult<Cell> {
        self.find_cell(cell_id)?
            .ok_or_else(|| cell_not_found(cell_id))
    }

    /// Cells of a course with their members, oldest first
    pub fn list_cells(&self, course_key: &str) -> StoreResult<Vec<Cell>> {
        let course = self.require_course(course_key)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cells WHERE course_id = ?1 ORDER BY created_at, name",
            CELL_COLUMNS
        ))?;
        let mut cells = stmt
            .query_map([&course.id], Cell::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for cell in &mut cells {
            cell.members = self.members_of(&cell.id)?;
        }
        Ok(cells)
    }

    fn members_of(&self, cell_id: &str) -> StoreResult<Vec<CellMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.email, u.classroom_user_id, m.role, m.joined_at
             FROM cell_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.cell_id = ?1
             ORDER BY m.role DESC, u.name",
        )?;
        let members = stmt
            .query_map([cell_id], |row| {
                let role: String = row.get(4)?;
                Ok(CellMember {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    classroom_user_id: row.get(3)?,
                    role: Role::from_column(&role),
                    joined_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Add a user to a cell with the user's own role.
    ///
    /// A student can be in at most one cell per course; teachers may lead several.
    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub fn assign_member(&self, cell_id: &str, user_id: &str) -> StoreResult<CellMember> {
        self.insert_member(cell_id, user_id)?;
        self.members_of(cell_id)?
            .into_iter()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "cell member",
                id: user_id.to_string(),
            })
    }

    fn insert_member(&self, cell_id: &str, user_id: &str) -> StoreResult<()> {
        let user = self.require_user(user_id)?;
        let course_id: String = self
            .conn
            .query_row("SELECT course_id FROM cells WHERE id = ?1", [cell_id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| cell_not_found(cell_id))?;

        let already: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT c.id, c.name FROM cell_members m
                 JOIN cells c ON c.id = m.cell_id
                 WHERE m.user_id = ?1 AND c.course_id = ?2 AND (c.id = ?3 OR m.role = 'student')
                 ORDER BY c.id = ?3 DESC
                 LIMIT 1",
                (user_id, &course_id, cell_id),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match already {
            Some((existing, _)) if existing == cell_id => {
                return Err(StoreError::AlreadyMember {
                    cell_id: cell_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
            Some((_, cell)) if user.role == Role::Student => {
                return Err(StoreError::AlreadyInCourseCell {
                    user_id: user_id.to_string(),
                    cell,
                });
            }
            _ => {}
        }

        self.conn.execute(
            "INSERT INTO cell_members(id, cell_id, user_id, role, joined_at)
             VALUES(?1, ?2, ?3, ?4, ?5)",
            (
                Uuid::new_v4().to_string(),
                cell_id,
                user_id,
                user.role.as_str(),
                Utc::now(),
            ),
        )?;
        self.conn.execute(
            "UPDATE cells SET updated_at = ?1 WHERE id = ?2",
            (Utc::now(), cell_id),
        )?;
        Ok(())
    }

    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub fn remove_member(&self, cell_id: &str, user_id: &str) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM cell_members WHERE cell_id = ?1 AND user_id = ?2",
            (cell_id, user_id),
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "cell member",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Classroom ids of students already placed in a cell of the course
    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub fn assigned_classroom_ids(&self, course_key: &str) -> StoreResult<HashSet<String>> {
        Ok(self.cell_names_by_student(course_key)?.into_keys().collect())
    }

    /// Student classroom id -> name of the cell they belong to in the course
    pub fn cell_names_by_student(&self, course_key: &str) -> StoreResult<HashMap<String, String>> {
        let course = self.require_course(course_key)?;
        let mut stmt = self.conn.prepare(
            "SELECT u.classroom_user_id, c.name
             FROM cell_members m
             JOIN cells c ON c.id = m.cell_id
             JOIN users u ON u.id = m.user_id
             WHERE c.course_id = ?1 AND m.role = 'student' AND u.classroom_user_id IS NOT NULL",
        )?;
        let pairs = stmt
            .query_map([&course.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(pairs)
    }
}

fn cell_not_found(cell_id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "cell",
        id: cell_id.to_string(),
    }
}
