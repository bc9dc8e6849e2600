//! Employee record storage and index publication.
//!
//! Employee CRUD here is deliberately thin: documents need owners and the
//! employee index needs a corpus. Adding an employee publishes the record to
//! the index immediately so it is searchable before any document arrives.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::index::IndexClient;
use crate::models::{EmployeeIndexRecord, EmployeeRecord};

pub struct NewEmployee {
    pub name: String,
    pub department: String,
    pub role: String,
    pub skills: String,
    pub bio: String,
}

/// Inserts an employee and publishes it to the index. Returns the new id.
pub async fn add_employee(
    pool: &SqlitePool,
    index: &dyn IndexClient,
    new: NewEmployee,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO employees (id, name, department, role, skills, bio)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.name)
    .bind(&new.department)
    .bind(&new.role)
    .bind(&new.skills)
    .bind(&new.bio)
    .execute(pool)
    .await
    .context("Failed to insert employee")?;

    index
        .publish_employee(&EmployeeIndexRecord {
            id: id.clone(),
            name: new.name,
            department: new.department,
            role: new.role,
            skills: new.skills,
            bio: new.bio,
        })
        .await
        .context("Failed to publish employee to index")?;

    Ok(id)
}

pub async fn get_employee(pool: &SqlitePool, id: &str) -> Result<Option<EmployeeRecord>> {
    let row = sqlx::query(
        "SELECT id, name, department, role, skills, bio FROM employees WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| EmployeeRecord {
        id: r.get("id"),
        name: r.get("name"),
        department: r.get("department"),
        role: r.get("role"),
        skills: r.get("skills"),
        bio: r.get("bio"),
    }))
}

pub async fn list_employees(pool: &SqlitePool) -> Result<Vec<EmployeeRecord>> {
    let rows =
        sqlx::query("SELECT id, name, department, role, skills, bio FROM employees ORDER BY name")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .iter()
        .map(|r| EmployeeRecord {
            id: r.get("id"),
            name: r.get("name"),
            department: r.get("department"),
            role: r.get("role"),
            skills: r.get("skills"),
            bio: r.get("bio"),
        })
        .collect())
}

pub fn index_record(record: &EmployeeRecord) -> EmployeeIndexRecord {
    EmployeeIndexRecord {
        id: record.id.clone(),
        name: record.name.clone(),
        department: record.department.clone(),
        role: record.role.clone(),
        skills: record.skills.clone(),
        bio: record.bio.clone(),
    }
}
