//! Detail batch linker.
//!
//! A create call stores one reference for a (user, customer) pair and
//! attaches every measured value of the batch to it, all in a single
//! transaction. An update call rewrites existing rows that match the
//! caller's user, customer and reference. Reads join each row to its
//! definition so clients get the axis name alongside the value.

use sqlx::{Executor, Sqlite, SqliteConnection, Transaction};
use std::collections::HashSet;
use thiserror::Error;

use super::Category;
use crate::db::{self, DbPool, DetailJoinRow, DetailRow, DetailView, SaveOutcome};

/// Errors surfaced by the linker
#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Which branch of `save` to run, chosen by the HTTP verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Update,
}

pub struct DetailLinker {
    db: DbPool,
    category: Category,
}

impl DetailLinker {
    pub fn new(db: DbPool, category: Category) -> Self {
        Self { db, category }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Save a batch of detail rows.
    pub async fn save(
        &self,
        rows: &[DetailRow],
        mode: SaveMode,
        user_id: &str,
        customer_id: &str,
    ) -> Result<SaveOutcome, LinkerError> {
        let outcome = match mode {
            SaveMode::Create => {
                let mut tx = self.db.begin().await?;
                let outcome = self.create_in(&mut tx, rows, user_id, customer_id).await?;
                tx.commit().await?;
                outcome
            }
            SaveMode::Update => {
                validate_batch(rows, mode)?;
                self.update(rows, user_id, customer_id).await?
            }
        };

        crate::api::metrics::record_details_saved(self.category, outcome.count);
        Ok(outcome)
    }

    /// Create path inside a caller-owned transaction. Nothing is committed
    /// here; dropping `tx` on error rolls back the reference and every row.
    pub async fn create_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        rows: &[DetailRow],
        user_id: &str,
        customer_id: &str,
    ) -> Result<SaveOutcome, LinkerError> {
        validate_batch(rows, SaveMode::Create)?;

        let audit_label = audit_label(&mut **tx, user_id).await?;
        require_customer(&mut **tx, user_id, customer_id).await?;

        let now = db::now();
        let reference_id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO measurement_references (id, user_id, customer_id, ref_name, added_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reference_id)
        .bind(user_id)
        .bind(customer_id)
        .bind(self.category.form_type().as_str())
        .bind(&audit_label)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?;

        let insert_detail = format!(
            r#"
            INSERT INTO {} (id, user_id, customer_id, measurement_id, reference_id, measured_value, added_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.category.details_table()
        );

        for row in rows {
            self.require_definition(tx, user_id, &row.measurement_definition_id)
                .await?;

            sqlx::query(&insert_detail)
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(user_id)
                .bind(customer_id)
                .bind(&row.measurement_definition_id)
                .bind(&reference_id)
                .bind(row.measured_value)
                .bind(&audit_label)
                .bind(&now)
                .bind(&now)
                .execute(&mut **tx)
                .await?;
        }

        tracing::info!(
            category = %self.category,
            user_id = %user_id,
            customer_id = %customer_id,
            reference_id = %reference_id,
            count = rows.len(),
            "Linked measurement details"
        );

        Ok(SaveOutcome {
            count: rows.len(),
            reference_id: Some(reference_id),
        })
    }

    async fn update(
        &self,
        rows: &[DetailRow],
        user_id: &str,
        customer_id: &str,
    ) -> Result<SaveOutcome, LinkerError> {
        self.require_user(user_id).await?;
        require_customer(&self.db, user_id, customer_id).await?;

        let mut tx = self.db.begin().await?;
        let now = db::now();
        let update_detail = format!(
            r#"
            UPDATE {}
            SET measured_value = ?, measurement_id = ?, updated_at = ?
            WHERE id = ? AND user_id = ? AND customer_id = ? AND reference_id = ?
            "#,
            self.category.details_table()
        );

        // A batch may name the same row twice; count it once
        let mut matched: HashSet<&str> = HashSet::new();
        for row in rows {
            self.require_definition(&mut tx, user_id, &row.measurement_definition_id)
                .await?;

            // validate_batch guarantees both ids on the update path
            let (Some(id), Some(reference_id)) = (&row.id, &row.reference_id) else {
                continue;
            };

            let result = sqlx::query(&update_detail)
                .bind(row.measured_value)
                .bind(&row.measurement_definition_id)
                .bind(&now)
                .bind(id)
                .bind(user_id)
                .bind(customer_id)
                .bind(reference_id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                tracing::debug!(detail_id = %id, "No matching detail row, skipping");
            } else {
                matched.insert(id.as_str());
            }
        }

        let updated = matched.len();

        if updated == 0 {
            return Err(LinkerError::NotFound("No details updated".to_string()));
        }

        tx.commit().await?;

        tracing::info!(
            category = %self.category,
            user_id = %user_id,
            customer_id = %customer_id,
            count = updated,
            "Updated measurement details"
        );

        Ok(SaveOutcome {
            count: updated,
            reference_id: None,
        })
    }

    /// Every detail row of a customer, oldest first
    pub async fn fetch_by_customer(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> Result<Vec<DetailView>, LinkerError> {
        require_customer(&self.db, user_id, customer_id).await?;

        let rows: Vec<DetailJoinRow> = sqlx::query_as(&format!(
            r#"
            SELECT d.id, d.measured_value, d.reference_id, m.id AS measurement_id, m.name AS measurement_name
            FROM {details} d
            JOIN {definitions} m ON m.id = d.measurement_id
            JOIN measurement_references r ON r.id = d.reference_id
            WHERE d.user_id = ? AND d.customer_id = ?
            ORDER BY r.created_at, d.rowid
            "#,
            details = self.category.details_table(),
            definitions = self.category.definitions_table(),
        ))
        .bind(user_id)
        .bind(customer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(DetailView::from).collect())
    }

    /// Detail rows stored under one reference, in insertion order
    pub async fn fetch_by_reference(
        &self,
        user_id: &str,
        reference_id: &str,
    ) -> Result<Vec<DetailView>, LinkerError> {
        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM measurement_references WHERE id = ? AND user_id = ? AND ref_name = ?",
        )
        .bind(reference_id)
        .bind(user_id)
        .bind(self.category.form_type().as_str())
        .fetch_optional(&self.db)
        .await?;
        if exists.is_none() {
            return Err(LinkerError::NotFound("Reference not found".to_string()));
        }

        let rows: Vec<DetailJoinRow> = sqlx::query_as(&format!(
            r#"
            SELECT d.id, d.measured_value, d.reference_id, m.id AS measurement_id, m.name AS measurement_name
            FROM {details} d
            JOIN {definitions} m ON m.id = d.measurement_id
            WHERE d.reference_id = ? AND d.user_id = ?
            ORDER BY d.rowid
            "#,
            details = self.category.details_table(),
            definitions = self.category.definitions_table(),
        ))
        .bind(reference_id)
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(DetailView::from).collect())
    }

    /// Delete every detail row under a reference, and the reference once
    /// nothing else points at it. Returns the number of rows removed.
    pub async fn delete_by_reference(
        &self,
        user_id: &str,
        reference_id: &str,
    ) -> Result<u64, LinkerError> {
        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE reference_id = ? AND user_id = ?",
            self.category.details_table()
        ))
        .bind(reference_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted == 0 {
            return Err(LinkerError::NotFound(
                "No details found for this reference".to_string(),
            ));
        }

        let mut remaining = 0i64;
        for category in Category::ALL {
            let (count,): (i64,) = sqlx::query_as(&format!(
                "SELECT COUNT(*) FROM {} WHERE reference_id = ?",
                category.details_table()
            ))
            .bind(reference_id)
            .fetch_one(&mut *tx)
            .await?;
            remaining += count;
        }

        if remaining == 0 {
            sqlx::query("DELETE FROM measurement_references WHERE id = ? AND user_id = ?")
                .bind(reference_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            category = %self.category,
            user_id = %user_id,
            reference_id = %reference_id,
            count = deleted,
            reference_removed = remaining == 0,
            "Deleted measurement details"
        );

        Ok(deleted)
    }

    async fn require_user(&self, user_id: &str) -> Result<(), LinkerError> {
        let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        user.map(|_| ())
            .ok_or_else(|| LinkerError::NotFound("User not found".to_string()))
    }

    async fn require_definition(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        definition_id: &str,
    ) -> Result<(), LinkerError> {
        let definition: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE id = ? AND user_id = ?",
            self.category.definitions_table()
        ))
        .bind(definition_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        definition.map(|_| ()).ok_or_else(|| {
            LinkerError::NotFound(format!(
                "Measurement definition {} not found",
                definition_id
            ))
        })
    }
}

/// `"{fullName} - {companyName}"` for the `added_by` columns
async fn audit_label(conn: &mut SqliteConnection, user_id: &str) -> Result<String, LinkerError> {
    let user: Option<(String,)> = sqlx::query_as("SELECT full_name FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let (full_name,) = user.ok_or_else(|| LinkerError::NotFound("User not found".to_string()))?;

    let company: Option<(String,)> =
        sqlx::query_as("SELECT company_name FROM companies WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    let (company_name,) =
        company.ok_or_else(|| LinkerError::NotFound("Company not found".to_string()))?;

    Ok(format!("{} - {}", full_name, company_name))
}

async fn require_customer<'e, E>(
    executor: E,
    user_id: &str,
    customer_id: &str,
) -> Result<(), LinkerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let customer: Option<(String,)> =
        sqlx::query_as("SELECT id FROM customers WHERE id = ? AND user_id = ?")
            .bind(customer_id)
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
    customer
        .map(|_| ())
        .ok_or_else(|| LinkerError::NotFound("Customer not found".to_string()))
}

fn validate_batch(rows: &[DetailRow], mode: SaveMode) -> Result<(), LinkerError> {
    if rows.is_empty() {
        return Err(LinkerError::Validation(
            "At least one measurement detail is required".to_string(),
        ));
    }

    for (index, row) in rows.iter().enumerate() {
        if row.measurement_definition_id.trim().is_empty() {
            return Err(LinkerError::Validation(format!(
                "Detail {} is missing its measurement definition",
                index
            )));
        }
        if !row.measured_value.is_finite() || row.measured_value < 0.0 {
            return Err(LinkerError::Validation(format!(
                "Detail {} has an invalid measured value",
                index
            )));
        }
        if mode == SaveMode::Update && (row.id.is_none() || row.reference_id.is_none()) {
            return Err(LinkerError::Validation(format!(
                "Detail {} needs both id and referenceId to be updated",
                index
            )));
        }
    }

    Ok(())
}
