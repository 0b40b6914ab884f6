// ============================================================================
// Menu Infrastructure - PostgreSQL Menu Store
// File: crates/menu-infrastructure/src/database/postgres/menu_store_impl.rs
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, error, info};

use menu_core::domain::{Item, ItemType, NewItem, Scope, Section, SectionType};
use menu_core::error::DomainError;
use menu_core::repositories::{ChildrenSource, MenuStore, MenuTransaction};
use menu_shared::constants::SECTION_LOCK_NAMESPACE;
use menu_shared::{ItemId, Position, SectionId};

const ITEM_COLUMNS: &str =
    "id, section_id, parent_id, item_type, label, link, position, created_at, updated_at";

const SECTION_COLUMNS: &str = "id, section_type, created_at, updated_at";

/// SQLSTATEs that mean "someone else holds it": lock_not_available, deadlock_detected.
const BUSY_STATES: [&str; 2] = ["55P03", "40P01"];

pub struct PgMenuStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgMenuStore {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }
}

// Internal row types for SQLx mapping
#[derive(Debug, FromRow)]
struct ItemRow {
    pub id: i64,
    pub section_id: i64,
    pub parent_id: Option<i64>,
    pub item_type: String,
    pub label: String,
    pub link: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            item_type: ItemType::from_str(&row.item_type).unwrap_or_default(),
            label: row.label,
            link: row.link,
            position: row.position,
            section_id: row.section_id,
            parent_id: row.parent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SectionRow {
    pub id: i64,
    pub section_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SectionRow> for Section {
    type Error = DomainError;

    fn try_from(row: SectionRow) -> Result<Self, Self::Error> {
        let section_type = SectionType::from_str(&row.section_type).ok_or_else(|| {
            DomainError::StorageFailure(format!(
                "section {} has unknown type '{}'",
                row.id, row.section_type
            ))
        })?;
        Ok(Section {
            id: row.id,
            section_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn map_sqlx(context: &str, e: sqlx::Error) -> DomainError {
    let code = e
        .as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned());
    match code.as_deref() {
        Some(state) if BUSY_STATES.contains(&state) => DomainError::Busy(format!("{} ({})", context, state)),
        _ => {
            error!("Database error {}: {}", context, e);
            DomainError::StorageFailure(format!("{}: {}", context, e))
        }
    }
}

#[async_trait]
impl MenuStore for PgMenuStore {
    async fn begin(&self) -> Result<Box<dyn MenuTransaction>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx("beginning transaction", e))?;

        // Covers both advisory and row locks taken by this transaction.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("setting lock timeout", e))?;

        Ok(Box::new(PgMenuTransaction { tx }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgMenuTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgMenuTransaction {
    async fn fetch_items(&mut self, sql: &str, ids: &[ItemId], context: &str) -> Result<Vec<Item>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ItemRow> = sqlx::query_as(sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx(context, e))?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn savepoint(&mut self, statement: &str) -> Result<(), DomainError> {
        sqlx::query(statement)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx("managing savepoint", e))
    }
}

#[async_trait]
impl ChildrenSource for PgMenuTransaction {
    async fn children_of(&mut self, parents: &[ItemId]) -> Result<Vec<Item>, DomainError> {
        let sql = format!("SELECT {} FROM menu_items WHERE parent_id = ANY($1)", ITEM_COLUMNS);
        self.fetch_items(&sql, parents, "loading children").await
    }
}

#[async_trait]
impl MenuTransaction for PgMenuTransaction {
    async fn lock_section(&mut self, section_id: SectionId) -> Result<(), DomainError> {
        let key = i32::try_from(section_id).map_err(|_| {
            DomainError::InvalidArgument(format!("section id {} out of lock key range", section_id))
        })?;
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(SECTION_LOCK_NAMESPACE)
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx(&format!("locking section {}", section_id), e))?;
        Ok(())
    }

    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, DomainError> {
        let sql = format!(
            "SELECT {} FROM menu_items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            ITEM_COLUMNS
        );
        self.fetch_items(&sql, ids, "locking items").await
    }

    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, DomainError> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM menu_items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("finding item", e))?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, DomainError> {
        let sql = format!("SELECT {} FROM menu_items WHERE id = ANY($1) ORDER BY id", ITEM_COLUMNS);
        self.fetch_items(&sql, ids, "finding items").await
    }

    async fn list_items(&mut self) -> Result<Vec<Item>, DomainError> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM menu_items ORDER BY section_id, parent_id NULLS FIRST, position, id",
            ITEM_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("listing items", e))?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn find_section(&mut self, id: SectionId) -> Result<Option<Section>, DomainError> {
        let row: Option<SectionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM menu_sections WHERE id = $1",
            SECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("finding section", e))?;

        row.map(Section::try_from).transpose()
    }

    async fn find_section_by_type(&mut self, section_type: SectionType) -> Result<Option<Section>, DomainError> {
        let row: Option<SectionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM menu_sections WHERE section_type = $1",
            SECTION_COLUMNS
        ))
        .bind(section_type.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("finding section by type", e))?;

        row.map(Section::try_from).transpose()
    }

    async fn create_section(&mut self, section_type: SectionType) -> Result<Section, DomainError> {
        info!("Creating section: {}", section_type.as_str());

        let row: SectionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO menu_sections (section_type)
            VALUES ($1)
            ON CONFLICT (section_type) DO UPDATE SET updated_at = NOW()
            RETURNING {}
            "#,
            SECTION_COLUMNS
        ))
        .bind(section_type.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("creating section", e))?;

        Section::try_from(row)
    }

    async fn list_sections(&mut self) -> Result<Vec<Section>, DomainError> {
        let rows: Vec<SectionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM menu_sections ORDER BY id",
            SECTION_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("listing sections", e))?;

        rows.into_iter().map(Section::try_from).collect()
    }

    async fn insert_item(&mut self, item: &NewItem) -> Result<Item, DomainError> {
        let row: ItemRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO menu_items (section_id, parent_id, item_type, label, link, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(item.section_id)
        .bind(item.parent_id)
        .bind(item.item_type.as_str())
        .bind(&item.label)
        .bind(&item.link)
        .bind(item.position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("inserting item", e))?;

        Ok(row.into())
    }

    async fn update_item(&mut self, item: &Item) -> Result<(), DomainError> {
        // A failed statement poisons the transaction; the savepoint keeps the
        // rest of the batch alive.
        self.savepoint("SAVEPOINT menu_item_update").await?;

        let result = sqlx::query(
            r#"
            UPDATE menu_items
            SET
                section_id = $2,
                parent_id = $3,
                item_type = $4,
                label = $5,
                link = $6,
                position = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(item.section_id)
        .bind(item.parent_id)
        .bind(item.item_type.as_str())
        .bind(&item.label)
        .bind(&item.link)
        .bind(item.position)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                self.savepoint("RELEASE SAVEPOINT menu_item_update").await
            }
            Ok(_) => {
                self.savepoint("ROLLBACK TO SAVEPOINT menu_item_update").await?;
                Err(DomainError::ItemNotFound(item.id))
            }
            Err(e) => {
                self.savepoint("ROLLBACK TO SAVEPOINT menu_item_update").await?;
                Err(map_sqlx(&format!("updating item {}", item.id), e))
            }
        }
    }

    async fn set_positions(&mut self, positions: &[(ItemId, Position)]) -> Result<(), DomainError> {
        if positions.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<ItemId>, Vec<Position>) = positions.iter().copied().unzip();
        sqlx::query(
            r#"
            UPDATE menu_items AS m
            SET position = v.position, updated_at = NOW()
            FROM UNNEST($1::BIGINT[], $2::INT[]) AS v(id, position)
            WHERE m.id = v.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("setting positions", e))?;

        debug!("Set {} positions", ids.len());
        Ok(())
    }

    async fn shift_scope(&mut self, scope: Scope, from: Position, exclude: &[ItemId]) -> Result<u64, DomainError> {
        let done = sqlx::query(
            r#"
            UPDATE menu_items
            SET position = position + 1, updated_at = NOW()
            WHERE section_id = $1
              AND parent_id IS NOT DISTINCT FROM $2
              AND position >= $3
              AND NOT (id = ANY($4))
            "#,
        )
        .bind(scope.section_id)
        .bind(scope.parent_id)
        .bind(from)
        .bind(exclude)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("shifting scope", e))?;

        Ok(done.rows_affected())
    }

    async fn set_parent(&mut self, id: ItemId, parent_id: Option<ItemId>) -> Result<(), DomainError> {
        sqlx::query("UPDATE menu_items SET parent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(parent_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("setting parent", e))?;
        Ok(())
    }

    async fn set_section(&mut self, ids: &[ItemId], section_id: SectionId) -> Result<(), DomainError> {
        sqlx::query("UPDATE menu_items SET section_id = $2, updated_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .bind(section_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("setting section", e))?;
        Ok(())
    }

    async fn delete_items(&mut self, ids: &[ItemId]) -> Result<u64, DomainError> {
        let done = sqlx::query("DELETE FROM menu_items WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("deleting items", e))?;
        Ok(done.rows_affected())
    }

    async fn delete_section_items(&mut self, section_id: SectionId) -> Result<u64, DomainError> {
        let done = sqlx::query("DELETE FROM menu_items WHERE section_id = $1")
            .bind(section_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("deleting section items", e))?;
        Ok(done.rows_affected())
    }

    async fn delete_section(&mut self, section_id: SectionId) -> Result<bool, DomainError> {
        let done = sqlx::query("DELETE FROM menu_sections WHERE id = $1")
            .bind(section_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("deleting section", e))?;
        Ok(done.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(|e| map_sqlx("committing", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(|e| map_sqlx("rolling back", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_row_with_unknown_type_is_rejected() {
        let row = SectionRow {
            id: 1,
            section_type: "footer".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(Section::try_from(row), Err(DomainError::StorageFailure(_))));
    }

    #[test]
    fn test_item_row_maps_type() {
        let row = ItemRow {
            id: 4,
            section_id: 1,
            parent_id: Some(2),
            item_type: "header".into(),
            label: "Catalog".into(),
            link: None,
            position: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let item = Item::from(row);
        assert_eq!(item.item_type, ItemType::Header);
        assert_eq!(item.scope(), Scope::new(1, Some(2)));
    }

    #[test]
    fn test_non_database_errors_are_storage_failures() {
        let err = map_sqlx("finding item", sqlx::Error::RowNotFound);
        assert!(matches!(err, DomainError::StorageFailure(_)));
    }
}
