//! Database operations for facility entities, their fields and their tags.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::store::{EntityStatus, FacilityEntity, Taxonomy};

#[derive(Debug, sqlx::FromRow)]
struct FacilityRow {
    id: i64,
    facility_id: i64,
    title: String,
    status: String,
}

pub async fn find_by_facility_id(pool: &PgPool, facility_id: i64) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM facilities WHERE facility_id = $1")
        .bind(facility_id)
        .fetch_optional(pool)
        .await
        .context("failed to look up facility entity")?;
    Ok(id)
}

pub async fn insert(
    pool: &PgPool,
    facility_id: i64,
    title: &str,
    status: EntityStatus,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO facilities (facility_id, title, status)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(facility_id)
    .bind(title)
    .bind(status.as_str())
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert entity for facility {facility_id}"))?;
    Ok(id)
}

/// Set status, and the title when given.
pub async fn update(
    pool: &PgPool,
    id: i64,
    title: Option<&str>,
    status: EntityStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE facilities
        SET title = COALESCE($2, title), status = $3, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(status.as_str())
    .execute(pool)
    .await
    .context("failed to update facility entity")?;
    Ok(())
}

/// Batch upsert the given fields of one entity.
pub async fn write_fields(pool: &PgPool, id: i64, fields: &[(&str, &str)]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    let values: Vec<&str> = fields.iter().map(|(_, value)| *value).collect();

    sqlx::query(
        r#"
        INSERT INTO facility_fields (entity_id, name, value)
        SELECT $1::bigint, * FROM UNNEST($2::text[], $3::text[])
        ON CONFLICT (entity_id, name)
        DO UPDATE SET value = EXCLUDED.value
        "#,
    )
    .bind(id)
    .bind(&names)
    .bind(&values)
    .execute(pool)
    .await
    .context("failed to write facility fields")?;

    Ok(())
}

/// Replace the entity's tags for one taxonomy.
pub async fn replace_tags(
    pool: &PgPool,
    id: i64,
    taxonomy: Taxonomy,
    term_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM facility_terms WHERE entity_id = $1 AND taxonomy = $2")
        .bind(id)
        .bind(taxonomy.as_str())
        .execute(&mut *tx)
        .await?;

    if !term_ids.is_empty() {
        sqlx::query(
            r#"
            INSERT INTO facility_terms (entity_id, taxonomy, term_id)
            SELECT $1::bigint, $2::text, * FROM UNNEST($3::bigint[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(taxonomy.as_str())
        .bind(term_ids)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Mark every published entity as draft.
pub async fn demote_all(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE facilities SET status = 'draft', updated_at = now() WHERE status = 'published'",
    )
    .execute(pool)
    .await
    .context("failed to demote facility entities")?;
    Ok(result.rows_affected())
}

pub async fn get(pool: &PgPool, id: i64) -> Result<Option<FacilityEntity>> {
    let row = sqlx::query_as::<_, FacilityRow>(
        "SELECT id, facility_id, title, status FROM facilities WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(hydrate(pool, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// List entities, optionally filtered by status, ordered by title.
pub async fn list(pool: &PgPool, status: Option<EntityStatus>) -> Result<Vec<FacilityEntity>> {
    let rows = sqlx::query_as::<_, FacilityRow>(
        r#"
        SELECT id, facility_id, title, status
        FROM facilities
        WHERE $1::text IS NULL OR status = $1
        ORDER BY title, facility_id
        "#,
    )
    .bind(status.map(EntityStatus::as_str))
    .fetch_all(pool)
    .await
    .context("failed to list facility entities")?;

    hydrate(pool, rows).await
}

/// Attach fields and tags to entity rows with two batched queries.
async fn hydrate(pool: &PgPool, rows: Vec<FacilityRow>) -> Result<Vec<FacilityEntity>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    let field_rows = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT entity_id, name, value FROM facility_fields WHERE entity_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await
    .context("failed to load facility fields")?;

    let tag_rows = sqlx::query_as::<_, (i64, String, i64)>(
        r#"
        SELECT entity_id, taxonomy, term_id
        FROM facility_terms
        WHERE entity_id = ANY($1)
        ORDER BY term_id
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await
    .context("failed to load facility tags")?;

    let mut fields: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
    for (entity_id, name, value) in field_rows {
        fields.entry(entity_id).or_default().insert(name, value);
    }

    let mut tags: HashMap<i64, BTreeMap<Taxonomy, Vec<i64>>> = HashMap::new();
    for (entity_id, taxonomy, term_id) in tag_rows {
        tags.entry(entity_id)
            .or_default()
            .entry(taxonomy.parse()?)
            .or_default()
            .push(term_id);
    }

    Ok(rows
        .into_iter()
        .map(|row| FacilityEntity {
            id: row.id,
            facility_id: row.facility_id,
            title: row.title,
            status: EntityStatus::from_db(&row.status),
            fields: fields.remove(&row.id).unwrap_or_default(),
            tags: tags.remove(&row.id).unwrap_or_default(),
        })
        .collect())
}
