//! Database operations for the `taxonomy_terms` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::store::{NewTerm, Taxonomy, Term};

#[derive(Debug, sqlx::FromRow)]
struct TermRow {
    id: i64,
    taxonomy: String,
    name: String,
    slug: String,
    description: String,
    parent_id: Option<i64>,
}

impl TryFrom<TermRow> for Term {
    type Error = anyhow::Error;

    fn try_from(row: TermRow) -> Result<Self> {
        Ok(Term {
            id: row.id,
            taxonomy: row.taxonomy.parse()?,
            name: row.name,
            slug: row.slug,
            description: row.description,
            parent: row.parent_id,
        })
    }
}

/// Whether the taxonomy namespace exists.
pub async fn is_registered(pool: &PgPool, taxonomy: Taxonomy) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM taxonomies WHERE name = $1)",
    )
    .bind(taxonomy.as_str())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Look up a term by its slug within a taxonomy.
pub async fn find_by_slug(pool: &PgPool, taxonomy: Taxonomy, slug: &str) -> Result<Option<Term>> {
    let row = sqlx::query_as::<_, TermRow>(
        r#"
        SELECT id, taxonomy, name, slug, description, parent_id
        FROM taxonomy_terms
        WHERE taxonomy = $1 AND slug = $2
        "#,
    )
    .bind(taxonomy.as_str())
    .bind(slug)
    .fetch_optional(pool)
    .await
    .context("failed to look up term by slug")?;

    row.map(Term::try_from).transpose()
}

/// Insert a term and return its id. Fails on a duplicate slug.
pub async fn insert(pool: &PgPool, taxonomy: Taxonomy, term: &NewTerm) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO taxonomy_terms (taxonomy, name, slug, description, parent_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(taxonomy.as_str())
    .bind(&term.name)
    .bind(&term.slug)
    .bind(&term.description)
    .bind(term.parent)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert {taxonomy} term '{}'", term.slug))?;
    Ok(id)
}

/// All terms of a taxonomy, ordered by name.
pub async fn list(pool: &PgPool, taxonomy: Taxonomy) -> Result<Vec<Term>> {
    let rows = sqlx::query_as::<_, TermRow>(
        r#"
        SELECT id, taxonomy, name, slug, description, parent_id
        FROM taxonomy_terms
        WHERE taxonomy = $1
        ORDER BY name
        "#,
    )
    .bind(taxonomy.as_str())
    .fetch_all(pool)
    .await
    .context("failed to list terms")?;

    rows.into_iter().map(Term::try_from).collect()
}
