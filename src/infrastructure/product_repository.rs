use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{ContentOrigin, InsertOutcome, Locale, PersistenceFailure, ProductRecord, ProductSink};

/// Longest title stored per locale
const MAX_TITLE_CHARS: usize = 200;

/// Product sink backed by the `products` table
#[derive(Clone)]
pub struct SqliteProductSink {
    pool: Arc<SqlitePool>,
}

impl SqliteProductSink {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, PersistenceFailure> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.0)
    }
}

fn unavailable(e: sqlx::Error) -> PersistenceFailure {
    PersistenceFailure::Unavailable(e.to_string())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
impl ProductSink for SqliteProductSink {
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, PersistenceFailure> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT id FROM products WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String,)> = builder
            .build_query_as()
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_if_absent(&self, record: &ProductRecord) -> Result<InsertOutcome, PersistenceFailure> {
        let product = &record.product;
        let primary = record.content.first();
        let arabic = record.content.iter().find(|c| c.locale == Locale::Ar);

        let title_en = primary
            .and_then(|c| c.titles.get(&Locale::En))
            .map_or(product.title.as_str(), String::as_str);
        let title_ar = primary.and_then(|c| c.titles.get(&Locale::Ar));

        let reject = |reason: String| PersistenceFailure::Rejected {
            id: record.id.clone(),
            reason,
        };
        let all_images = serde_json::to_string(&product.images).map_err(|e| reject(e.to_string()))?;
        let specifications = serde_json::to_string(&product.specs).map_err(|e| reject(e.to_string()))?;

        let origin = match primary.map(|c| c.origin) {
            Some(ContentOrigin::Generated) => "generated",
            _ => "fallback",
        };
        let rating = product.review_summary.average_rating;
        let is_featured = rating.is_some_and(|r| r >= 4.5);

        let result = sqlx::query(
            r"
            INSERT INTO products
            (id, url, affiliate_link, title_en, title_ar, description_en, description_ar,
             price, original_price, discount_percent, currency, image_url, all_images,
             specifications, category, brand, rating, reviews_count, overall_score,
             priority_score, is_featured, content_origin, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.affiliate_link)
        .bind(truncate_chars(title_en, MAX_TITLE_CHARS))
        .bind(title_ar.map(|t| truncate_chars(t, MAX_TITLE_CHARS)))
        .bind(primary.map(|c| c.to_description()))
        .bind(arabic.map(|c| c.to_description()))
        .bind(product.price.current)
        .bind(product.price.original)
        .bind(product.price.discount_percent)
        .bind(&product.price.currency)
        .bind(product.images.first().cloned())
        .bind(all_images)
        .bind(specifications)
        .bind(product.category_or_default())
        .bind(&product.brand)
        .bind(rating)
        .bind(i64::from(product.review_summary.count))
        .bind(i64::from(record.overall_score))
        .bind(record.priority_score)
        .bind(is_featured)
        .bind(origin)
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) => reject(db.to_string()),
            other => unavailable(other),
        })?;

        if result.rows_affected() == 0 {
            debug!("Product {} already stored", record.id);
            Ok(InsertOutcome::AlreadyPresent)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }
}
