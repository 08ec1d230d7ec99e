// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            let db_path = database_url
                .strip_prefix("sqlite://")
                .or_else(|| database_url.strip_prefix("sqlite:"))
                .unwrap_or(database_url);

            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path).await?;
            }
        }

        // Every connection to an in-memory database sees its own database
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_products_sql = r"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                affiliate_link TEXT NOT NULL,
                title_en TEXT NOT NULL,
                title_ar TEXT,
                description_en TEXT,
                description_ar TEXT,
                price REAL,
                original_price REAL,
                discount_percent REAL,
                currency TEXT NOT NULL DEFAULT 'AED',
                image_url TEXT,
                all_images TEXT NOT NULL DEFAULT '[]',
                specifications TEXT NOT NULL DEFAULT '{}',
                category TEXT NOT NULL DEFAULT 'General',
                brand TEXT,
                rating REAL,
                reviews_count INTEGER NOT NULL DEFAULT 0,
                overall_score INTEGER NOT NULL DEFAULT 0,
                priority_score REAL NOT NULL DEFAULT 0,
                is_featured BOOLEAN NOT NULL DEFAULT 0,
                content_origin TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        ";

        let create_indexes_sql = r"
            CREATE INDEX IF NOT EXISTS idx_products_category ON products (category);
            CREATE INDEX IF NOT EXISTS idx_products_priority ON products (priority_score);
        ";

        sqlx::query(create_products_sql).execute(&self.pool).await?;
        sqlx::raw_sql(create_indexes_sql).execute(&self.pool).await?;

        info!("Database schema ready");
        Ok(())
    }
}
