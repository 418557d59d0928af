#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rusqlite::params;
use tempfile::TempDir;

use mercadito::config::Config;
use mercadito::db;
use mercadito::source::{DynDataSource, SqliteSource};
use mercadito::state::{AppState, DbPool};

/// Migrated database in a temporary directory plus seeding helpers.
pub struct Fixture {
    _dir: TempDir,
    pub pool: DbPool,
}

#[derive(Debug, Clone)]
pub struct ListingSeed {
    pub id: i64,
    pub seller: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub category_id: Option<i64>,
    pub city: Option<String>,
    pub coords: Option<(f64, f64)>,
    pub status: &'static str,
}

impl ListingSeed {
    pub fn new(id: i64, seller: i64, title: &str) -> Self {
        Self {
            id,
            seller,
            title: title.to_string(),
            description: None,
            price: 100.0,
            category_id: None,
            city: Some("Santo Domingo".to_string()),
            coords: None,
            status: "active",
        }
    }

    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.coords = Some((lat, lon));
        self
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.status = "deleted";
        self
    }
}

/// Canonical stored timestamp `minute` minutes after 2025-01-01T10:00:00Z.
pub fn at(minute: i64) -> String {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
    (base + chrono::Duration::minutes(minute))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("test.db"), 4)
            .expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");
        Self { _dir: dir, pool }
    }

    pub fn source(&self) -> DynDataSource {
        Arc::new(SqliteSource::new(self.pool.clone(), Duration::from_secs(5)))
    }

    /// Source that splits id lookups into slices of `chunk_size`.
    pub fn chunked_source(&self, chunk_size: usize) -> DynDataSource {
        Arc::new(
            SqliteSource::new(self.pool.clone(), Duration::from_secs(5))
                .with_chunk_size(chunk_size),
        )
    }

    pub fn state(&self) -> AppState {
        AppState::new(Config::default(), self.source())
    }

    pub fn user(&self, id: i64, name: &str) {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, full_name, email) VALUES (?1, ?2, ?3)",
            params![id, name, format!("user{id}@example.com")],
        )
        .unwrap();
    }

    pub fn category(&self, id: i64, name: &str) {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO categories (id, name) VALUES (?1, ?2)",
            params![id, name],
        )
        .unwrap();
    }

    pub fn listing(&self, seed: ListingSeed) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO listings (id, seller_user_id, title, description, price, category_id,
                                   city, lat_approx, lon_approx, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                seed.id,
                seed.seller,
                seed.title,
                seed.description,
                seed.price,
                seed.category_id,
                seed.city,
                seed.coords.map(|c| c.0),
                seed.coords.map(|c| c.1),
                seed.status,
            ],
        )
        .unwrap();
        seed.id
    }

    /// `count` active listings with ids `1..=count`, each with one image, in one transaction.
    pub fn bulk_listings(&self, seller: i64, count: i64) {
        let conn = self.pool.get().unwrap();
        let tx = conn.unchecked_transaction().unwrap();
        {
            let mut listing = tx
                .prepare(
                    "INSERT INTO listings (id, seller_user_id, title, price, lat_approx, lon_approx)
                     VALUES (?1, ?2, ?3, 1.0, 0.0, 0.0)",
                )
                .unwrap();
            let mut image = tx
                .prepare("INSERT INTO listing_images (listing_id, url, sort_order) VALUES (?1, ?2, 0)")
                .unwrap();
            for id in 1..=count {
                listing
                    .execute(params![id, seller, format!("Listing {id}")])
                    .unwrap();
                image
                    .execute(params![id, format!("https://img/{id}.jpg")])
                    .unwrap();
            }
        }
        tx.commit().unwrap();
    }

    pub fn image(&self, listing_id: i64, url: &str, sort_order: i64) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO listing_images (listing_id, url, sort_order) VALUES (?1, ?2, ?3)",
            params![listing_id, url, sort_order],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn chat(&self, listing_id: i64, buyer: i64, seller: i64, last_message_at: Option<i64>) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO chats (listing_id, buyer_user_id, seller_user_id, last_message_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![listing_id, buyer, seller, last_message_at.map(at)],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn message(&self, chat_id: i64, sender: i64, text: &str, minute: i64, read: bool) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO messages (chat_id, sender_user_id, type, text, created_at, read_at)
             VALUES (?1, ?2, 'text', ?3, ?4, ?5)",
            params![
                chat_id,
                sender,
                text,
                at(minute),
                read.then(|| at(minute + 1))
            ],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn image_message(&self, chat_id: i64, sender: i64, url: &str, minute: i64) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO messages (chat_id, sender_user_id, type, image_url, created_at)
             VALUES (?1, ?2, 'image', ?3, ?4)",
            params![chat_id, sender, url, at(minute)],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    /// Mark everything the other participant sent as read by `reader`.
    pub fn mark_read(&self, chat_id: i64, reader: i64) {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "UPDATE messages SET read_at = ?3 WHERE chat_id = ?1 AND sender_user_id <> ?2 AND read_at IS NULL",
            params![chat_id, reader, at(500)],
        )
        .unwrap();
    }

    /// Soft delete as the listing-management side does: flag the listing, block its chats.
    pub fn soft_delete_listing(&self, listing_id: i64) {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "UPDATE listings SET status = 'deleted' WHERE id = ?1",
            params![listing_id],
        )
        .unwrap();
        conn.execute(
            "UPDATE chats SET is_blocked = 1, blocked_reason = 'listing_deleted', blocked_at = ?2
             WHERE listing_id = ?1",
            params![listing_id, at(600)],
        )
        .unwrap();
    }
}
