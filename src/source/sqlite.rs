use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::db::models::{
    Category, CategoryId, Chat, ChatId, ImageUrl, Listing, ListingId, ListingImage,
    ListingPreview, MessageKind, MessagePreview, UserId, UserRef, STATUS_ACTIVE,
};
use crate::source::{DataSource, ListingQuery, SourceError};
use crate::state::DbPool;

const LISTING_COLUMNS: &str = "id, seller_user_id, title, description, price, category_id, \
     city, lat_approx, lon_approx, status, created_at, updated_at";

/// Ids bound per `IN (...)` list. SQLite caps bound parameters per statement.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// SQLite implementation. Every query runs on the blocking pool and is
/// bounded by `timeout`; a timeout interrupts the statement and surfaces as
/// an error, never a retry.
pub struct SqliteSource {
    pool: DbPool,
    timeout: Duration,
    chunk_size: usize,
}

impl SqliteSource {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides how many ids go into one `IN (...)` lookup.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SourceError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (handle_tx, mut handle_rx) = tokio::sync::oneshot::channel();

        let task = tokio::task::spawn_blocking({
            let cancelled = cancelled.clone();
            move || {
                let conn = pool.get()?;
                let _ = handle_tx.send(conn.get_interrupt_handle());
                // Gave up while we were waiting for a connection
                if cancelled.load(Ordering::SeqCst) {
                    return Err(SourceError::Cancelled {
                        op,
                        reason: "timed out before start".to_string(),
                    });
                }
                f(&*conn)
            }
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(SourceError::Cancelled {
                op,
                reason: join.to_string(),
            }),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                if let Ok(handle) = handle_rx.try_recv() {
                    handle.interrupt();
                }
                tracing::warn!("Query {} timed out after {:?}", op, self.timeout);
                Err(SourceError::Timeout {
                    op,
                    after: self.timeout,
                })
            }
        }
    }
}

/// WHERE clause assembled from a typed [`ListingQuery`].
struct ListingSql {
    clauses: Vec<&'static str>,
    params: Vec<Value>,
}

impl ListingSql {
    fn from_query(query: &ListingQuery) -> Self {
        let mut sql = ListingSql {
            clauses: vec!["status = ?"],
            params: vec![Value::Text(STATUS_ACTIVE.to_string())],
        };

        if let Some(text) = &query.text {
            sql.clauses
                .push("(ci_contains(title, ?) OR ci_contains(description, ?))");
            sql.params.push(Value::Text(text.clone()));
            sql.params.push(Value::Text(text.clone()));
        }

        if let Some(category_id) = query.category_id {
            sql.clauses.push("category_id = ?");
            sql.params.push(Value::Integer(category_id));
        }

        if let Some((min_lat, max_lat)) = query.latitude_band {
            sql.clauses.push("lat_approx IS NOT NULL");
            sql.clauses.push("lon_approx IS NOT NULL");
            sql.clauses.push("lat_approx BETWEEN ? AND ?");
            sql.params.push(Value::Real(min_lat));
            sql.params.push(Value::Real(max_lat));
        }

        sql
    }

    fn select(&self) -> String {
        format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE {} ORDER BY id DESC",
            self.clauses.join(" AND ")
        )
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn id_values(ids: &[i64]) -> Vec<Value> {
    ids.iter().map(|id| Value::Integer(*id)).collect()
}

/// Runs `f` once per slice of at most `size` ids and concatenates the rows.
fn in_chunks<T>(
    ids: &[i64],
    size: usize,
    mut f: impl FnMut(&[i64]) -> Result<Vec<T>, SourceError>,
) -> Result<Vec<T>, SourceError> {
    let mut rows = Vec::new();
    for chunk in ids.chunks(size.max(1)) {
        rows.extend(f(chunk)?);
    }
    Ok(rows)
}

fn map_listing(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        seller_user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        category_id: row.get(5)?,
        city: row.get(6)?,
        lat_approx: row.get(7)?,
        lon_approx: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn active_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>, SourceError> {
        let sql = ListingSql::from_query(query);
        self.run("active_listings", move |conn| {
            let mut stmt = conn.prepare(&sql.select())?;
            let rows = stmt
                .query_map(params_from_iter(sql.params.iter()), map_listing)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn listing(&self, id: ListingId) -> Result<Option<Listing>, SourceError> {
        self.run("listing", move |conn| {
            let listing = conn
                .query_row(
                    &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
                    params![id],
                    map_listing,
                )
                .optional()?;
            Ok(listing)
        })
        .await
    }

    async fn images_for(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ListingImage>, SourceError> {
        if listing_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = listing_ids.to_vec();
        let chunk_size = self.chunk_size;
        self.run("images_for", move |conn| {
            in_chunks(&ids, chunk_size, |chunk| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, listing_id, url, sort_order FROM listing_images
                     WHERE listing_id IN ({})
                     ORDER BY listing_id, sort_order ASC, id ASC",
                    placeholders(chunk.len())
                ))?;
                let images = stmt
                    .query_map(params_from_iter(id_values(chunk)), |row| {
                        Ok(ListingImage {
                            id: row.get(0)?,
                            listing_id: row.get(1)?,
                            url: row.get(2)?,
                            sort_order: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(images)
            })
        })
        .await
    }

    async fn categories(&self, ids: &[CategoryId]) -> Result<Vec<Category>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        let chunk_size = self.chunk_size;
        self.run("categories", move |conn| {
            in_chunks(&ids, chunk_size, |chunk| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, name FROM categories WHERE id IN ({})",
                    placeholders(chunk.len())
                ))?;
                let categories = stmt
                    .query_map(params_from_iter(id_values(chunk)), |row| {
                        Ok(Category {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(categories)
            })
        })
        .await
    }

    async fn users(&self, ids: &[UserId]) -> Result<Vec<UserRef>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        let chunk_size = self.chunk_size;
        self.run("users", move |conn| {
            in_chunks(&ids, chunk_size, |chunk| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, full_name FROM users WHERE id IN ({})",
                    placeholders(chunk.len())
                ))?;
                let users = stmt
                    .query_map(params_from_iter(id_values(chunk)), |row| {
                        Ok(UserRef {
                            id: row.get(0)?,
                            full_name: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(users)
            })
        })
        .await
    }

    async fn chats_for(&self, viewer: UserId) -> Result<Vec<Chat>, SourceError> {
        self.run("chats_for", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, listing_id, buyer_user_id, seller_user_id, last_message_at,
                        is_blocked, blocked_reason, blocked_at
                 FROM chats
                 WHERE buyer_user_id = ?1 OR seller_user_id = ?1",
            )?;
            let chats = stmt
                .query_map(params![viewer], |row| {
                    Ok(Chat {
                        id: row.get(0)?,
                        listing_id: row.get(1)?,
                        buyer_user_id: row.get(2)?,
                        seller_user_id: row.get(3)?,
                        last_message_at: row.get(4)?,
                        is_blocked: row.get(5)?,
                        blocked_reason: row.get(6)?,
                        blocked_at: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(chats)
        })
        .await
    }

    async fn unread_counts(
        &self,
        viewer: UserId,
        chat_ids: &[ChatId],
    ) -> Result<HashMap<ChatId, u64>, SourceError> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = chat_ids.to_vec();
        let chunk_size = self.chunk_size;
        self.run("unread_counts", move |conn| {
            let counts = in_chunks(&ids, chunk_size, |chunk| {
                let mut values = vec![Value::Integer(viewer)];
                values.extend(id_values(chunk));
                let mut stmt = conn.prepare(&format!(
                    "SELECT chat_id, COUNT(*) FROM messages
                     WHERE sender_user_id <> ? AND read_at IS NULL AND chat_id IN ({})
                     GROUP BY chat_id",
                    placeholders(chunk.len())
                ))?;
                let counts = stmt
                    .query_map(params_from_iter(values), |row| {
                        Ok((row.get::<_, ChatId>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(counts)
            })?;
            counts
                .into_iter()
                .map(|(chat_id, count)| {
                    u64::try_from(count)
                        .map(|count| (chat_id, count))
                        .map_err(|_| {
                            SourceError::Malformed(format!("negative count for chat {chat_id}"))
                        })
                })
                .collect()
        })
        .await
    }

    async fn last_messages(
        &self,
        chat_ids: &[ChatId],
    ) -> Result<HashMap<ChatId, MessagePreview>, SourceError> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = chat_ids.to_vec();
        let chunk_size = self.chunk_size;
        self.run("last_messages", move |conn| {
            let rows = in_chunks(&ids, chunk_size, |chunk| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT chat_id, id, type, text, image_url, created_at FROM (
                         SELECT m.*, ROW_NUMBER() OVER (
                             PARTITION BY chat_id ORDER BY created_at DESC, id DESC
                         ) AS rn
                         FROM messages m
                         WHERE chat_id IN ({})
                     ) WHERE rn = 1",
                    placeholders(chunk.len())
                ))?;
                let rows = stmt
                    .query_map(params_from_iter(id_values(chunk)), |row| {
                        Ok((
                            row.get::<_, ChatId>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, DateTime<Utc>>(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })?;

            let mut latest = HashMap::with_capacity(rows.len());
            for (chat_id, id, kind, text, image_url, created_at) in rows {
                let kind: MessageKind = kind.parse().map_err(SourceError::Malformed)?;
                latest.insert(
                    chat_id,
                    MessagePreview {
                        id,
                        kind,
                        text,
                        image_url,
                        created_at,
                    },
                );
            }
            Ok(latest)
        })
        .await
    }

    async fn listing_previews(
        &self,
        ids: &[ListingId],
    ) -> Result<Vec<ListingPreview>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        let chunk_size = self.chunk_size;
        self.run("listing_previews", move |conn| {
            in_chunks(&ids, chunk_size, |chunk| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT l.id, l.title, l.price, l.city,
                            (SELECT i.url FROM listing_images i
                             WHERE i.listing_id = l.id
                             ORDER BY i.sort_order ASC, i.id ASC
                             LIMIT 1)
                     FROM listings l
                     WHERE l.id IN ({})",
                    placeholders(chunk.len())
                ))?;
                let previews = stmt
                    .query_map(params_from_iter(id_values(chunk)), |row| {
                        let cover: Option<String> = row.get(4)?;
                        Ok(ListingPreview {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            price: row.get(2)?,
                            city: row.get(3)?,
                            images: cover.map(|url| ImageUrl { url }).into_iter().collect(),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(previews)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_sql_always_filters_active() {
        let sql = ListingSql::from_query(&ListingQuery::default());
        assert_eq!(sql.clauses, vec!["status = ?"]);
        assert_eq!(sql.params, vec![Value::Text("active".into())]);
    }

    #[test]
    fn listing_sql_binds_every_predicate_in_order() {
        let query = ListingQuery {
            text: Some("bici".into()),
            category_id: Some(3),
            latitude_band: Some((-1.0, 1.0)),
        };
        let sql = ListingSql::from_query(&query);
        let placeholders = sql.select().matches('?').count();
        assert_eq!(placeholders, sql.params.len());
        assert_eq!(
            sql.params,
            vec![
                Value::Text("active".into()),
                Value::Text("bici".into()),
                Value::Text("bici".into()),
                Value::Integer(3),
                Value::Real(-1.0),
                Value::Real(1.0),
            ]
        );
        assert!(sql.select().contains("lat_approx IS NOT NULL"));
    }

    #[test]
    fn placeholders_are_comma_separated() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn in_chunks_splits_and_concatenates_in_order() {
        let ids: Vec<i64> = (1..=7).collect();
        let mut calls = Vec::new();
        let rows = in_chunks(&ids, 3, |chunk| {
            calls.push(chunk.len());
            Ok(chunk.iter().map(|id| id * 10).collect())
        })
        .unwrap();
        assert_eq!(calls, vec![3, 3, 1]);
        assert_eq!(rows, vec![10, 20, 30, 40, 50, 60, 70]);
    }

    #[test]
    fn in_chunks_stops_at_first_error() {
        let ids: Vec<i64> = (1..=6).collect();
        let mut calls = 0;
        let result: Result<Vec<i64>, _> = in_chunks(&ids, 2, |_| {
            calls += 1;
            Err(SourceError::Malformed("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn timeout_interrupts_running_statement() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(&tmp.path().join("slow.db"), 1).unwrap();
        let source = SqliteSource::new(pool.clone(), Duration::from_millis(100));

        let result = source
            .run("endless", |conn| {
                let n: i64 = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                     SELECT count(*) FROM c",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await;
        assert!(matches!(
            result,
            Err(SourceError::Timeout { op: "endless", .. })
        ));

        // The interrupted statement hands its connection back to the pool
        let conn = pool.get_timeout(Duration::from_secs(5));
        assert!(conn.is_ok());
    }
}
