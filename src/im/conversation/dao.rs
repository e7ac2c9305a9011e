//! 会话列表本地缓存（DAO）
//!
//! 使用 sqlx / SQLite 保存最近一次拉取的会话列表，启动时先展示缓存再等待 REST 刷新。

use crate::im::conversation::types::{ConversationKind, ConversationSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::{debug, warn};

pub struct ConversationCache {
    pool: Pool<Sqlite>,
}

impl ConversationCache {
    pub async fn new(db_url: &str) -> Result<Self> {
        // 内存数据库每个连接都是独立的库，只能保留一个连接
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .with_context(|| format!("打开会话缓存失败: {}", db_url))?;
        let cache = Self { pool };
        cache.ensure_table().await?;
        Ok(cache)
    }

    async fn ensure_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_cache (
                id             TEXT NOT NULL,
                kind           TEXT NOT NULL,
                name           TEXT NOT NULL,
                members        TEXT NOT NULL,
                last_message   TEXT,
                last_activity  TEXT NOT NULL,
                unread_count   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (kind, id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("创建 conversation_cache 表失败")?;
        Ok(())
    }

    /// 用新列表整体覆盖缓存
    pub async fn save_all(&self, items: &[ConversationSummary]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM conversation_cache;")
            .execute(&mut *tx)
            .await?;
        for item in items {
            Self::insert(&mut tx, item).await?;
        }
        tx.commit().await?;
        debug!("[ConvCache] 💾 已缓存 {} 个会话", items.len());
        Ok(())
    }

    pub async fn upsert(&self, item: &ConversationSummary) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert(&mut tx, item).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        item: &ConversationSummary,
    ) -> Result<()> {
        let members = serde_json::to_string(&item.members).context("序列化成员列表失败")?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO conversation_cache (
                id, kind, name, members, last_message, last_activity, unread_count
            ) VALUES (?,?,?,?,?,?,?);
            "#,
        )
        .bind(&item.id)
        .bind(item.kind.as_str())
        .bind(&item.name)
        .bind(members)
        .bind(&item.last_message)
        .bind(item.last_activity.to_rfc3339())
        .bind(item.unread_count as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// 读取缓存，按最近活动倒序
    pub async fn load(&self) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, name, members, last_message, last_activity, unread_count
            FROM conversation_cache
            ORDER BY last_activity DESC;
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.get("kind");
            let Some(kind) = ConversationKind::parse(&kind_str) else {
                warn!("[ConvCache] 跳过未知会话类型: {}", kind_str);
                continue;
            };
            let members: String = row.get("members");
            let last_activity: String = row.get("last_activity");
            let unread: i64 = row.get("unread_count");
            items.push(ConversationSummary {
                id: row.get("id"),
                kind,
                name: row.get("name"),
                members: serde_json::from_str(&members).unwrap_or_default(),
                last_message: row.get("last_message"),
                last_activity: DateTime::parse_from_rfc3339(&last_activity)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                unread_count: unread.max(0) as u32,
            });
        }
        Ok(items)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM conversation_cache;")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(id: &str, kind: ConversationKind, secs: i64, unread: u32) -> ConversationSummary {
        ConversationSummary {
            id: id.into(),
            kind,
            name: format!("name-{}", id),
            members: vec!["me".into(), "u2".into()],
            last_message: Some("hi".into()),
            last_activity: Utc.timestamp_opt(secs, 0).unwrap(),
            unread_count: unread,
        }
    }

    #[tokio::test]
    async fn cache_round_trips_through_sqlite() {
        let cache = ConversationCache::new("sqlite::memory:").await.unwrap();
        cache
            .save_all(&[
                summary("r1", ConversationKind::Room, 100, 2),
                summary("c1", ConversationKind::Private, 200, 0),
            ])
            .await
            .unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "c1");
        assert_eq!(loaded[1], summary("r1", ConversationKind::Room, 100, 2));

        let mut bumped = summary("r1", ConversationKind::Room, 300, 3);
        bumped.last_message = None;
        cache.upsert(&bumped).await.unwrap();
        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], bumped);

        cache.save_all(&[]).await.unwrap();
        assert!(cache.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_id_different_kind_are_distinct() {
        let cache = ConversationCache::new("sqlite::memory:").await.unwrap();
        cache
            .upsert(&summary("x", ConversationKind::Room, 1, 0))
            .await
            .unwrap();
        cache
            .upsert(&summary("x", ConversationKind::Private, 2, 0))
            .await
            .unwrap();
        assert_eq!(cache.load().await.unwrap().len(), 2);
        cache.clear().await.unwrap();
        assert!(cache.load().await.unwrap().is_empty());
    }
}
