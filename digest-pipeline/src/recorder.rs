use crate::types::{DigestError, DigestRecord, Result};
use async_trait::async_trait;
use interfaces::defs::DigestRecorder;
use sqlx::{PgPool, Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

/// Persists "this digest was sent" rows to PostgreSQL.
pub struct PgDigestRecorder {
    db: Pool<Postgres>,
}

impl PgDigestRecorder {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS digests (
                id UUID PRIMARY KEY,
                recipient TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                subject TEXT NOT NULL,
                delivery_id TEXT NOT NULL,
                sent_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS digest_articles (
                digest_id UUID NOT NULL REFERENCES digests (id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                topic TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                source_name TEXT NOT NULL,
                summary TEXT,
                PRIMARY KEY (digest_id, position)
            )
            "#,
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn insert(&self, record: &DigestRecord) -> Result<()> {
        let digest_id = Uuid::parse_str(&record.digest_id)
            .map_err(|e| DigestError::Parse(format!("digest id {}: {}", record.digest_id, e)))?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO digests (id, recipient, provider, model, subject, delivery_id, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(digest_id)
        .bind(&record.recipient)
        .bind(&record.model.provider)
        .bind(&record.model.model)
        .bind(&record.subject)
        .bind(&record.delivery_id)
        .bind(record.sent_at)
        .execute(&mut *tx)
        .await?;

        for (position, article) in record.articles.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO digest_articles (digest_id, position, topic, url, title, source_name, summary)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(digest_id)
            .bind(position as i32)
            .bind(&article.topic)
            .bind(&article.item.url)
            .bind(&article.item.title)
            .bind(&article.item.source_name)
            .bind(&article.summary)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Recorded digest {} with {} articles", record.digest_id, record.articles.len());
        Ok(())
    }

    pub async fn article_count(&self, digest_id: &str) -> Result<i64> {
        let digest_id = Uuid::parse_str(digest_id).map_err(|e| DigestError::Parse(e.to_string()))?;
        let row = sqlx::query("SELECT COUNT(*) AS count FROM digest_articles WHERE digest_id = $1")
            .bind(digest_id)
            .fetch_one(&self.db)
            .await?;
        Ok(row.get("count"))
    }
}

#[async_trait]
impl DigestRecorder for PgDigestRecorder {
    async fn record(&self, record: &DigestRecord) -> anyhow::Result<()> {
        self.insert(record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Item, ModelIdentity, OriginKind, RecordedArticle};
    use chrono::Utc;

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a PostgreSQL database"]
    async fn records_digest_and_articles() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let recorder = PgDigestRecorder::connect(&url).await.unwrap();
        recorder.setup_schema().await.unwrap();

        let digest_id = Uuid::new_v4().to_string();
        let record = DigestRecord {
            digest_id: digest_id.clone(),
            recipient: "reader@example.com".to_string(),
            model: ModelIdentity::new("Anthropic", "claude-sonnet"),
            subject: "Your News Digest: AI News".to_string(),
            delivery_id: "msg-1".to_string(),
            sent_at: Utc::now(),
            articles: vec![
                RecordedArticle {
                    topic: "AI News".to_string(),
                    item: Item::new("https://a/1", "One", "Wire", OriginKind::SearchResult),
                    summary: None,
                },
                RecordedArticle {
                    topic: "AI News".to_string(),
                    item: Item::new("https://a/2", "Two", "Wire", OriginKind::SearchResult),
                    summary: Some("Short".to_string()),
                },
            ],
        };

        recorder.insert(&record).await.unwrap();
        assert_eq!(recorder.article_count(&digest_id).await.unwrap(), 2);
    }
}
