//! SQLite backend implementation
//!
//! Provides persistent storage using SQLite with WAL mode for concurrency.
//! This is the default backend: a single job/scenario/content schema
//! underlying `JobStore`, `ScenarioStore`, and `ContentStore`.

use crate::{Content, ContentStatus, Job, JobStatus, JobStore, ContentStore, Scenario, ScenarioStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row};
use std::str::FromStr;

/// SQLite-backed job/scenario/content store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a SQLite database at the specified path.
    ///
    /// Automatically runs migrations to set up the schema.
    pub async fn open(path: &str) -> Result<Self> {
        let db_url = if path.starts_with("sqlite://") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        if !sqlx::Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&db_url)
                .await
                .context("failed to create database")?;
        }

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;

        Ok(Self { pool })
    }

    /// Get the underlying pool (for advanced usage).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_scenarios(&self, job_id: &str) -> Result<Vec<Scenario>> {
        let rows = sqlx::query(
            "SELECT scenario_id, persona_name, persona_archetype, pain_point_detail, goal_focus, \
             blog_topic_headline, target_keywords, required_word_count, research_insight, \
             image_urls, blog_type \
             FROM scenarios WHERE job_id = ? ORDER BY scenario_id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_scenario).collect()
    }
}

fn row_to_scenario(row: &SqliteRow) -> Result<Scenario> {
    let target_keywords: String = row.try_get("target_keywords")?;
    let image_urls: String = row.try_get("image_urls")?;

    Ok(Scenario {
        scenario_id: row.try_get::<i64, _>("scenario_id")? as u32,
        persona_name: row.try_get("persona_name")?,
        persona_archetype: row.try_get("persona_archetype")?,
        pain_point_detail: row.try_get("pain_point_detail")?,
        goal_focus: row.try_get("goal_focus")?,
        blog_topic_headline: row.try_get("blog_topic_headline")?,
        target_keywords: serde_json::from_str(&target_keywords)?,
        required_word_count: row.try_get::<i64, _>("required_word_count")? as u32,
        research_insight: row.try_get("research_insight")?,
        image_urls: serde_json::from_str(&image_urls)?,
        blog_type: row.try_get("blog_type")?,
    })
}

fn row_to_content(row: &SqliteRow) -> Result<Content> {
    let keywords: String = row.try_get("keywords")?;
    let image_urls: String = row.try_get("image_urls")?;
    let status_str: String = row.try_get("status")?;

    Ok(Content {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        scenario_id: row.try_get::<i64, _>("scenario_id")? as u32,
        source_scenario_id: row.try_get::<i64, _>("source_scenario_id")? as u32,
        blog_title: row.try_get("blog_title")?,
        persona_archetype: row.try_get("persona_archetype")?,
        keywords: serde_json::from_str(&keywords)?,
        blog_content: row.try_get("blog_content")?,
        word_count: row.try_get::<i64, _>("word_count")? as u32,
        slug: row.try_get("slug")?,
        meta_description: row.try_get("meta_description")?,
        blog_type: row.try_get("blog_type")?,
        image_urls: serde_json::from_str(&image_urls)?,
        generation_time_ms: row.try_get::<i64, _>("generation_time_ms")? as u64,
        model_used: row.try_get("model_used")?,
        status: ContentStatus::from_str(&status_str)?,
        error_message: row.try_get("error_message")?,
    })
}

fn parse_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_job(row: &SqliteRow) -> Result<Job> {
    let status_str: String = row.try_get("status")?;
    let value_propositions: String = row.try_get("value_propositions")?;
    let blog_type_allocations: String = row.try_get("blog_type_allocations")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        niche: row.try_get("niche")?,
        value_propositions: serde_json::from_str(&value_propositions)?,
        tone: row.try_get("tone")?,
        total_blogs: row.try_get::<i64, _>("total_blogs")? as u32,
        blog_type_allocations: serde_json::from_str(&blog_type_allocations)?,
        target_word_count: row.try_get::<i64, _>("target_word_count")? as u32,
        status: JobStatus::from_str(&status_str)?,
        progress: row.try_get::<i64, _>("progress")? as u8,
        total_content_generated: row.try_get::<i64, _>("total_content_generated")? as u32,
        failed_content_count: row.try_get::<i64, _>("failed_content_count")? as u32,
        scenarios: Vec::new(),
        error_message: row.try_get("error_message")?,
        credits_cost: row.try_get::<i64, _>("credits_cost")? as u32,
        credits_refunded: row.try_get::<i64, _>("credits_refunded")? as u32,
        user_id: row.try_get("user_id")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        started_at: parse_timestamp(row.try_get("started_at")?),
        completed_at: parse_timestamp(row.try_get("completed_at")?),
    })
}

async fn write_scenarios(pool: &SqlitePool, job_id: &str, scenarios: &[Scenario]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM scenarios WHERE job_id = ?")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    for scenario in scenarios {
        sqlx::query(
            "INSERT INTO scenarios (job_id, scenario_id, persona_name, persona_archetype, \
             pain_point_detail, goal_focus, blog_topic_headline, target_keywords, \
             required_word_count, research_insight, image_urls, blog_type) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(scenario.scenario_id as i64)
        .bind(&scenario.persona_name)
        .bind(&scenario.persona_archetype)
        .bind(&scenario.pain_point_detail)
        .bind(&scenario.goal_focus)
        .bind(&scenario.blog_topic_headline)
        .bind(serde_json::to_string(&scenario.target_keywords)?)
        .bind(scenario.required_word_count as i64)
        .bind(&scenario.research_insight)
        .bind(serde_json::to_string(&scenario.image_urls)?)
        .bind(&scenario.blog_type)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create(&self, job: &Job) -> Result<()> {
        if job.id.is_empty() {
            anyhow::bail!("job id must not be empty");
        }
        if job.total_blogs == 0 {
            anyhow::bail!("total_blogs must be greater than zero");
        }

        sqlx::query(
            "INSERT INTO jobs (id, niche, value_propositions, tone, total_blogs, \
             blog_type_allocations, target_word_count, status, progress, \
             total_content_generated, failed_content_count, error_message, credits_cost, \
             credits_refunded, user_id, cancel_requested, created_at, started_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.niche)
        .bind(serde_json::to_string(&job.value_propositions)?)
        .bind(&job.tone)
        .bind(job.total_blogs as i64)
        .bind(serde_json::to_string(&job.blog_type_allocations)?)
        .bind(job.target_word_count as i64)
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(job.total_content_generated as i64)
        .bind(job.failed_content_count as i64)
        .bind(&job.error_message)
        .bind(job.credits_cost as i64)
        .bind(job.credits_refunded as i64)
        .bind(&job.user_id)
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("failed to insert job")?;

        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let mut job = row_to_job(&r)?;
                job.scenarios = self.load_scenarios(job_id).await?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn update_progress(&self, job_id: &str, progress: u8, total_content_generated: u32) -> Result<()> {
        sqlx::query("UPDATE jobs SET progress = ?, total_content_generated = ? WHERE id = ?")
            .bind(progress as i64)
            .bind(total_content_generated as i64)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_researching(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = ?, progress = 5, started_at = COALESCE(started_at, ?) WHERE id = ?",
        )
        .bind(JobStatus::Researching.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_scenarios(&self, job_id: &str, scenarios: &[Scenario]) -> Result<()> {
        write_scenarios(&self.pool, job_id, scenarios).await
    }

    async fn mark_research_complete(&self, job_id: &str, _scenario_count: usize) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = ?, progress = 20 WHERE id = ?")
            .bind(JobStatus::ResearchComplete.to_string())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_generating(&self, job_id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = ?, progress = 25 WHERE id = ?")
            .bind(JobStatus::Generating.to_string())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_complete(
        &self,
        job_id: &str,
        status: JobStatus,
        failed_content_count: u32,
        credits_refunded: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = ?, failed_content_count = ?, \
             total_content_generated = total_blogs - ?, credits_refunded = ?, progress = 100, \
             completed_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(failed_content_count as i64)
        .bind(failed_content_count as i64)
        .bind(credits_refunded as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: &str, error_message: String) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = ?, error_message = ?, completed_at = ? WHERE id = ?",
        )
        .bind(JobStatus::Failed.to_string())
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM content WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scenarios WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn is_cancelled(&self, job_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT cancel_requested FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.get::<i64, _>("cancel_requested") != 0)
            .unwrap_or(false))
    }

    async fn request_cancel(&self, job_id: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET cancel_requested = 1 WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn insert(&self, content: &Content) -> Result<()> {
        sqlx::query(
            "INSERT INTO content (id, job_id, scenario_id, source_scenario_id, blog_title, \
             persona_archetype, keywords, blog_content, word_count, slug, meta_description, \
             blog_type, image_urls, generation_time_ms, model_used, status, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&content.id)
        .bind(&content.job_id)
        .bind(content.scenario_id as i64)
        .bind(content.source_scenario_id as i64)
        .bind(&content.blog_title)
        .bind(&content.persona_archetype)
        .bind(serde_json::to_string(&content.keywords)?)
        .bind(&content.blog_content)
        .bind(content.word_count as i64)
        .bind(&content.slug)
        .bind(&content.meta_description)
        .bind(&content.blog_type)
        .bind(serde_json::to_string(&content.image_urls)?)
        .bind(content.generation_time_ms as i64)
        .bind(&content.model_used)
        .bind(content.status.to_string())
        .bind(&content.error_message)
        .execute(&self.pool)
        .await
        .context("failed to insert content row")?;

        Ok(())
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Vec<Content>> {
        let rows = sqlx::query("SELECT * FROM content WHERE job_id = ? ORDER BY scenario_id ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_content).collect()
    }

    async fn delete_by_job_id(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM content WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScenarioStore for SqliteStore {
    async fn save_scenarios(&self, job_id: &str, scenarios: &[Scenario]) -> Result<()> {
        write_scenarios(&self.pool, job_id, scenarios).await
    }

    async fn list_scenarios(&self, job_id: &str) -> Result<Vec<Scenario>> {
        self.load_scenarios(job_id).await
    }

    async fn delete_by_job_id(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scenarios WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
