use super::{distinct_ids, StoreError, StoreResult, SurveyStore};
use crate::config::Config;
use crate::domain::models::{
    NewNormalizationEntry, NewOption, NewQuestion, NewResponse, NewSubscale, NewUser,
    NormalizationEntry, Question, QuestionOption, QuestionSummary, ScoringMethod, Subscale,
    SubscalePatch, User, UserResponse,
};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: i32,
    text: String,
}

#[derive(Debug, FromRow)]
struct SubscaleRow {
    id: i32,
    name: String,
    method: String,
    question_ids: Vec<i32>,
}

impl TryFrom<SubscaleRow> for Subscale {
    type Error = StoreError;

    fn try_from(row: SubscaleRow) -> Result<Self, Self::Error> {
        let method = row
            .method
            .parse::<ScoringMethod>()
            .map_err(|e| StoreError::Corrupt(format!("subscale {}: {}", row.id, e)))?;
        Ok(Subscale {
            id: row.id,
            name: row.name,
            method,
            question_ids: row.question_ids,
        })
    }
}

#[derive(Debug, FromRow)]
struct ResponseRow {
    id: i32,
    user_id: i32,
    question_id: i32,
    answer: String,
    raw_score: i32,
    q_id: Option<i32>,
    q_text: Option<String>,
}

impl From<ResponseRow> for UserResponse {
    fn from(row: ResponseRow) -> Self {
        let question = match (row.q_id, row.q_text) {
            (Some(id), Some(text)) => Some(QuestionSummary { id, text }),
            _ => None,
        };
        UserResponse {
            id: row.id,
            user_id: row.user_id,
            question_id: row.question_id,
            answer: row.answer,
            raw_score: row.raw_score,
            question,
        }
    }
}

/// Postgres-backed store. Multi-row writes run inside one transaction that is
/// rolled back when dropped before `commit`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                e
            })?;
        tracing::info!("Database connection established");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run database migrations: {}", e);
                e
            })?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn insert_options(
    conn: &mut PgConnection,
    question_id: i32,
    options: &[NewOption],
) -> StoreResult<Vec<QuestionOption>> {
    let mut out = Vec::with_capacity(options.len());
    for opt in options {
        let row = sqlx::query_as::<_, QuestionOption>(
            r#"
            INSERT INTO options (question_id, text, raw_score)
            VALUES ($1, $2, $3)
            RETURNING id, question_id, text, raw_score
            "#,
        )
        .bind(question_id)
        .bind(&opt.text)
        .bind(opt.raw_score)
        .fetch_one(&mut *conn)
        .await?;
        out.push(row);
    }
    Ok(out)
}

async fn options_for(conn: &mut PgConnection, question_id: i32) -> StoreResult<Vec<QuestionOption>> {
    let options = sqlx::query_as::<_, QuestionOption>(
        r#"
        SELECT id, question_id, text, raw_score
        FROM options
        WHERE question_id = $1
        ORDER BY id
        "#,
    )
    .bind(question_id)
    .fetch_all(conn)
    .await?;
    Ok(options)
}

/// Share-locks the named questions until the transaction ends, so a
/// concurrent delete waits for the write that references them.
async fn lock_questions(
    conn: &mut PgConnection,
    ids: impl IntoIterator<Item = i32>,
) -> StoreResult<()> {
    let wanted = distinct_ids(ids);
    if wanted.is_empty() {
        return Ok(());
    }
    let found: Vec<i32> =
        sqlx::query_scalar("SELECT id FROM questions WHERE id = ANY($1) FOR SHARE")
            .bind(&wanted)
            .fetch_all(&mut *conn)
            .await?;
    let missing: Vec<i32> = wanted.into_iter().filter(|id| !found.contains(id)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::UnknownQuestions(missing))
    }
}

/// SQLSTATE 23503 (foreign_key_violation) becomes a missing `entity`.
fn missing_parent(entity: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |err| {
        let violated = matches!(
            &err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503")
        );
        if violated {
            StoreError::ForeignKey(entity)
        } else {
            StoreError::Database(err)
        }
    }
}

const SUBSCALE_COLUMNS: &str = "id, name, method, question_ids";

#[async_trait]
impl SurveyStore for PgStore {
    async fn create_question(&self, question: &NewQuestion) -> StoreResult<Question> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, QuestionRow>(
            "INSERT INTO questions (text) VALUES ($1) RETURNING id, text",
        )
        .bind(&question.text)
        .fetch_one(&mut *tx)
        .await?;
        let options = insert_options(&mut tx, row.id, &question.options).await?;

        tx.commit().await?;
        Ok(Question { id: row.id, text: row.text, options })
    }

    async fn list_questions(&self) -> StoreResult<Vec<Question>> {
        let questions =
            sqlx::query_as::<_, QuestionRow>("SELECT id, text FROM questions ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let options = sqlx::query_as::<_, QuestionOption>(
            "SELECT id, question_id, text, raw_score FROM options ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i32, Vec<QuestionOption>> = HashMap::new();
        for opt in options {
            grouped.entry(opt.question_id).or_default().push(opt);
        }

        Ok(questions
            .into_iter()
            .map(|q| Question {
                options: grouped.remove(&q.id).unwrap_or_default(),
                id: q.id,
                text: q.text,
            })
            .collect())
    }

    async fn get_question(&self, id: i32) -> StoreResult<Option<Question>> {
        let mut conn = self.pool.acquire().await?;
        let Some(row) =
            sqlx::query_as::<_, QuestionRow>("SELECT id, text FROM questions WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
        else {
            return Ok(None);
        };
        let options = options_for(&mut conn, row.id).await?;
        Ok(Some(Question { id: row.id, text: row.text, options }))
    }

    async fn replace_question(
        &self,
        id: i32,
        question: &NewQuestion,
    ) -> StoreResult<Option<Question>> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query_as::<_, QuestionRow>(
            "UPDATE questions SET text = $1 WHERE id = $2 RETURNING id, text",
        )
        .bind(&question.text)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM options WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let options = insert_options(&mut tx, id, &question.options).await?;

        tx.commit().await?;
        Ok(Some(Question { id: row.id, text: row.text, options }))
    }

    async fn delete_question(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_submission(
        &self,
        user: &NewUser,
        responses: &[NewResponse],
        check_references: bool,
    ) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        if check_references {
            lock_questions(&mut tx, responses.iter().map(|r| r.question_id)).await?;
        }

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, age, gender)
            VALUES ($1, $2, $3)
            RETURNING id, name, age, gender, created_at
            "#,
        )
        .bind(&user.name)
        .bind(user.age)
        .bind(&user.gender)
        .fetch_one(&mut *tx)
        .await?;

        for resp in responses {
            sqlx::query(
                r#"
                INSERT INTO responses (user_id, question_id, answer, raw_score)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(created.id)
            .bind(resp.question_id)
            .bind(&resp.answer)
            .bind(resp.raw_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, age, gender, created_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, age, gender, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_responses(&self, user_id: i32) -> StoreResult<Vec<UserResponse>> {
        let rows = sqlx::query_as::<_, ResponseRow>(
            r#"
            SELECT
                r.id,
                r.user_id,
                r.question_id,
                r.answer,
                r.raw_score,
                q.id AS q_id,
                q.text AS q_text
            FROM responses r
            LEFT JOIN questions q ON q.id = r.question_id
            WHERE r.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserResponse::from).collect())
    }

    async fn list_subscales(&self) -> StoreResult<Vec<Subscale>> {
        let rows = sqlx::query_as::<_, SubscaleRow>(&format!(
            "SELECT {SUBSCALE_COLUMNS} FROM subscales ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Subscale::try_from).collect()
    }

    async fn get_subscale(&self, id: i32) -> StoreResult<Option<Subscale>> {
        let row = sqlx::query_as::<_, SubscaleRow>(&format!(
            "SELECT {SUBSCALE_COLUMNS} FROM subscales WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscale::try_from).transpose()
    }

    async fn create_subscale(
        &self,
        subscale: &NewSubscale,
        check_references: bool,
    ) -> StoreResult<Subscale> {
        let mut tx = self.pool.begin().await?;
        if check_references {
            lock_questions(&mut tx, subscale.question_ids.iter().copied()).await?;
        }

        let row = sqlx::query_as::<_, SubscaleRow>(&format!(
            "INSERT INTO subscales (name, method, question_ids) VALUES ($1, $2, $3) \
             RETURNING {SUBSCALE_COLUMNS}"
        ))
        .bind(&subscale.name)
        .bind(subscale.method.as_str())
        .bind(&subscale.question_ids)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Subscale::try_from(row)
    }

    async fn update_subscale(
        &self,
        id: i32,
        patch: &SubscalePatch,
        check_references: bool,
    ) -> StoreResult<Option<Subscale>> {
        let mut tx = self.pool.begin().await?;
        if check_references {
            if let Some(ids) = &patch.question_ids {
                lock_questions(&mut tx, ids.iter().copied()).await?;
            }
        }

        let row = sqlx::query_as::<_, SubscaleRow>(&format!(
            r#"
            UPDATE subscales
            SET name = COALESCE($2, name),
                method = COALESCE($3, method),
                question_ids = COALESCE($4, question_ids)
            WHERE id = $1
            RETURNING {SUBSCALE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.method.map(|m| m.as_str()))
        .bind(patch.question_ids.as_ref())
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        row.map(Subscale::try_from).transpose()
    }

    async fn delete_subscale(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subscales WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_normalization_table(
        &self,
        subscale_id: i32,
        rows: &[NewNormalizationEntry],
    ) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM normalization_entries WHERE subscale_id = $1")
            .bind(subscale_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO normalization_entries (subscale_id, age, sex, raw_score, normalized_score)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(subscale_id)
            .bind(row.age)
            .bind(&row.sex)
            .bind(row.raw_score)
            .bind(row.normalized_score)
            .execute(&mut *tx)
            .await
            .map_err(missing_parent("Subscale"))?;
        }

        tx.commit().await?;
        tracing::debug!(
            "Normalization table for subscale {} replaced: {} removed, {} inserted",
            subscale_id,
            removed,
            rows.len()
        );
        Ok(rows.len())
    }

    async fn normalization_table(&self, subscale_id: i32) -> StoreResult<Vec<NormalizationEntry>> {
        let entries = sqlx::query_as::<_, NormalizationEntry>(
            r#"
            SELECT id, subscale_id, age, sex, raw_score, normalized_score
            FROM normalization_entries
            WHERE subscale_id = $1
            ORDER BY age, sex, raw_score, id
            "#,
        )
        .bind(subscale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
