pub mod memory;
pub mod postgres;

use crate::domain::models::{
    NewNormalizationEntry, NewQuestion, NewResponse, NewSubscale, NewUser, NormalizationEntry,
    Question, Subscale, SubscalePatch, User, UserResponse,
};
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The parent row a write points at does not exist.
    #[error("{0} does not exist")]
    ForeignKey(&'static str),
    #[error("unknown question id(s): {}", join_ids(.0))]
    UnknownQuestions(Vec<i32>),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

fn join_ids(ids: &[i32]) -> String {
    ids.iter().map(i32::to_string).collect::<Vec<_>>().join(", ")
}

/// Transactional relational store behind the survey services.
///
/// Every multi-row write is all-or-nothing. Lookups by id return `Ok(None)`
/// (or `false` for deletes) when the row does not exist; callers turn that
/// into a NotFound.
///
/// Writes that take `check_references` verify, inside the same unit of work,
/// that every question id they name exists, failing with
/// [`StoreError::UnknownQuestions`] before anything is written.
#[async_trait]
pub trait SurveyStore: Send + Sync {
    async fn create_question(&self, question: &NewQuestion) -> StoreResult<Question>;
    async fn list_questions(&self) -> StoreResult<Vec<Question>>;
    async fn get_question(&self, id: i32) -> StoreResult<Option<Question>>;
    /// Overwrites the text and reissues every option.
    async fn replace_question(&self, id: i32, question: &NewQuestion)
        -> StoreResult<Option<Question>>;
    /// Options go with the question through the schema-level cascade.
    async fn delete_question(&self, id: i32) -> StoreResult<bool>;
    async fn create_submission(
        &self,
        user: &NewUser,
        responses: &[NewResponse],
        check_references: bool,
    ) -> StoreResult<User>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>>;
    async fn user_responses(&self, user_id: i32) -> StoreResult<Vec<UserResponse>>;

    async fn list_subscales(&self) -> StoreResult<Vec<Subscale>>;
    async fn get_subscale(&self, id: i32) -> StoreResult<Option<Subscale>>;
    async fn create_subscale(
        &self,
        subscale: &NewSubscale,
        check_references: bool,
    ) -> StoreResult<Subscale>;
    async fn update_subscale(
        &self,
        id: i32,
        patch: &SubscalePatch,
        check_references: bool,
    ) -> StoreResult<Option<Subscale>>;
    async fn delete_subscale(&self, id: i32) -> StoreResult<bool>;

    /// Drops the subscale's table and inserts `rows` in one unit of work.
    /// A missing subscale is [`StoreError::ForeignKey`].
    async fn replace_normalization_table(
        &self,
        subscale_id: i32,
        rows: &[NewNormalizationEntry],
    ) -> StoreResult<usize>;
    async fn normalization_table(&self, subscale_id: i32) -> StoreResult<Vec<NormalizationEntry>>;
}

/// Stable ordering for normalization tables handed to clients.
pub(crate) fn sort_table(entries: &mut [NormalizationEntry]) {
    entries.sort_by(|a, b| {
        (a.age, a.sex.as_str(), a.raw_score, a.id).cmp(&(b.age, b.sex.as_str(), b.raw_score, b.id))
    });
}

/// Sorted, deduplicated ids for a reference check.
pub(crate) fn distinct_ids(ids: impl IntoIterator<Item = i32>) -> Vec<i32> {
    let mut ids: Vec<i32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
