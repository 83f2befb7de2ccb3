//! In-process store with the same semantics as the Postgres schema, including
//! the `ON DELETE CASCADE` rules. Used by the test suites.

use super::{distinct_ids, sort_table, StoreError, StoreResult, SurveyStore};
use crate::domain::models::{
    NewNormalizationEntry, NewQuestion, NewResponse, NewSubscale, NewUser, NormalizationEntry,
    Question, QuestionOption, QuestionSummary, Subscale, SubscalePatch, User, UserResponse,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ResponseRecord {
    id: i32,
    user_id: i32,
    question_id: i32,
    answer: String,
    raw_score: i32,
}

/// One sequence per table, like SERIAL columns.
#[derive(Debug, Default)]
struct Sequences {
    question: i32,
    option: i32,
    user: i32,
    response: i32,
    subscale: i32,
    normalization: i32,
}

fn next(seq: &mut i32) -> i32 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default)]
struct Tables {
    seq: Sequences,
    questions: BTreeMap<i32, String>,
    options: BTreeMap<i32, QuestionOption>,
    users: BTreeMap<i32, User>,
    responses: BTreeMap<i32, ResponseRecord>,
    subscales: BTreeMap<i32, Subscale>,
    normalization: BTreeMap<i32, NormalizationEntry>,
}

impl Tables {
    fn question(&self, id: i32) -> Option<Question> {
        let text = self.questions.get(&id)?;
        let options = self
            .options
            .values()
            .filter(|o| o.question_id == id)
            .cloned()
            .collect();
        Some(Question { id, text: text.clone(), options })
    }

    fn check_questions(&self, ids: impl IntoIterator<Item = i32>) -> StoreResult<()> {
        let missing: Vec<i32> = distinct_ids(ids)
            .into_iter()
            .filter(|id| !self.questions.contains_key(id))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::UnknownQuestions(missing))
        }
    }

    fn insert_options(&mut self, question_id: i32, question: &NewQuestion) {
        for opt in &question.options {
            let id = next(&mut self.seq.option);
            self.options.insert(
                id,
                QuestionOption {
                    id,
                    question_id,
                    text: opt.text.clone(),
                    raw_score: opt.raw_score,
                },
            );
        }
    }
}

/// Every operation takes the single table lock once, so multi-row writes are
/// atomic with respect to concurrent requests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SurveyStore for MemoryStore {
    async fn create_question(&self, question: &NewQuestion) -> StoreResult<Question> {
        let mut t = self.tables.write().await;
        let id = next(&mut t.seq.question);
        t.questions.insert(id, question.text.clone());
        t.insert_options(id, question);
        t.question(id)
            .ok_or_else(|| StoreError::Corrupt(format!("question {id} vanished")))
    }

    async fn list_questions(&self) -> StoreResult<Vec<Question>> {
        let t = self.tables.read().await;
        Ok(t.questions.keys().filter_map(|id| t.question(*id)).collect())
    }

    async fn get_question(&self, id: i32) -> StoreResult<Option<Question>> {
        Ok(self.tables.read().await.question(id))
    }

    async fn replace_question(
        &self,
        id: i32,
        question: &NewQuestion,
    ) -> StoreResult<Option<Question>> {
        let mut t = self.tables.write().await;
        match t.questions.get_mut(&id) {
            Some(text) => *text = question.text.clone(),
            None => return Ok(None),
        }
        t.options.retain(|_, o| o.question_id != id);
        t.insert_options(id, question);
        Ok(t.question(id))
    }

    async fn delete_question(&self, id: i32) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.questions.remove(&id).is_none() {
            return Ok(false);
        }
        t.options.retain(|_, o| o.question_id != id);
        Ok(true)
    }

    async fn create_submission(
        &self,
        user: &NewUser,
        responses: &[NewResponse],
        check_references: bool,
    ) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if check_references {
            t.check_questions(responses.iter().map(|r| r.question_id))?;
        }
        let user_id = next(&mut t.seq.user);
        let created = User {
            id: user_id,
            name: user.name.clone(),
            age: user.age,
            gender: user.gender.clone(),
            created_at: Utc::now(),
        };
        t.users.insert(user_id, created.clone());
        for resp in responses {
            let id = next(&mut t.seq.response);
            t.responses.insert(
                id,
                ResponseRecord {
                    id,
                    user_id,
                    question_id: resp.question_id,
                    answer: resp.answer.clone(),
                    raw_score: resp.raw_score,
                },
            );
        }
        Ok(created)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_responses(&self, user_id: i32) -> StoreResult<Vec<UserResponse>> {
        let t = self.tables.read().await;
        Ok(t.responses
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| UserResponse {
                id: r.id,
                user_id: r.user_id,
                question_id: r.question_id,
                answer: r.answer.clone(),
                raw_score: r.raw_score,
                question: t
                    .questions
                    .get(&r.question_id)
                    .map(|text| QuestionSummary { id: r.question_id, text: text.clone() }),
            })
            .collect())
    }

    async fn list_subscales(&self) -> StoreResult<Vec<Subscale>> {
        Ok(self.tables.read().await.subscales.values().cloned().collect())
    }

    async fn get_subscale(&self, id: i32) -> StoreResult<Option<Subscale>> {
        Ok(self.tables.read().await.subscales.get(&id).cloned())
    }

    async fn create_subscale(
        &self,
        subscale: &NewSubscale,
        check_references: bool,
    ) -> StoreResult<Subscale> {
        let mut t = self.tables.write().await;
        if check_references {
            t.check_questions(subscale.question_ids.iter().copied())?;
        }
        let id = next(&mut t.seq.subscale);
        let created = Subscale {
            id,
            name: subscale.name.clone(),
            method: subscale.method,
            question_ids: subscale.question_ids.clone(),
        };
        t.subscales.insert(id, created.clone());
        Ok(created)
    }

    async fn update_subscale(
        &self,
        id: i32,
        patch: &SubscalePatch,
        check_references: bool,
    ) -> StoreResult<Option<Subscale>> {
        let mut t = self.tables.write().await;
        if check_references {
            if let Some(ids) = &patch.question_ids {
                t.check_questions(ids.iter().copied())?;
            }
        }
        Ok(t.subscales.get_mut(&id).map(|subscale| {
            patch.apply_to(subscale);
            subscale.clone()
        }))
    }

    async fn delete_subscale(&self, id: i32) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.subscales.remove(&id).is_none() {
            return Ok(false);
        }
        t.normalization.retain(|_, e| e.subscale_id != id);
        Ok(true)
    }

    async fn replace_normalization_table(
        &self,
        subscale_id: i32,
        rows: &[NewNormalizationEntry],
    ) -> StoreResult<usize> {
        let mut t = self.tables.write().await;
        if !t.subscales.contains_key(&subscale_id) {
            return Err(StoreError::ForeignKey("Subscale"));
        }
        t.normalization.retain(|_, e| e.subscale_id != subscale_id);
        for row in rows {
            let id = next(&mut t.seq.normalization);
            t.normalization.insert(
                id,
                NormalizationEntry {
                    id,
                    subscale_id,
                    age: row.age,
                    sex: row.sex.clone(),
                    raw_score: row.raw_score,
                    normalized_score: row.normalized_score,
                },
            );
        }
        Ok(rows.len())
    }

    async fn normalization_table(&self, subscale_id: i32) -> StoreResult<Vec<NormalizationEntry>> {
        let t = self.tables.read().await;
        let mut entries: Vec<NormalizationEntry> = t
            .normalization
            .values()
            .filter(|e| e.subscale_id == subscale_id)
            .cloned()
            .collect();
        sort_table(&mut entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewOption, ScoringMethod};

    fn new_question(text: &str, scores: &[i32]) -> NewQuestion {
        NewQuestion {
            text: text.to_string(),
            options: scores
                .iter()
                .map(|s| NewOption { text: format!("option {s}"), raw_score: *s })
                .collect(),
        }
    }

    fn norm_row(age: i32, raw: i32) -> NewNormalizationEntry {
        NewNormalizationEntry { age, sex: "F".into(), raw_score: raw, normalized_score: raw * 10 }
    }

    async fn option_rows(store: &MemoryStore, question_id: i32) -> usize {
        let t = store.tables.read().await;
        t.options.values().filter(|o| o.question_id == question_id).count()
    }

    #[tokio::test]
    async fn delete_question_cascades_to_options() {
        let store = MemoryStore::new();
        let q = store.create_question(&new_question("Mood?", &[0, 1, 2])).await.unwrap();
        assert_eq!(option_rows(&store, q.id).await, 3);

        assert!(store.delete_question(q.id).await.unwrap());
        assert_eq!(option_rows(&store, q.id).await, 0);
        assert!(!store.delete_question(q.id).await.unwrap());
    }

    #[tokio::test]
    async fn replace_question_reissues_option_ids() {
        let store = MemoryStore::new();
        let q = store.create_question(&new_question("Sleep?", &[0, 1])).await.unwrap();
        let old_ids: Vec<i32> = q.options.iter().map(|o| o.id).collect();

        let updated = store
            .replace_question(q.id, &new_question("Sleep well?", &[5, 6, 7]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.text, "Sleep well?");
        assert_eq!(updated.options.len(), 3);
        assert!(updated.options.iter().all(|o| !old_ids.contains(&o.id)));
        assert_eq!(option_rows(&store, q.id).await, 3);

        let t = store.tables.read().await;
        assert!(old_ids.iter().all(|id| !t.options.contains_key(id)));
    }

    #[tokio::test]
    async fn missing_rows_report_absence() {
        let store = MemoryStore::new();
        assert!(store.get_question(7).await.unwrap().is_none());
        assert!(store
            .replace_question(7, &new_question("x", &[1]))
            .await
            .unwrap()
            .is_none());
        assert!(store.get_user(7).await.unwrap().is_none());
        assert!(store.get_subscale(7).await.unwrap().is_none());
        assert!(store.update_subscale(7, &SubscalePatch::default(), true).await.unwrap().is_none());
        assert!(!store.delete_subscale(7).await.unwrap());
    }

    #[tokio::test]
    async fn submission_writes_user_and_responses() {
        let store = MemoryStore::new();
        let q = store.create_question(&new_question("Mood?", &[0, 3])).await.unwrap();
        let user = NewUser { name: "Ana".into(), age: 30, gender: "F".into() };
        let responses = vec![
            NewResponse { question_id: q.id, answer: "option 3".into(), raw_score: 3 },
            NewResponse { question_id: 99, answer: "dangling".into(), raw_score: 1 },
        ];
        let created = store.create_submission(&user, &responses, false).await.unwrap();

        let stored = store.user_responses(created.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].question.as_ref().map(|q| q.text.as_str()), Some("Mood?"));
        assert!(stored[1].question.is_none());
    }

    #[tokio::test]
    async fn normalization_table_is_replaced_wholesale() {
        let store = MemoryStore::new();
        let sub = store
            .create_subscale(
                &NewSubscale {
                    name: "Mood".into(),
                    method: ScoringMethod::Sum,
                    question_ids: vec![],
                },
                false,
            )
            .await
            .unwrap();

        store
            .replace_normalization_table(sub.id, &[norm_row(30, 1), norm_row(30, 2)])
            .await
            .unwrap();
        store
            .replace_normalization_table(sub.id, &[norm_row(40, 9), norm_row(20, 3), norm_row(30, 5)])
            .await
            .unwrap();

        let table = store.normalization_table(sub.id).await.unwrap();
        let keys: Vec<(i32, i32)> = table.iter().map(|e| (e.age, e.raw_score)).collect();
        assert_eq!(keys, vec![(20, 3), (30, 5), (40, 9)]);
    }

    #[tokio::test]
    async fn normalization_rows_follow_their_subscale() {
        let store = MemoryStore::new();
        let sub = store
            .create_subscale(
                &NewSubscale {
                    name: "Mood".into(),
                    method: ScoringMethod::Average,
                    question_ids: vec![],
                },
                false,
            )
            .await
            .unwrap();
        store.replace_normalization_table(sub.id, &[norm_row(30, 1)]).await.unwrap();

        assert!(store.delete_subscale(sub.id).await.unwrap());
        assert!(store.normalization_table(sub.id).await.unwrap().is_empty());
        assert!(matches!(
            store.replace_normalization_table(sub.id, &[norm_row(30, 1)]).await,
            Err(StoreError::ForeignKey("Subscale"))
        ));
    }

    #[tokio::test]
    async fn checked_writes_refuse_unknown_questions_without_writing() {
        let store = MemoryStore::new();
        let q = store.create_question(&new_question("Mood?", &[0, 3])).await.unwrap();
        let user = NewUser { name: "Ana".into(), age: 30, gender: "F".into() };
        let responses = vec![
            NewResponse { question_id: q.id, answer: "option 3".into(), raw_score: 3 },
            NewResponse { question_id: 99, answer: "dangling".into(), raw_score: 1 },
            NewResponse { question_id: 99, answer: "again".into(), raw_score: 1 },
        ];
        match store.create_submission(&user, &responses, true).await {
            Err(StoreError::UnknownQuestions(ids)) => assert_eq!(ids, vec![99]),
            other => panic!("expected UnknownQuestions, got {other:?}"),
        }
        assert!(store.list_users().await.unwrap().is_empty());
        assert!(store.tables.read().await.responses.is_empty());

        let new_subscale = NewSubscale {
            name: "Mood".into(),
            method: ScoringMethod::Sum,
            question_ids: vec![q.id, 42],
        };
        assert!(matches!(
            store.create_subscale(&new_subscale, true).await,
            Err(StoreError::UnknownQuestions(_))
        ));
        assert!(store.list_subscales().await.unwrap().is_empty());

        let sub = store
            .create_subscale(&NewSubscale { question_ids: vec![q.id], ..new_subscale }, true)
            .await
            .unwrap();
        let patch = SubscalePatch { question_ids: Some(vec![7]), ..Default::default() };
        assert!(matches!(
            store.update_subscale(sub.id, &patch, true).await,
            Err(StoreError::UnknownQuestions(_))
        ));
        assert_eq!(store.get_subscale(sub.id).await.unwrap().unwrap().question_ids, vec![q.id]);
    }
}
