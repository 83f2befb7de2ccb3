use crate::domain::models::{NormalizationEntry, ScoringMethod, Subscale, User, UserResponse};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscaleScore {
    pub subscale_id: i32,
    pub name: String,
    pub method: ScoringMethod,
    pub answered: usize,
    pub raw_score: Option<i32>,
    pub normalized_score: Option<i32>,
}

/// Aggregates raw scores with the subscale's method. Averages round half away from zero.
pub fn aggregate(method: ScoringMethod, scores: &[i32]) -> Option<i32> {
    if scores.is_empty() {
        return None;
    }
    let total: i64 = scores.iter().map(|s| i64::from(*s)).sum();
    let value = match method {
        ScoringMethod::Sum => total,
        ScoringMethod::Average => (total as f64 / scores.len() as f64).round() as i64,
    };
    i32::try_from(value).ok()
}

fn same_sex(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub fn lookup_normalized(
    table: &[NormalizationEntry],
    age: i32,
    sex: &str,
    raw_score: i32,
) -> Option<i32> {
    table
        .iter()
        .find(|e| e.age == age && e.raw_score == raw_score && same_sex(&e.sex, sex))
        .map(|e| e.normalized_score)
}

/// Scores one subscale for a user. The last response wins when a question was answered twice.
pub fn score_subscale(
    user: &User,
    responses: &[UserResponse],
    subscale: &Subscale,
    table: &[NormalizationEntry],
) -> SubscaleScore {
    let by_question: HashMap<i32, i32> = responses
        .iter()
        .map(|r| (r.question_id, r.raw_score))
        .collect();

    let scores: Vec<i32> = subscale
        .question_ids
        .iter()
        .filter_map(|qid| by_question.get(qid).copied())
        .collect();

    let raw_score = aggregate(subscale.method, &scores);
    let normalized_score =
        raw_score.and_then(|raw| lookup_normalized(table, user.age, &user.gender, raw));

    SubscaleScore {
        subscale_id: subscale.id,
        name: subscale.name.clone(),
        method: subscale.method,
        answered: scores.len(),
        raw_score,
        normalized_score,
    }
}
