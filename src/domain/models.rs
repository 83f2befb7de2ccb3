use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QuestionOption {
    pub id: i32,
    pub question_id: i32,
    pub text: String,
    pub raw_score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i32,
    pub text: String,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub gender: String,
    pub created_at: DateTime<Utc>,
}

/// Question as embedded in a user's response report (no options).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub user_id: i32,
    pub question_id: i32,
    pub answer: String,
    pub raw_score: i32,
    /// `None` when the response points at a question that no longer exists.
    pub question: Option<QuestionSummary>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    Sum,
    Average,
}

impl ScoringMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMethod::Sum => "sum",
            ScoringMethod::Average => "average",
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(ScoringMethod::Sum),
            "average" => Ok(ScoringMethod::Average),
            other => Err(format!("unknown scoring method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscale {
    pub id: i32,
    pub name: String,
    pub method: ScoringMethod,
    pub question_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NormalizationEntry {
    pub id: i32,
    pub subscale_id: i32,
    pub age: i32,
    pub sex: String,
    pub raw_score: i32,
    pub normalized_score: i32,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOption {
    pub text: String,
    pub raw_score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub text: String,
    pub options: Vec<NewOption>,
}

impl NewQuestion {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.text.trim().is_empty() {
            return Err(ApiError::validation("question text must not be empty"));
        }
        if self.options.is_empty() {
            return Err(ApiError::validation("a question needs at least one option"));
        }
        if let Some(pos) = self.options.iter().position(|o| o.text.trim().is_empty()) {
            return Err(ApiError::validation(format!(
                "option {} has empty text",
                pos + 1
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub age: i32,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResponse {
    pub question_id: i32,
    pub answer: String,
    pub raw_score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub user: NewUser,
    #[serde(default)]
    pub responses: Vec<NewResponse>,
}

impl Submission {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.user.name.trim().is_empty() {
            return Err(ApiError::validation("user name must not be empty"));
        }
        if !(0..=150).contains(&self.user.age) {
            return Err(ApiError::validation("user age must be between 0 and 150"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscale {
    pub name: String,
    pub method: ScoringMethod,
    #[serde(default)]
    pub question_ids: Vec<i32>,
}

impl NewSubscale {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_subscale_name(&self.name)
    }
}

/// Partial subscale update: absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscalePatch {
    pub name: Option<String>,
    pub method: Option<ScoringMethod>,
    pub question_ids: Option<Vec<i32>>,
}

impl SubscalePatch {
    pub fn validate(&self) -> Result<(), ApiError> {
        match &self.name {
            Some(name) => validate_subscale_name(name),
            None => Ok(()),
        }
    }

    pub fn apply_to(&self, subscale: &mut Subscale) {
        if let Some(name) = &self.name {
            subscale.name = name.clone();
        }
        if let Some(method) = self.method {
            subscale.method = method;
        }
        if let Some(ids) = &self.question_ids {
            subscale.question_ids = ids.clone();
        }
    }
}

impl From<NewSubscale> for SubscalePatch {
    fn from(full: NewSubscale) -> Self {
        Self {
            name: Some(full.name),
            method: Some(full.method),
            question_ids: Some(full.question_ids),
        }
    }
}

fn validate_subscale_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("subscale name must not be empty"));
    }
    Ok(())
}

/// One parsed row of an uploaded normalization table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNormalizationEntry {
    pub age: i32,
    pub sex: String,
    pub raw_score: i32,
    pub normalized_score: i32,
}
