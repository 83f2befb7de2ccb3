//! Store tests against a real Postgres. They need `DATABASE_URL` pointing at a
//! scratch database and run with `cargo test -- --ignored`.

use survey_admin::config::Config;
use survey_admin::db::{PgStore, StoreError, SurveyStore};
use survey_admin::domain::models::{
    NewNormalizationEntry, NewOption, NewQuestion, NewResponse, NewSubscale, NewUser,
    ScoringMethod, SubscalePatch,
};

async fn store() -> PgStore {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("DATABASE_URL must be set for Postgres tests");
    let store = PgStore::connect(&config).await.expect("connect");
    store.migrate().await.expect("migrate");
    store
}

fn question(text: &str, scores: &[i32]) -> NewQuestion {
    NewQuestion {
        text: text.to_string(),
        options: scores
            .iter()
            .map(|s| NewOption { text: format!("option {s}"), raw_score: *s })
            .collect(),
    }
}

fn norm(age: i32, raw_score: i32) -> NewNormalizationEntry {
    NewNormalizationEntry { age, sex: "F".into(), raw_score, normalized_score: raw_score + 40 }
}

async fn option_count(store: &PgStore, question_id: i32) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM options WHERE question_id = $1")
        .bind(question_id)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn question_lifecycle_with_cascade() {
    let store = store().await;
    let created = store.create_question(&question("Worry?", &[0, 1, 2])).await.unwrap();
    assert_eq!(created.options.len(), 3);
    assert_eq!(option_count(&store, created.id).await, 3);

    let old_ids: Vec<i32> = created.options.iter().map(|o| o.id).collect();
    let updated = store
        .replace_question(created.id, &question("Worry lately?", &[5, 6]))
        .await
        .unwrap()
        .unwrap();
    assert!(updated.options.iter().all(|o| !old_ids.contains(&o.id)));
    assert_eq!(option_count(&store, created.id).await, 2);

    assert!(store.delete_question(created.id).await.unwrap());
    assert_eq!(option_count(&store, created.id).await, 0);
    assert!(store.get_question(created.id).await.unwrap().is_none());
    assert!(!store.delete_question(created.id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn submission_and_report() {
    let store = store().await;
    let q = store.create_question(&question("Energy?", &[0, 3])).await.unwrap();
    let user = store
        .create_submission(
            &NewUser { name: "Ana".into(), age: 30, gender: "F".into() },
            &[NewResponse { question_id: q.id, answer: "option 3".into(), raw_score: 3 }],
            true,
        )
        .await
        .unwrap();

    let responses = store.user_responses(user.id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].question.as_ref().unwrap().text, "Energy?");
    assert_eq!(store.get_user(user.id).await.unwrap().unwrap().name, "Ana");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn subscale_patch_and_normalization_replace() {
    let store = store().await;
    let sub = store
        .create_subscale(
            &NewSubscale {
                name: "Mood".into(),
                method: ScoringMethod::Sum,
                question_ids: vec![3, 1, 2],
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(sub.question_ids, vec![3, 1, 2]);

    let patched = store
        .update_subscale(
            sub.id,
            &SubscalePatch { method: Some(ScoringMethod::Average), ..Default::default() },
            false,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patched.name, "Mood");
    assert_eq!(patched.method, ScoringMethod::Average);
    assert_eq!(patched.question_ids, vec![3, 1, 2]);

    store
        .replace_normalization_table(sub.id, &[norm(30, 1), norm(30, 2), norm(30, 3)])
        .await
        .unwrap();
    store
        .replace_normalization_table(sub.id, &[norm(40, 9)])
        .await
        .unwrap();
    let table = store.normalization_table(sub.id).await.unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].age, 40);

    assert!(store.delete_subscale(sub.id).await.unwrap());
    assert!(store.normalization_table(sub.id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn failed_replace_keeps_the_previous_table() {
    let store = store().await;
    let sub = store
        .create_subscale(
            &NewSubscale { name: "Sleep".into(), method: ScoringMethod::Sum, question_ids: vec![] },
            false,
        )
        .await
        .unwrap();
    store
        .replace_normalization_table(sub.id, &[norm(30, 1), norm(30, 2), norm(30, 3)])
        .await
        .unwrap();

    // The delete and the first insert succeed; the blank sex trips the CHECK.
    let blank = NewNormalizationEntry { sex: " ".into(), ..norm(50, 2) };
    let result = store
        .replace_normalization_table(sub.id, &[norm(50, 1), blank])
        .await;
    assert!(matches!(result, Err(StoreError::Database(_))));

    let table = store.normalization_table(sub.id).await.unwrap();
    assert_eq!(table.len(), 3);
    assert!(table.iter().all(|e| e.age == 30));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn replace_for_missing_subscale_is_a_foreign_key_error() {
    let store = store().await;
    let result = store.replace_normalization_table(i32::MAX, &[norm(30, 1)]).await;
    assert!(matches!(result, Err(StoreError::ForeignKey("Subscale"))));
    assert!(store.normalization_table(i32::MAX).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn checked_submission_with_unknown_question_writes_nothing() {
    let store = store().await;
    let result = store
        .create_submission(
            &NewUser { name: "Unchecked Reference".into(), age: 41, gender: "M".into() },
            &[NewResponse { question_id: i32::MAX, answer: "x".into(), raw_score: 1 }],
            true,
        )
        .await;
    match result {
        Err(StoreError::UnknownQuestions(ids)) => assert_eq!(ids, vec![i32::MAX]),
        other => panic!("expected UnknownQuestions, got {other:?}"),
    }
    let users = store.list_users().await.unwrap();
    assert!(users.iter().all(|u| u.name != "Unchecked Reference"));
}
