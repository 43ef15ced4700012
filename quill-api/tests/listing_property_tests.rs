//! Property tests for note listing through the router.
//!
//! For any mix of stored notes:
//! - an anonymous listing counts exactly the public, unexpired notes
//! - a signed-in listing never returns another user's non-public note

use proptest::prelude::*;
use quill_core::{Clock, Note, Visibility};
use quill_storage::NoteRepository;
use quill_test_utils::app::{body_json, TestApp};
use quill_test_utils::generators::{arb_new_note, arb_timestamp};
use serde_json::Value;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

/// (owner slot, or None for anonymous) plus the note to store.
fn arb_stored_notes() -> impl Strategy<Value = Vec<(Option<usize>, Note)>> {
    prop::collection::vec(
        (
            proptest::option::of(0usize..3),
            arb_new_note(),
            arb_timestamp(),
        ),
        0..20,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(slot, input, created_at)| {
                let note = match slot {
                    Some(_) => Note::owned(input, Uuid::nil(), created_at),
                    None => Note::anonymous(input, created_at),
                };
                (slot, note)
            })
            .collect()
    })
}

async fn seed(
    app: &TestApp,
    users: &[Uuid],
    notes: Vec<(Option<usize>, Note)>,
) -> Result<Vec<Note>, TestCaseError> {
    let mut stored = Vec::with_capacity(notes.len());
    for (slot, mut note) in notes {
        if let Some(slot) = slot {
            note.owner_id = Some(users[slot]);
        }
        app.repo
            .note_insert(&note)
            .await
            .map_err(|e| TestCaseError::fail(format!("insert failed: {}", e)))?;
        stored.push(note);
    }
    Ok(stored)
}

fn listed(body: &Value) -> Vec<Value> {
    body["data"].as_array().cloned().unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_anonymous_listing_counts_public_unexpired(notes in arb_stored_notes()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let users: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
            let stored = seed(&app, &users, notes).await?;
            let now = app.clock.now();

            let expected = stored
                .iter()
                .filter(|n| n.visibility == Visibility::Public && !n.is_expired_at(now))
                .count();

            let body = body_json(app.get("/notes?limit=100", None).await).await;
            prop_assert_eq!(
                body["meta"]["pagination"]["total"].as_u64(),
                Some(expected as u64)
            );
            let items = listed(&body);
            prop_assert_eq!(items.len(), expected);
            prop_assert!(items.iter().all(|item| item["visibility"] == "public"));
            Ok(())
        })?;
    }

    #[test]
    fn prop_user_listing_hides_foreign_private_notes(notes in arb_stored_notes()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let users: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
            seed(&app, &users, notes).await?;
            let caller = users[0].to_string();
            let token = app.token(users[0]);

            let body = body_json(app.get("/notes?limit=100", Some(&token)).await).await;
            for item in listed(&body) {
                let own = item["ownerId"] == Value::String(caller.clone());
                prop_assert!(
                    own || item["visibility"] == "public",
                    "foreign non-public note listed: {}",
                    item
                );
            }
            Ok(())
        })?;
    }
}
