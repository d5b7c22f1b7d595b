// ABOUTME: Tests for the offline sync reconciler
// ABOUTME: Idempotent replay, conflict detection, parent resolution, and status counts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Colloquy
#![allow(missing_docs)]

use colloquy_server::errors::ErrorCode;
use colloquy_server::models::{Conversation, SyncState};
use colloquy_server::protocol::{SyncItemBody, SyncRequestBody, SyncResultStatus, Timestamp};
use colloquy_server::storage::{MemoryStorage, Storage};
use colloquy_server::sync::SyncService;
use colloquy_server::ws::ConnectionHub;
use std::sync::Arc;
use std::time::Duration;

const USER: &str = "user_1";

struct Fixture {
    storage: Arc<MemoryStorage>,
    service: SyncService,
    conversation_id: String,
}

async fn fixture() -> Fixture {
    let storage = Arc::new(MemoryStorage::new());
    let hub = Arc::new(ConnectionHub::new(64));
    let conversation = Conversation::new("conv_1".into(), USER.into(), "offline".into());
    storage.create_conversation(conversation).await.unwrap();
    let service = SyncService::new(storage.clone(), hub, Duration::from_secs(5), 100);
    Fixture {
        storage,
        service,
        conversation_id: "conv_1".into(),
    }
}

fn item(local_id: &str, previous_id: Option<&str>, contents: &str) -> SyncItemBody {
    SyncItemBody {
        local_id: local_id.into(),
        sequence_number: 0,
        previous_id: previous_id.map(Into::into),
        role: "user".into(),
        contents: contents.into(),
        branch: false,
        created_at: Timestamp::from_unix_millis(1_714_521_600_000).unwrap(),
        updated_at: None,
    }
}

#[tokio::test]
async fn offline_chain_gets_server_ids_and_sequence_numbers() {
    let f = fixture().await;
    let response = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("L1", None, "first"), item("L2", Some("L1"), "second")],
            },
        )
        .await
        .unwrap();

    assert_eq!(response.synced_messages.len(), 2);
    let first = &response.synced_messages[0];
    let second = &response.synced_messages[1];

    assert_eq!(first.status, SyncResultStatus::Synced);
    assert_eq!(second.status, SyncResultStatus::Synced);

    let m1 = first.message.as_ref().unwrap();
    let m2 = second.message.as_ref().unwrap();
    assert_eq!(m1.sequence_number, 1);
    assert_eq!(m2.sequence_number, 2);
    // The claimed local parent resolved to the canonical server id
    assert_eq!(m2.previous_id.as_deref(), Some(m1.id.as_str()));
    assert_eq!(m1.sync_state, SyncState::Synced);
}

#[tokio::test]
async fn replaying_an_identical_batch_is_a_no_op_with_identical_mappings() {
    let f = fixture().await;
    let batch = SyncRequestBody {
        messages: vec![item("L1", None, "first"), item("L2", Some("L1"), "second")],
    };

    let first = f
        .service
        .sync_batch(USER, &f.conversation_id, batch.clone())
        .await
        .unwrap();
    let second = f
        .service
        .sync_batch(USER, &f.conversation_id, batch)
        .await
        .unwrap();

    let first_ids: Vec<_> = first
        .synced_messages
        .iter()
        .map(|r| (r.local_id.clone(), r.server_id.clone()))
        .collect();
    let second_ids: Vec<_> = second
        .synced_messages
        .iter()
        .map(|r| (r.local_id.clone(), r.server_id.clone()))
        .collect();
    assert_eq!(first_ids, second_ids);
    assert!(second
        .synced_messages
        .iter()
        .all(|r| r.status == SyncResultStatus::Synced));

    // Server state is unchanged: still exactly two messages
    let messages = f.storage.list_messages(&f.conversation_id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn concurrent_extension_of_the_same_parent_yields_one_synced_one_conflict() {
    let f = fixture().await;

    // Device A establishes the parent
    let base = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("A-root", None, "shared question")],
            },
        )
        .await
        .unwrap();
    let parent_id = base.synced_messages[0].server_id.clone().unwrap();

    // Device A and device B both extend it while offline
    let a = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("A-next", Some(&parent_id), "version from A")],
            },
        )
        .await
        .unwrap();
    let b = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("B-next", Some(&parent_id), "version from B")],
            },
        )
        .await
        .unwrap();

    assert_eq!(a.synced_messages[0].status, SyncResultStatus::Synced);
    assert_eq!(b.synced_messages[0].status, SyncResultStatus::Conflict);

    let detail = b.synced_messages[0].conflict.as_ref().unwrap();
    assert_eq!(detail.resolution, "manual");
    let competing = detail.server_message.as_ref().unwrap();
    assert_eq!(competing.content, "version from A");

    // Neither payload was lost: both versions are siblings of the parent
    let siblings = f
        .storage
        .children_of(&f.conversation_id, Some(&parent_id))
        .await
        .unwrap();
    assert_eq!(siblings.len(), 2);
    assert_eq!(siblings[0].branch_index, 0);
    assert_eq!(siblings[1].branch_index, 1);
    assert_eq!(siblings[1].sync_state, SyncState::Conflict);
}

#[tokio::test]
async fn declared_branch_suppresses_the_conflict() {
    let f = fixture().await;
    let base = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("root", None, "q"), item("first", Some("root"), "take one")],
            },
        )
        .await
        .unwrap();
    let parent_id = base.synced_messages[0].server_id.clone().unwrap();

    let mut regenerated = item("second", Some(&parent_id), "take two");
    regenerated.branch = true;
    let response = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![regenerated],
            },
        )
        .await
        .unwrap();

    assert_eq!(response.synced_messages[0].status, SyncResultStatus::Synced);
    let message = response.synced_messages[0].message.as_ref().unwrap();
    assert_eq!(message.branch_index, 1);
}

#[tokio::test]
async fn validation_failures_surface_as_conflict_results_not_faults() {
    let f = fixture().await;
    let mut bad_role = item("L-role", None, "x");
    bad_role.role = "robot".into();

    let response = f
        .service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("", None, "no id"), bad_role, item("L-orphan", Some("nope"), "y")],
            },
        )
        .await
        .unwrap();

    assert!(response
        .synced_messages
        .iter()
        .all(|r| r.status == SyncResultStatus::Conflict));
    let reasons: Vec<&str> = response
        .synced_messages
        .iter()
        .map(|r| r.conflict.as_ref().unwrap().reason.as_str())
        .collect();
    assert!(reasons[0].contains("local id"));
    assert!(reasons[1].contains("role"));
    assert!(reasons[2].contains("previous message"));
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let f = fixture().await;
    let err = f
        .service
        .sync_batch(
            USER,
            "conv_missing",
            SyncRequestBody {
                messages: vec![item("L1", None, "x")],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    let err = f
        .service
        .sync_batch("someone_else", &f.conversation_id, SyncRequestBody { messages: vec![] })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn sync_status_counts_states_and_tracks_last_synced() {
    let f = fixture().await;
    f.service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("L1", None, "one"), item("L2", Some("L1"), "two")],
            },
        )
        .await
        .unwrap();

    let parent = f
        .service
        .sync_status(USER, &f.conversation_id)
        .await
        .unwrap();
    assert_eq!(parent.synced_count, 2);
    assert_eq!(parent.conflict_count, 0);
    assert_eq!(parent.pending_count, 0);
    assert!(parent.last_synced_at.is_some());

    // A conflicting extension bumps the conflict count
    let base = f
        .service
        .sync_status(USER, &f.conversation_id)
        .await
        .unwrap();
    f.service
        .sync_batch(
            USER,
            &f.conversation_id,
            SyncRequestBody {
                messages: vec![item("B1", Some("L1"), "competing")],
            },
        )
        .await
        .unwrap();
    let after = f
        .service
        .sync_status(USER, &f.conversation_id)
        .await
        .unwrap();
    assert_eq!(after.conflict_count, base.conflict_count + 1);
}
