//! Integration tests for timeline paging and gap tracking.

mod common;

use common::{home, ids, owner, remote, test_config, test_store, FakeServer, Request};
use feedline::{
    BaseMediator, GapMediator, LoadDirection, PagingConfig, PagingMediator, PagingState,
    StatusId, SubscriptionConfig, SubscriptionFilter, TimelineEvent, TimelineKey, TimelineStore,
    TimelineType,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(page_size: usize) -> PagingConfig {
    PagingConfig { page_size }
}

// --- Gap Scenarios ---

#[tokio::test]
async fn test_full_refresh_opens_gap_at_oldest_entry() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);
    let mediator = GapMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);

    let result = mediator
        .load(LoadDirection::Refresh, &PagingState::new(&config(20)))
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 20);
    assert!(!result.end_of_pagination);

    let entries = store.entries(&home());
    assert_eq!(entries.len(), 20);
    assert_eq!(entries[0].status_id().as_str(), "50");
    assert_eq!(entries[19].status_id().as_str(), "31");
    assert!(entries[19].is_gap);
    assert!(entries[..19].iter().all(|e| !e.is_gap));
}

#[tokio::test]
async fn test_short_refresh_leaves_no_gap() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=5);
    let mediator = GapMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);

    let result = mediator
        .load(LoadDirection::Refresh, &PagingState::new(&config(20)))
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 5);
    // Only an empty batch ends pagination.
    assert!(!result.end_of_pagination);
    assert_eq!(store.entry_count(&home()), 5);
    assert!(store.gaps(&home()).is_empty());

    let state = PagingState::from_store(&store, &home(), &config(20));
    let next = mediator.load(LoadDirection::Append, &state).await.unwrap();
    assert!(next.entries.is_empty());
    assert!(next.end_of_pagination);
}

#[tokio::test]
async fn test_load_between_bridges_gap() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=23);
    let mediator = GapMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);

    mediator.load_between(20, None, None).await.unwrap();
    let boundary = store.last_entry(&home()).unwrap();
    assert_eq!(boundary.status_id().as_str(), "4");
    assert!(boundary.is_gap);

    let filled = mediator
        .load_between(20, Some(boundary.status_id().clone()), None)
        .await
        .unwrap();

    assert_eq!(ids(&filled), vec!["3", "2", "1"]);
    assert!(!store.find_entry(&home(), &StatusId::from("4")).unwrap().is_gap);
    assert_eq!(store.entry_count(&home()), 23);
    assert!(store.gaps(&home()).is_empty());

    let tail: Vec<_> = ids(&store.entries(&home()))
        .into_iter()
        .skip(19)
        .collect();
    assert_eq!(tail, vec!["4", "3", "2", "1"]);
}

#[tokio::test]
async fn test_append_anchors_at_last_item() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);
    let mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        Arc::clone(&server),
    );

    mediator
        .load(LoadDirection::Refresh, &PagingState::new(&config(20)))
        .await
        .unwrap();

    let state = PagingState::from_store(&store, &home(), &config(20));
    let result = mediator.load(LoadDirection::Append, &state).await.unwrap();

    assert_eq!(
        server.requests()[1],
        Request {
            page_size: 20,
            max_id: Some(StatusId::from("31")),
            since_id: None,
        }
    );
    assert_eq!(result.entries.first().unwrap().status_id().as_str(), "30");
    assert_eq!(result.entries.last().unwrap().status_id().as_str(), "11");

    let gaps = ids(&store.gaps(&home()));
    assert_eq!(gaps, vec!["11"]);
    assert_eq!(store.entry_count(&home()), 40);
}

#[tokio::test]
async fn test_append_without_anchor_does_nothing() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);
    let mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        Arc::clone(&server),
    );
    let before = store.stats();

    let result = mediator
        .load(LoadDirection::Append, &PagingState::new(&config(20)))
        .await
        .unwrap();

    assert!(result.end_of_pagination);
    assert!(result.entries.is_empty());
    assert_eq!(server.calls(), 0);
    assert_eq!(store.stats().journal_size_bytes, before.journal_size_bytes);
    assert_eq!(store.entry_count(&home()), 0);
}

#[tokio::test]
async fn test_prepend_never_fetches() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);
    let mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        Arc::clone(&server),
    );

    mediator
        .load(LoadDirection::Refresh, &PagingState::new(&config(20)))
        .await
        .unwrap();
    let state = PagingState::from_store(&store, &home(), &config(20));

    let result = mediator.load(LoadDirection::Prepend, &state).await.unwrap();

    assert!(result.end_of_pagination);
    assert_eq!(server.calls(), 1);
}

#[tokio::test]
async fn test_refresh_after_new_posts_then_fill_all_gaps() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=30);
    let mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        Arc::clone(&server),
    );
    let state = PagingState::new(&config(20));

    mediator.load(LoadDirection::Refresh, &state).await.unwrap();
    assert_eq!(ids(&store.gaps(&home())), vec!["11"]);

    server.publish((31..=60).map(remote).collect());
    mediator.load(LoadDirection::Refresh, &state).await.unwrap();
    assert_eq!(ids(&store.gaps(&home())), vec!["41", "11"]);
    assert_eq!(store.entry_count(&home()), 40);

    let mut fills = 0;
    while let Some(gap) = store.gaps(&home()).into_iter().next() {
        mediator.fill_gap(&gap, 20).await.unwrap();
        fills += 1;
        assert!(fills < 10, "gaps did not converge");
    }

    let all = store.entries(&home());
    assert_eq!(all.len(), 60);
    assert!(all.iter().all(|e| !e.is_gap));
    let expected: Vec<String> = (1..=60).rev().map(|n| n.to_string()).collect();
    assert_eq!(ids(&all), expected);
}

// --- Base Mediator ---

#[tokio::test]
async fn test_base_mediator_never_flags_gaps() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);
    let mediator = BaseMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);

    mediator
        .load(LoadDirection::Refresh, &PagingState::new(&config(20)))
        .await
        .unwrap();
    let state = PagingState::from_store(&store, &home(), &config(20));
    let result = mediator.load(LoadDirection::Append, &state).await.unwrap();

    assert_eq!(result.entries.len(), 20);
    assert_eq!(store.entry_count(&home()), 40);
    assert!(store.gaps(&home()).is_empty());
}

#[tokio::test]
async fn test_base_mediator_keeps_existing_gap_flags() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);

    let gap_mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        Arc::clone(&server),
    );
    gap_mediator.load_between(20, None, None).await.unwrap();

    let base = BaseMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);
    base.load(LoadDirection::Refresh, &PagingState::new(&config(20)))
        .await
        .unwrap();

    assert_eq!(ids(&store.gaps(&home())), vec!["31"]);
}

#[tokio::test]
async fn test_base_mediator_clears_gap_inside_longer_window() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::with_range(1..=50);

    let gap_mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        Arc::clone(&server),
    );
    gap_mediator.load_between(20, None, None).await.unwrap();
    assert_eq!(ids(&store.gaps(&home())), vec!["31"]);

    let base = BaseMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);
    let result = base
        .load(LoadDirection::Refresh, &PagingState::new(&config(30)))
        .await
        .unwrap();

    assert_eq!(result.entries.last().unwrap().status_id().as_str(), "21");
    assert!(!store.find_entry(&home(), &StatusId::from("31")).unwrap().is_gap);
    assert!(store.find_entry(&home(), &StatusId::from("30")).is_some());
    assert!(store.gaps(&home()).is_empty());
    assert_eq!(store.entry_count(&home()), 30);
}

// --- Store Integration ---

#[tokio::test]
async fn test_timelines_track_gaps_independently() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let mentions = TimelineKey::new(owner(), TimelineType::Mentions);

    let home_mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        FakeServer::with_range(1..=50),
    );
    let mention_mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Mentions,
        FakeServer::with_range(1..=5),
    );

    home_mediator.load_between(20, None, None).await.unwrap();
    mention_mediator.load_between(20, None, None).await.unwrap();

    assert_eq!(store.gaps(&home()).len(), 1);
    assert!(store.gaps(&mentions).is_empty());
    assert_eq!(store.timelines(), vec![home(), mentions.clone()]);

    assert_eq!(store.stats().status_count, 25);
    assert_eq!(store.stats().gap_count, 1);
}

#[tokio::test]
async fn test_reblogged_status_is_stored() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let server = FakeServer::new(vec![remote(10).with_reblog(remote(3)), remote(9)]);
    let mediator = GapMediator::new(Arc::clone(&store), owner(), TimelineType::Home, server);

    mediator.load_between(20, None, None).await.unwrap();

    let rows = store.rows(&home(), None, 10);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status.reblog_of, Some(StatusId::from("3")));
    assert_eq!(store.status(&StatusId::from("3")).unwrap().content, "post 3");
    assert!(store.find_entry(&home(), &StatusId::from("3")).is_none());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    {
        let store = Arc::new(TimelineStore::create(config.clone()).unwrap());
        let mediator = GapMediator::new(
            Arc::clone(&store),
            owner(),
            TimelineType::Home,
            FakeServer::with_range(1..=50),
        );
        mediator.load_between(20, None, None).await.unwrap();
        mediator
            .load_between(10, Some(StatusId::from("31")), None)
            .await
            .unwrap();
    }

    let store = TimelineStore::open(config).unwrap();
    assert_eq!(store.entry_count(&home()), 30);
    assert_eq!(ids(&store.gaps(&home())), vec!["21"]);
    assert!(!store.find_entry(&home(), &StatusId::from("31")).unwrap().is_gap);
}

#[tokio::test]
async fn test_subscriber_notified_of_merge() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let handle = store.subscribe(SubscriptionConfig {
        filter: SubscriptionFilter::timeline(home()),
        ..Default::default()
    });
    let mediator = GapMediator::new(
        Arc::clone(&store),
        owner(),
        TimelineType::Home,
        FakeServer::with_range(1..=50),
    );

    mediator.load_between(20, None, None).await.unwrap();
    mediator
        .load_between(20, Some(StatusId::from("31")), None)
        .await
        .unwrap();

    match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
        TimelineEvent::Merged {
            upserted,
            gaps_opened,
            gaps_cleared,
            ..
        } => {
            assert_eq!(upserted, 20);
            assert_eq!(gaps_opened, 1);
            assert_eq!(gaps_cleared, 0);
        }
        other => panic!("Expected Merged event, got {:?}", other),
    }

    match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
        TimelineEvent::Merged {
            upserted,
            gaps_opened,
            gaps_cleared,
            ..
        } => {
            // The bridged boundary plus the 20 new entries.
            assert_eq!(upserted, 21);
            assert_eq!(gaps_opened, 1);
            assert_eq!(gaps_cleared, 1);
        }
        other => panic!("Expected Merged event, got {:?}", other),
    }
}
