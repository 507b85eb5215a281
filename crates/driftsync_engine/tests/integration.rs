//! Integration tests for the sync engine against the reference server.

use chrono::{Duration as ChronoDuration, Utc};
use driftsync_engine::{
    HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, MemoryEntityService,
    PassErrorKind, SyncConfig, SyncEngine, SyncError, SyncResult, SyncTransport,
};
use driftsync_protocol::{
    BatchRequest, BatchResponse, EntityRecord, Fields, Operation, SyncStatus, GLOBAL_ENTITY,
};
use driftsync_server::{ServerConfig, SyncServer};
use driftsync_store::{FileStore, MemoryStore, SyncStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// A transport that calls the server directly.
struct InMemoryTransport {
    server: Arc<SyncServer>,
}

impl SyncTransport for InMemoryTransport {
    fn health(&self, _timeout: Duration) -> SyncResult<()> {
        Ok(())
    }

    fn submit_batch(
        &self,
        request: &BatchRequest,
        _timeout: Duration,
    ) -> SyncResult<BatchResponse> {
        self.server
            .handle_batch(request, Some(&request.checksum))
            .map_err(|e| SyncError::RemoteRejection(e.to_string()))
    }
}

/// Routes loopback HTTP requests into the server.
struct Routed {
    server: Arc<SyncServer>,
    tamper: bool,
}

impl LoopbackServer for Routed {
    fn handle_get(&self, path: &str) -> HttpResponse {
        let reply = self.server.route("GET", path, &[], &[]);
        HttpResponse::new(reply.status, reply.body)
    }

    fn handle_post(&self, path: &str, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
        let mut body = body.to_vec();
        if self.tamper {
            if let Ok(mut request) = BatchRequest::decode(&body) {
                for m in &mut request.mutations {
                    m.payload.insert("injected".into(), json!(true));
                }
                if let Ok(encoded) = request.encode() {
                    body = encoded;
                }
            }
        }
        let reply = self.server.route("POST", path, headers, &body);
        HttpResponse::new(reply.status, reply.body)
    }
}

type LoopbackTransport = HttpTransport<LoopbackClient<Routed>>;

fn fields(title: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("title".into(), json!(title));
    fields
}

fn config() -> SyncConfig {
    SyncConfig::new("http://sync.test").with_client_id("client-a")
}

fn loopback(server: &Arc<SyncServer>, tamper: bool) -> Arc<LoopbackTransport> {
    let client = LoopbackClient::new(Routed {
        server: Arc::clone(server),
        tamper,
    });
    Arc::new(HttpTransport::from_config(&config(), client))
}

#[test]
fn full_pass_over_loopback_http() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let store = Arc::new(MemoryStore::new());
    let entities = Arc::new(MemoryEntityService::new());
    let engine = SyncEngine::new(
        config(),
        Arc::clone(&store),
        loopback(&server, false),
        Arc::clone(&entities),
    )
    .unwrap();

    let now = Utc::now();
    entities.apply_local("task-1", Operation::Create, &fields("one"), now);
    entities.apply_local("task-2", Operation::Create, &fields("two"), now);
    engine
        .enqueue("task-1", Operation::Create, fields("one"))
        .unwrap();
    engine
        .enqueue("task-2", Operation::Create, fields("two"))
        .unwrap();

    assert!(engine.check_connectivity());
    let result = engine.run_sync_pass().unwrap();
    assert!(result.success);
    assert_eq!(result.synced_items, 2);
    assert_eq!(result.batches_sent, 1);

    assert_eq!(server.authority().len(), 2);
    let record = entities.get("task-1").unwrap();
    assert_eq!(record.sync_status, SyncStatus::Synced);
    assert!(record.remote_id.is_some());

    let status = engine.sync_status().unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.in_progress, 0);
    assert!(status.last_sync_at.is_some());
}

#[test]
fn entity_mutations_apply_in_creation_order() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let entities = Arc::new(MemoryEntityService::new());
    let engine = SyncEngine::new(
        config().with_batch_size(2),
        Arc::new(MemoryStore::new()),
        Arc::new(InMemoryTransport {
            server: Arc::clone(&server),
        }),
        Arc::clone(&entities),
    )
    .unwrap();

    engine.enqueue("a", Operation::Create, fields("first")).unwrap();
    engine.enqueue("b", Operation::Create, fields("other")).unwrap();
    let mut update = Fields::new();
    update.insert("done".into(), json!(true));
    engine.enqueue("a", Operation::Update, update).unwrap();

    let result = engine.run_sync_pass().unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.synced_items, 3);
    assert_eq!(result.batches_sent, 2);

    // The update only succeeds if the create reached the server first.
    let a = server.authority().get("a").unwrap();
    assert_eq!(a.fields.get("title"), Some(&json!("first")));
    assert_eq!(a.fields.get("done"), Some(&json!(true)));
    assert_eq!(a.remote_id.as_deref(), Some("srv-1"));
    assert_eq!(
        server.authority().get("b").unwrap().remote_id.as_deref(),
        Some("srv-2")
    );
}

#[test]
fn stale_write_resolves_to_remote_state() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let later = Utc::now() + ChronoDuration::hours(1);
    let remote_id = server.authority().seed("doc", fields("theirs"), later);

    let entities = Arc::new(MemoryEntityService::from_records([EntityRecord::new(
        "doc",
        fields("mine"),
        Utc::now(),
    )]));
    let engine = SyncEngine::new(
        config(),
        Arc::new(MemoryStore::new()),
        loopback(&server, false),
        Arc::clone(&entities),
    )
    .unwrap();
    engine
        .enqueue("doc", Operation::Update, fields("mine"))
        .unwrap();

    let result = engine.run_sync_pass().unwrap();
    assert!(result.success);
    assert_eq!(result.conflicts_resolved, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, PassErrorKind::Conflict);
    assert!(result.errors[0].is_informational());

    let record = entities.get("doc").unwrap();
    assert_eq!(record.fields, fields("theirs"));
    assert!(record.updated_at < later);
    assert!(record.last_synced_at.is_some());
    assert_eq!(record.remote_id.as_deref(), Some(remote_id.as_str()));
    assert_eq!(record.sync_status, SyncStatus::Synced);
    assert_eq!(engine.sync_status().unwrap().pending, 0);
}

#[test]
fn newer_local_version_is_requeued() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let now = Utc::now();
    server
        .authority()
        .seed("doc", fields("theirs"), now + ChronoDuration::hours(1));

    let entities = Arc::new(MemoryEntityService::from_records([EntityRecord::new(
        "doc",
        fields("mine"),
        now + ChronoDuration::hours(2),
    )]));
    let engine = SyncEngine::new(
        config(),
        Arc::new(MemoryStore::new()),
        loopback(&server, false),
        Arc::clone(&entities),
    )
    .unwrap();
    let original = engine
        .enqueue("doc", Operation::Update, fields("mine"))
        .unwrap();

    let result = engine.run_sync_pass().unwrap();
    assert_eq!(result.conflicts_resolved, 1);

    let queued = engine.queue().entries().unwrap();
    assert_eq!(queued.len(), 1);
    assert_ne!(queued[0].id, original.id);
    assert_eq!(queued[0].operation, Operation::Update);
    assert_eq!(queued[0].payload, fields("mine"));
    assert_eq!(entities.get("doc").unwrap().fields, fields("mine"));
}

#[test]
fn local_delete_outlives_conflicting_update() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let entities = Arc::new(MemoryEntityService::from_records([EntityRecord::new(
        "doc",
        fields("mine"),
        Utc::now(),
    )]));
    let engine = SyncEngine::new(
        config(),
        Arc::new(MemoryStore::new()),
        loopback(&server, false),
        Arc::clone(&entities),
    )
    .unwrap();

    engine
        .enqueue("doc", Operation::Update, fields("mine"))
        .unwrap();
    std::thread::sleep(Duration::from_millis(2));
    server.authority().seed("doc", fields("theirs"), Utc::now());
    std::thread::sleep(Duration::from_millis(2));
    entities.apply_local("doc", Operation::Delete, &Fields::new(), Utc::now());
    engine
        .enqueue("doc", Operation::Delete, Fields::new())
        .unwrap();

    let result = engine.run_sync_pass().unwrap();
    assert!(result.success);
    assert_eq!(result.conflicts_resolved, 1);
    assert_eq!(result.synced_items, 2);

    assert!(entities.get("doc").is_none());
    assert!(server.authority().get("doc").is_none());
    assert_eq!(engine.sync_status().unwrap().pending, 0);
}

#[test]
fn rejected_mutation_is_dead_lettered_and_replayed() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let store = Arc::new(MemoryStore::new());
    let engine = SyncEngine::new(
        config().with_max_retries(3),
        Arc::clone(&store),
        Arc::new(InMemoryTransport {
            server: Arc::clone(&server),
        }),
        Arc::new(MemoryEntityService::new()),
    )
    .unwrap();
    engine
        .enqueue("ghost", Operation::Update, fields("x"))
        .unwrap();

    for pass in 1..=3 {
        let result = engine.run_sync_pass().unwrap();
        assert!(!result.success);
        assert_eq!(result.failed_items, 1);
        assert_eq!(result.dead_lettered, usize::from(pass == 3));
    }

    // Dead-lettered mutations are not retried.
    let result = engine.run_sync_pass().unwrap();
    assert_eq!(result.batches_sent, 0);

    let dead = engine.dead_letter_entries().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].retry_count, 3);
    assert!(dead[0].error_message.contains("does not exist"));

    server
        .authority()
        .seed("ghost", Fields::new(), Utc::now() - ChronoDuration::hours(1));
    let replayed = engine
        .dead_letter_store()
        .replay(dead[0].id)
        .unwrap()
        .unwrap();
    assert_eq!(replayed.retry_count, 0);

    let result = engine.run_sync_pass().unwrap();
    assert!(result.success);
    assert_eq!(result.synced_items, 1);
    assert_eq!(store.dead_letter_count().unwrap(), 0);
}

#[test]
fn failed_entity_is_held_back_for_the_pass() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let engine = SyncEngine::new(
        config().with_batch_size(1),
        Arc::new(MemoryStore::new()),
        Arc::new(InMemoryTransport {
            server: Arc::clone(&server),
        }),
        Arc::new(MemoryEntityService::new()),
    )
    .unwrap();
    engine
        .enqueue("ghost", Operation::Update, fields("x"))
        .unwrap();
    engine
        .enqueue("ghost", Operation::Update, fields("y"))
        .unwrap();
    engine
        .enqueue("real", Operation::Create, fields("z"))
        .unwrap();

    let result = engine.run_sync_pass().unwrap();
    assert_eq!(result.failed_items, 1);
    assert_eq!(result.held_back_items, 1);
    assert_eq!(result.synced_items, 1);
    assert_eq!(result.batches_sent, 2);

    let queued = engine.queue().entries().unwrap();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].retry_count, 1);
    assert_eq!(queued[1].retry_count, 0);
}

#[test]
fn tampered_batch_is_rejected() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let engine = SyncEngine::new(
        config(),
        Arc::new(MemoryStore::new()),
        loopback(&server, true),
        Arc::new(MemoryEntityService::new()),
    )
    .unwrap();
    engine
        .enqueue("task-1", Operation::Create, fields("one"))
        .unwrap();

    let result = engine.run_sync_pass().unwrap();
    assert!(!result.success);
    assert_eq!(result.failed_items, 1);
    assert_eq!(result.errors[0].kind, PassErrorKind::RemoteRejection);
    assert!(result.errors[0].message.contains("422"));
    assert!(server.authority().is_empty());

    let queued = engine.queue().entries().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].retry_count, 1);
}

#[test]
fn unreachable_remote_leaves_queue_untouched() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let transport = loopback(&server, false);
    let engine = SyncEngine::new(
        config(),
        Arc::new(MemoryStore::new()),
        Arc::clone(&transport),
        Arc::new(MemoryEntityService::new()),
    )
    .unwrap();
    engine
        .enqueue("task-1", Operation::Create, fields("one"))
        .unwrap();

    transport.client().set_reachable(false);
    assert!(!engine.check_connectivity());
    let result = engine.run_sync_pass().unwrap();
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].entity_id, GLOBAL_ENTITY);
    assert_eq!(result.errors[0].kind, PassErrorKind::Connectivity);
    assert!(transport.last_error().is_some());

    let queued = engine.queue().entries().unwrap();
    assert_eq!(queued[0].retry_count, 0);
    assert!(engine.sync_status().unwrap().last_sync_at.is_none());

    transport.client().set_reachable(true);
    let result = engine.run_sync_pass().unwrap();
    assert!(result.success);
    assert_eq!(engine.stats().passes_unreachable, 1);
    assert_eq!(engine.stats().passes, 2);
}

#[test]
fn file_store_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(SyncServer::new(ServerConfig::default()));

    {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let engine = SyncEngine::new(
            config(),
            store,
            loopback(&server, false),
            Arc::new(MemoryEntityService::new()),
        )
        .unwrap();
        engine.enqueue("a", Operation::Create, fields("a")).unwrap();
        engine.enqueue("b", Operation::Create, fields("b")).unwrap();
    }

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    assert_eq!(store.pending_count().unwrap(), 2);
    {
        let engine = SyncEngine::new(
            config(),
            Arc::clone(&store),
            loopback(&server, false),
            Arc::new(MemoryEntityService::new()),
        )
        .unwrap();
        let result = engine.run_sync_pass().unwrap();
        assert!(result.success);
        assert_eq!(result.synced_items, 2);
    }
    drop(store);

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.pending_count().unwrap(), 0);
    assert!(store.last_sync_at().unwrap().is_some());
    assert_eq!(server.authority().len(), 2);
}
