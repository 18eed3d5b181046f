mod common;

use common::*;
use model_compiler::*;
use serde_json::{Value, json};
use std::sync::Arc;

fn text(crystal: &Crystal, key: &str) -> Option<String> {
    match crystal.get(key) {
        Some(Crystal::String(value)) => Some(value.clone()),
        _ => None,
    }
}

async fn seeded(fixture: &PostFixture) -> QueryService {
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry));
    let (service, _) = post_service(fixture, &emitter);
    let items: Vec<Value> = [("First", "u1", 3), ("Second", "u1", 4), ("Third", "u2", 10)]
        .into_iter()
        .map(|(title, owner, views)| post_body(title, owner, views))
        .collect();
    let created = service.create_many(&items).await.unwrap();
    assert_eq!(created.len(), 3);
    service
}

#[tokio::test]
async fn test_method_table_covers_every_query_key() {
    let fixture = post_fixture();
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry));
    let (service, _) = post_service(&fixture, &emitter);

    let names = service.method_names();
    assert_eq!(names.len(), 7 + 2 * 10);
    for name in ["getPost", "searchCountPost", "listAny", "insightByOwner", "pickIdByOwner"] {
        assert!(names.contains(&name), "missing {name}");
    }
    assert!(matches!(
        service.call("listByNobody", vec![]).await,
        Err(ModelError::UnknownMethod { .. })
    ));
}

#[tokio::test]
async fn test_by_owner_with_trailing_options() {
    let fixture = post_fixture();
    let service = seeded(&fixture).await;

    let listed = service
        .call(
            "listByOwner",
            vec![json!("u1"), json!({ "limit": 10, "sort": "latest" })],
        )
        .await
        .unwrap();
    let ServiceOutput::Many(items) = listed else {
        panic!("expected a list");
    };
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| text(item, "ownerId").as_deref() == Some("u1")));
    // hidden fields are projected away on reads
    assert!(items.iter().all(|item| item.get("moderationNote").is_none()));

    let limited = service
        .call("listByOwner", vec![json!("u1"), json!({ "limit": 1 })])
        .await
        .unwrap();
    assert!(matches!(limited, ServiceOutput::Many(ref items) if items.len() == 1));

    let by_views = service
        .call("listAny", vec![json!({ "sort": "mostViewed" })])
        .await
        .unwrap();
    let ServiceOutput::Many(items) = by_views else {
        panic!("expected a list");
    };
    let titles: Vec<String> = items.iter().filter_map(|item| text(item, "title")).collect();
    assert_eq!(titles, vec!["Third", "Second", "First"]);
}

#[tokio::test]
async fn test_count_exists_insight_and_query() {
    let fixture = post_fixture();
    let service = seeded(&fixture).await;

    assert_eq!(
        service.call("countByOwner", vec![json!("u1")]).await.unwrap(),
        ServiceOutput::Count(2)
    );
    assert_eq!(
        service.call("existsByOwner", vec![json!("u3")]).await.unwrap(),
        ServiceOutput::Exists(false)
    );
    assert_eq!(
        service.call("queryByOwner", vec![json!("u1")]).await.unwrap(),
        ServiceOutput::Filter(json!({ "ownerId": "u1" }))
    );

    let insight = service
        .call("insightByOwner", vec![json!("u1")])
        .await
        .unwrap();
    assert_eq!(insight.to_value(), json!({ "count": 2, "totalViews": 7 }));

    let empty = service.insight("byOwner", &[json!("nobody")]).await.unwrap();
    assert_eq!(empty.to_value(), json!({ "count": 0, "totalViews": 0 }));
}

#[tokio::test]
async fn test_find_and_pick() {
    let fixture = post_fixture();
    let service = seeded(&fixture).await;

    let found = service.call("findByOwner", vec![json!("u9")]).await.unwrap();
    assert_eq!(found, ServiceOutput::One(None));

    let err = service.call("pickByOwner", vec![json!("u9")]).await.unwrap_err();
    assert!(err.is_not_found());

    let ServiceOutput::Ids(ids) = service
        .call("listIdsByOwner", vec![json!("u2")])
        .await
        .unwrap()
    else {
        panic!("expected ids");
    };
    assert_eq!(ids.len(), 1);
    assert_eq!(
        service.call("pickIdByOwner", vec![json!("u2")]).await.unwrap(),
        ServiceOutput::Id(Some(ids[0].clone()))
    );

    let ServiceOutput::One(Some(third)) = service
        .call("getPost", vec![json!(ids[0])])
        .await
        .unwrap()
    else {
        panic!("expected a document");
    };
    assert_eq!(text(&third, "title").as_deref(), Some("Third"));
}

#[tokio::test]
async fn test_argument_errors() {
    let fixture = post_fixture();
    let service = seeded(&fixture).await;

    assert!(matches!(
        service.call("listByOwner", vec![]).await,
        Err(ModelError::InvalidArguments { expected: 1, got: 0, .. })
    ));
    assert!(matches!(
        service
            .call("listByOwner", vec![json!("u1"), json!({ "sort": "nope" })])
            .await,
        Err(ModelError::UnknownSort { .. })
    ));
    assert!(matches!(
        service.call("updatePost", vec![json!("x")]).await,
        Err(ModelError::InvalidArguments { expected: 2, got: 1, .. })
    ));
    assert!(matches!(
        service.call("getPost", vec![json!("not-an-id")]).await,
        Err(ModelError::Coercion { .. })
    ));

    // options passed explicitly are never sniffed from arguments
    let items = service
        .call_with(
            "listByOwner",
            vec![json!("u1")],
            QueryOptions::default().limit(1).sort("oldest"),
        )
        .await
        .unwrap();
    assert!(matches!(items, ServiceOutput::Many(ref items) if items.len() == 1));
}

#[tokio::test]
async fn test_create_update_remove_lifecycle() {
    let fixture = post_fixture();
    let recorder = Arc::new(EventRecorder::default());
    let events = Arc::clone(&recorder.events);
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry)).with_middleware(recorder);
    let (service, store) = post_service(&fixture, &emitter);

    let created = service.create(&post_body("Draft", "u1", 1)).await.unwrap();
    let id = text(&created, "id").unwrap();
    assert_eq!(id.len(), 24);
    assert_eq!(text(&created, "status").as_deref(), Some("draft"));
    assert_eq!(created.get("removedAt"), Some(&Crystal::Null));
    let created_at = created.get("createdAt").and_then(Crystal::as_date).copied();
    assert!(created_at.is_some());
    assert_eq!(store.len("post").await, 1);

    let updated = service
        .call(
            "updatePost",
            vec![
                json!(id),
                json!({
                    "title": "Published",
                    "status": "published",
                    "ownerId": "u2",
                    "createdAt": "2000-01-01",
                    "unknown": 1
                }),
            ],
        )
        .await
        .unwrap();
    let ServiceOutput::One(Some(updated)) = updated else {
        panic!("expected a document");
    };
    assert_eq!(text(&updated, "title").as_deref(), Some("Published"));
    assert_eq!(text(&updated, "status").as_deref(), Some("published"));
    assert_eq!(text(&updated, "ownerId").as_deref(), Some("u1"));
    assert_eq!(
        updated.get("createdAt").and_then(Crystal::as_date).copied(),
        created_at
    );
    assert!(updated.get("unknown").is_none());

    let removed = service.remove(&id).await.unwrap();
    assert!(removed.get("removedAt").and_then(Crystal::as_date).is_some());
    assert_eq!(service.load(&id).await.unwrap(), None);
    assert!(service.get(&id).await.unwrap_err().is_not_found());
    assert!(service.remove(&id).await.unwrap_err().is_not_found());
    assert_eq!(service.count("any", &[]).await.unwrap(), 0);
    // soft delete keeps the document
    assert_eq!(store.len("post").await, 1);

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            LifecycleEvent::Create,
            LifecycleEvent::Update,
            LifecycleEvent::Remove
        ]
    );
}

#[tokio::test]
async fn test_create_rejects_invalid_documents() {
    let fixture = post_fixture();
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry));
    let (service, store) = post_service(&fixture, &emitter);

    let err = service
        .create(&post_body("Negative", "u1", -5))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Validation { .. }));
    assert!(store.is_empty("post").await);
}

#[tokio::test]
async fn test_search_escapes_text() {
    let fixture = post_fixture();
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry));
    let (service, _) = post_service(&fixture, &emitter);
    for title in ["Hello World", "a.b", "axb"] {
        service.create(&post_body(title, "u1", 0)).await.unwrap();
    }

    let ServiceOutput::Many(hits) = service
        .call("searchPost", vec![json!("hello")])
        .await
        .unwrap()
    else {
        panic!("expected a list");
    };
    assert_eq!(hits.len(), 1);

    assert_eq!(
        service
            .call("searchCountPost", vec![json!("a.b")])
            .await
            .unwrap(),
        ServiceOutput::Count(1)
    );

    let ServiceOutput::Many(hits) = service
        .call("searchPost", vec![json!("body"), json!({ "limit": 2 })])
        .await
        .unwrap()
    else {
        panic!("expected a list");
    };
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_single_document_reads_skip_hidden_fields() {
    let fixture = post_fixture();
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry));
    let (service, _) = post_service(&fixture, &emitter);

    let created = service.create(&post_body("Quiet", "u1", 0)).await.unwrap();
    assert!(created.get("moderationNote").is_none());
    let id = text(&created, "id").unwrap();

    let ServiceOutput::One(Some(updated)) = service
        .call(
            "updatePost",
            vec![json!(id), json!({ "moderationNote": "needs review" })],
        )
        .await
        .unwrap()
    else {
        panic!("expected a document");
    };
    assert!(updated.get("moderationNote").is_none());

    let ServiceOutput::One(Some(fetched)) =
        service.call("getPost", vec![json!(id)]).await.unwrap()
    else {
        panic!("expected a document");
    };
    assert!(fetched.get("moderationNote").is_none());
    assert_eq!(text(&fetched, "title").as_deref(), Some("Quiet"));

    let loaded = service.load(&id).await.unwrap().unwrap();
    assert!(loaded.get("moderationNote").is_none());
    let removed = service.remove(&id).await.unwrap();
    assert!(removed.get("moderationNote").is_none());
}

#[tokio::test]
async fn test_extended_schema_fires_each_event_once() {
    let fixture = post_fixture();
    let recorder = Arc::new(EventRecorder::default());
    let events = Arc::clone(&recorder.events);
    let emitter = SchemaEmitter::new(Arc::clone(&fixture.registry)).with_middleware(recorder);

    let mut schema = emitter.build_schema(fixture.constant.full()).unwrap();
    let audit = fixture
        .registry
        .via()
        .scalar("review", |f| {
            f.add("reviewedBy", field(BaseType::String).nullable());
        })
        .unwrap();
    emitter.add_schema(&mut schema, &audit).unwrap();
    assert_eq!(schema.hook_count(), 1);

    let database = fixture.registry.get_database("post").unwrap();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let service = QueryService::new(database, schema, store);
    service.create(&post_body("Once", "u1", 0)).await.unwrap();

    assert_eq!(*events.lock().unwrap(), vec![LifecycleEvent::Create]);
}
