mod common;

use common::*;
use model_compiler::*;
use serde_json::json;

#[test]
fn test_full_default_covers_every_field() {
    let fixture = post_fixture();
    let default = fixture.constant.get_default().unwrap();
    let entry = fixture.registry.entry(fixture.constant.full()).unwrap();
    for key in entry.keys() {
        assert!(default.get(key).is_some(), "default is missing {key}");
    }

    assert_eq!(default["id"], json!(""));
    assert_eq!(default["createdAt"], json!("1970-01-01T00:00:00.000Z"));
    assert_eq!(default["removedAt"], json!(null));
    assert_eq!(default["status"], json!("draft"));
    assert_eq!(default["views"], json!(0));
    assert_eq!(default["place"], json!(null));
    assert_eq!(default["spots"], json!([]));
    assert_eq!(default["stops"], json!([]));
    assert_eq!(default["moderationNote"], json!(null));
}

#[test]
fn test_insight_default_starts_at_zero() {
    let fixture = post_fixture();
    assert_eq!(
        fixture.constant.get_default_insight().unwrap(),
        json!({ "count": 0, "totalViews": 0 })
    );
}

#[test]
fn test_persisted_models_default_to_null_as_children() {
    let fixture = post_fixture();
    let child = fixture
        .registry
        .make_default(fixture.constant.full(), DefaultOptions::child())
        .unwrap();
    assert!(child.is_null());

    let geo = fixture
        .registry
        .make_default(&fixture.geo, DefaultOptions::child())
        .unwrap();
    assert_eq!(geo, json!({ "lat": 0, "lng": 0 }));
}

#[test]
fn test_purify_after_crystalize_matches_purify() {
    let fixture = post_fixture();
    let raw = json!({
        "title": "Hello",
        "body": "World",
        "ownerId": "u1",
        "tags": ["a", "b"],
        "place": { "lat": 1.5, "lng": 2.0, "alt": 9 },
        "editedAt": ["2024-02-03"],
        "status": "published",
        "unknown": true
    });

    let purified = fixture.constant.purify(&raw).unwrap();
    let crystal = fixture.constant.crystalize(&raw).unwrap();
    let again = fixture.constant.purify(&crystal.to_value()).unwrap();
    assert_eq!(again, purified);

    assert!(purified.get("unknown").is_none());
    assert!(purified.get("status").is_none());
    assert_eq!(purified["place"], json!({ "lat": 1.5, "lng": 2.0 }));
    assert_eq!(purified["editedAt"], json!(["2024-02-03T00:00:00.000Z"]));
}

#[test]
fn test_crystalize_keeps_declared_fields_only() {
    let fixture = post_fixture();
    let crystal = fixture
        .constant
        .light_crystalize(&json!({ "title": "Hello", "body": "World", "ownerId": "u1" }))
        .unwrap();
    assert_eq!(
        crystal.get("title"),
        Some(&Crystal::String("Hello".to_string()))
    );
    assert!(crystal.get("body").is_none());
    assert_eq!(
        crystal.as_model().map(|model| model.model.clone()),
        Some(fixture.constant.light().clone())
    );
}
