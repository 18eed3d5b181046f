mod common;

use common::*;
use model_compiler::*;
use std::sync::Arc;

#[test]
fn test_library_extension_merges_before_declared_fields() {
    let registry = Arc::new(MetadataRegistry::new());
    let via = registry.via();

    let pin_input = via
        .input(
            "pinnable",
            |f| {
                f.add("pinned", field(BaseType::Boolean).with_default(false));
            },
            &[],
        )
        .unwrap();
    let pin_object = via
        .object(
            &pin_input,
            |f| {
                f.add("pinnedAt", field(BaseType::Date).nullable());
            },
            &[],
        )
        .unwrap();

    let post_input = via
        .input(
            "post",
            |f| {
                f.add("title", field(BaseType::String))
                    .add("body", field(BaseType::String));
            },
            &[pin_input.clone()],
        )
        .unwrap();
    let input_keys: Vec<String> = registry
        .entry(&post_input)
        .unwrap()
        .keys()
        .map(str::to_string)
        .collect();
    assert_eq!(input_keys, vec!["pinned", "title", "body"]);

    let post_object = via.object(&post_input, |_| {}, &[pin_object]).unwrap();
    let object_keys: Vec<String> = registry
        .entry(&post_object)
        .unwrap()
        .keys()
        .map(str::to_string)
        .collect();
    assert_eq!(
        object_keys,
        vec![
            "id",
            "createdAt",
            "updatedAt",
            "removedAt",
            "pinned",
            "title",
            "body",
            "pinnedAt"
        ]
    );
}

#[test]
fn test_reregistration_returns_cached_identity() {
    let fixture = post_fixture();
    let input = fixture.constant.input().clone();
    let before = fixture.registry.entry(&input).unwrap();

    let again = fixture
        .registry
        .via()
        .input(
            "post",
            |f| {
                f.add("subtitle", field(BaseType::String));
            },
            &[],
        )
        .unwrap();
    assert_eq!(again, input);
    let after = fixture.registry.entry(&input).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(!after.fields.contains_key("subtitle"));

    fixture
        .registry
        .via()
        .overwrite()
        .input(
            "post",
            |f| {
                f.add("subtitle", field(BaseType::String));
            },
            &[],
        )
        .unwrap();
    assert!(fixture
        .registry
        .entry(&input)
        .unwrap()
        .fields
        .contains_key("subtitle"));
}

#[test]
fn test_light_fields_are_a_subset_of_full() {
    let fixture = post_fixture();
    let registry = &fixture.registry;
    let light = registry.entry(fixture.constant.light()).unwrap();
    let full = registry.entry(fixture.constant.full()).unwrap();

    let light_keys: Vec<&str> = light.keys().collect();
    assert_eq!(
        light_keys,
        vec!["id", "createdAt", "updatedAt", "removedAt", "title", "ownerId"]
    );
    for (key, meta) in &light.fields {
        assert!(full.fields[key].same_shape(meta), "{key} differs");
    }
    assert!(full.field("excerpt").unwrap().is_resolved());
}

#[test]
fn test_bundle_rejects_mismatched_variants() {
    let fixture = post_fixture();
    let c = &fixture.constant;
    let err = ConstantModel::new(
        &fixture.registry,
        c.input(),
        c.object(),
        c.light(),
        c.full(),
        c.insight(),
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::VariantMismatch { .. }));
}

#[test]
fn test_child_class_refs_and_lookups() {
    let fixture = post_fixture();
    let registry = &fixture.registry;
    let full = fixture.constant.full();

    assert_eq!(
        registry.get_child_class_refs(full).unwrap(),
        vec![fixture.geo.clone()]
    );
    assert!(registry.is_full(full));
    assert!(registry.is_scalar(&fixture.geo));
    assert!(!registry.is_light(full));
    assert_eq!(registry.get_ref_name(full), "post");
    assert_eq!(
        registry.model("post", VariantKind::Insight).unwrap(),
        *fixture.constant.insight()
    );
    assert!(registry.model("post", VariantKind::Filter).is_err());

    let restored = registry.get_constant("post").unwrap();
    assert_eq!(restored.full(), full);
    assert!(registry.get_constant("ghost").is_err());
}

#[test]
fn test_dependent_library_widens_the_same_entity() {
    let registry = Arc::new(MetadataRegistry::new());
    let via = registry.via();
    let input = via
        .input(
            "post",
            |f| {
                f.add("title", field(BaseType::String))
                    .add("body", field(BaseType::String));
            },
            &[],
        )
        .unwrap();
    let object = via.object(&input, |_| {}, &[]).unwrap();
    let light = via.light(&object, &["title"], |_| {}, &[]).unwrap();
    let full = via.full(&object, &light, |_| {}, &[]).unwrap();
    let before = registry.make_default(&full, DefaultOptions::default()).unwrap();
    assert!(before.get("pinned").is_none());

    // without overwrite the widening is ignored
    let cached_entry = registry.entry(&input).unwrap();
    let again = registry
        .via()
        .input(
            "post",
            |f| {
                f.add("pinned", field(BaseType::Boolean).with_default(false));
            },
            &[input.clone()],
        )
        .unwrap();
    assert_eq!(again, input);
    assert!(Arc::ptr_eq(&cached_entry, &registry.entry(&input).unwrap()));

    let widen = registry.via().overwrite();
    let wide_input = widen
        .input(
            "post",
            |f| {
                f.add("pinned", field(BaseType::Boolean).with_default(false));
            },
            &[input.clone()],
        )
        .unwrap();
    assert_eq!(wide_input, input);
    let wide_object = widen.object(&wide_input, |_| {}, &[]).unwrap();
    let wide_light = widen.light(&wide_object, &["title"], |_| {}, &[]).unwrap();
    let wide_full = widen.full(&wide_object, &wide_light, |_| {}, &[]).unwrap();
    assert_eq!(wide_full, full);

    let keys: Vec<String> = registry
        .entry(&full)
        .unwrap()
        .keys()
        .map(str::to_string)
        .collect();
    assert_eq!(
        keys,
        vec!["id", "createdAt", "updatedAt", "removedAt", "title", "body", "pinned"]
    );
    let after = registry.make_default(&full, DefaultOptions::default()).unwrap();
    assert_eq!(after["pinned"], serde_json::json!(false));
    assert_eq!(after["title"], serde_json::json!(""));
}
