use model_compiler::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// The `post` entity used across the integration tests.
///
/// Input: title, body, ownerId (immutable), views, tags, place (embedded
/// geo), spots (optional geo array), stops (geo array), editedAt (date
/// array). Object adds status and a hidden moderation note, full adds a
/// resolved excerpt and the insight sums views.
#[allow(dead_code)]
pub struct PostFixture {
    pub registry: Arc<MetadataRegistry>,
    pub constant: ConstantModel,
    pub geo: ModelId,
}

#[allow(dead_code)]
pub fn post_fixture() -> PostFixture {
    let registry = Arc::new(MetadataRegistry::new());
    let via = registry.via();

    let geo = via
        .scalar("geo", |f| {
            f.add("lat", field(BaseType::Float))
                .add("lng", field(BaseType::Float));
        })
        .unwrap();

    let input = via
        .input(
            "post",
            |f| {
                f.add(
                    "title",
                    field(BaseType::String)
                        .text(TextRole::Search)
                        .describe("Headline shown in lists"),
                )
                .add("body", field(BaseType::String).text(TextRole::Search))
                .add("ownerId", field(BaseType::String).immutable())
                .add("views", field(BaseType::Int).with_default(0).min(0.0))
                .add("tags", field(FieldType::array(BaseType::String)))
                .add("place", field(&geo).nullable())
                .add("spots", field(FieldType::array(&geo)).nullable())
                .add("stops", field(FieldType::array(&geo)))
                .add("editedAt", field(FieldType::array(BaseType::Date)));
            },
            &[],
        )
        .unwrap();
    let object = via
        .object(
            &input,
            |f| {
                f.add(
                    "status",
                    field(BaseType::String)
                        .with_default("draft")
                        .enum_of(["draft", "published"]),
                )
                .add("moderationNote", hidden(BaseType::String));
            },
            &[],
        )
        .unwrap();
    let light = via.light(&object, &["title", "ownerId"], |_| {}, &[]).unwrap();
    let full = via
        .full(
            &object,
            &light,
            |f| {
                f.add("excerpt", field(BaseType::String));
            },
            &[],
        )
        .unwrap();
    let insight = via
        .insight(
            &full,
            |f| {
                f.add(
                    "totalViews",
                    field(BaseType::Int)
                        .with_default(0)
                        .accumulate(json!({ "$sum": "$views" })),
                );
            },
            &[],
        )
        .unwrap();

    let constant = ConstantModel::new(&registry, &input, &object, &full, &light, &insight).unwrap();
    let filter = FilterSpec::new("post")
        .query("byOwner", ["ownerId"], |args| Ok(json!({ "ownerId": args[0] })))
        .sort("mostViewed", json!({ "views": -1 }));
    registry.register_database(&constant, filter).unwrap();

    PostFixture {
        registry,
        constant,
        geo,
    }
}

#[allow(dead_code)]
pub fn post_service(
    fixture: &PostFixture,
    emitter: &SchemaEmitter,
) -> (QueryService, Arc<MemoryDocumentStore>) {
    let store = Arc::new(MemoryDocumentStore::new());
    let shared: Arc<dyn DocumentStore> = store.clone();
    let service = QueryService::for_database(&fixture.registry, "post", emitter, shared).unwrap();
    (service, store)
}

/// Middleware that attaches a hook recording every lifecycle event.
#[allow(dead_code)]
#[derive(Default)]
pub struct EventRecorder {
    pub events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl SchemaMiddleware for EventRecorder {
    fn on_schema(&self, schema: &mut DocumentSchema) {
        let events = Arc::clone(&self.events);
        schema.add_hook(Arc::new(move |event: LifecycleEvent, _doc: &Value| {
            events.lock().unwrap().push(event);
        }));
    }
}

#[allow(dead_code)]
pub fn post_body(title: &str, owner: &str, views: i64) -> Value {
    json!({
        "title": title,
        "body": format!("{title} body"),
        "ownerId": owner,
        "views": views
    })
}
