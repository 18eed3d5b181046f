use serde::Serialize;
use serde_json::Value;
use std::fmt;

use super::DocumentSchema;

/// Soft-delete marker on every persisted object.
pub const REMOVED_AT: &str = "removedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Create,
    Update,
    Remove,
}

impl LifecycleEvent {
    /// A write with no previous document is a create; a write that moves the
    /// soft-delete marker from null to non-null is a remove; anything else is
    /// an update.
    pub fn classify(before: Option<&Value>, after: &Value) -> Self {
        let Some(before) = before else {
            return Self::Create;
        };
        let was_removed = before.get(REMOVED_AT).is_some_and(|v| !v.is_null());
        let is_removed = after.get(REMOVED_AT).is_some_and(|v| !v.is_null());
        if !was_removed && is_removed {
            Self::Remove
        } else {
            Self::Update
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer fired after a document is written.
pub trait LifecycleHook: Send + Sync {
    fn on_event(&self, event: LifecycleEvent, doc: &Value);
}

impl<F> LifecycleHook for F
where
    F: Fn(LifecycleEvent, &Value) + Send + Sync,
{
    fn on_event(&self, event: LifecycleEvent, doc: &Value) {
        self(event, doc)
    }
}

/// Collaborator that adjusts a persistence schema once it is built, and again
/// whenever a library extends it.
pub trait SchemaMiddleware: Send + Sync {
    fn on_schema(&self, schema: &mut DocumentSchema);
}
