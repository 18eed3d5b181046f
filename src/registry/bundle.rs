use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::constant::ConstantModel;
use crate::service::FilterSpec;
use crate::types::ModelId;

/// Identities of the variants that make up one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantBundle {
    pub ref_name: String,
    pub input: ModelId,
    pub object: ModelId,
    pub full: ModelId,
    pub light: ModelId,
    pub insight: ModelId,
}

/// A persisted entity: its constant bundle plus the filter spec that drives
/// service synthesis.
#[derive(Clone)]
pub struct DatabaseModel {
    pub constant: ConstantModel,
    pub filter: Arc<FilterSpec>,
}

impl DatabaseModel {
    pub fn ref_name(&self) -> &str {
        self.constant.ref_name()
    }
}

impl std::fmt::Debug for DatabaseModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseModel")
            .field("ref_name", &self.ref_name())
            .field("queries", &self.filter.query_keys())
            .finish()
    }
}
