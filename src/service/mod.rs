//! Filter-driven service synthesis: named queries and sort keys expand into
//! the CRUD and per-key query method surface of an entity.

mod filter;
mod method;
mod options;
mod query_service;

pub use filter::{FilterSpec, PredicateFn, QueryDef};
pub use method::{CrudMethod, Method, QueryMethod, method_table};
pub use options::{QueryOptions, is_option_bag, split_arguments};
pub use query_service::{QueryService, ServiceOutput};
