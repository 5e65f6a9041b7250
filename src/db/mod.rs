pub mod executor;
pub mod introspect;
pub mod pool;
pub mod schema;
pub mod schema_manager;
