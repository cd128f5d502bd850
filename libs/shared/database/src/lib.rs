pub mod memory_store;
pub mod rest_store;
pub mod store;
pub mod supabase;

pub use memory_store::MemoryStore;
pub use rest_store::RestStore;
pub use store::{tables, Filter, Query, Store};
