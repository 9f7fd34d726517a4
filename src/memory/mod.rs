pub mod index;
pub mod manage;
pub mod search;
pub mod service;
pub mod store;
pub mod types;

pub use service::MemoryService;
