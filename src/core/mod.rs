pub mod config;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod lifecycle;
pub mod notify;
pub mod session;
pub mod stats;
pub mod store;
pub mod terminal;
pub mod text;
pub mod types;
