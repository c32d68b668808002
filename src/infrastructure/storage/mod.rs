//! Storage adapters for the session and document ports.

pub mod memory;

pub use memory::InMemorySessionStore;
