pub mod config;
pub mod entities;
pub mod extractor;
pub mod fetcher;
pub mod health;
pub mod ingest;
pub mod observability;
pub mod queue;
pub mod resurfacer;
pub mod store;
