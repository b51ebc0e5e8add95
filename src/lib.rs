pub mod app;
pub mod backend;
pub mod config;
pub mod dandi;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod indexer;
pub mod loader;
pub mod marqo;
pub mod normalize;
pub mod openneuro;
pub mod output;
pub mod search;
pub mod store;
