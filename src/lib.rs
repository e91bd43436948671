//! Bulk and scroll helpers for Elasticsearch.
//!
//! [`EsClient`] writes documents through the `_bulk` endpoint (create,
//! upsert, index, chunked delete) and reads large result sets with scroll
//! cursors. The body builders in [`models::bulk`] can be used on their own.

pub mod audit_builder;
pub mod conf;
pub mod error;
pub mod es_client;
pub mod models;
pub mod utils;

pub use conf::{Config, EsConfig, LevelMode, TlsConfig, TlsVersion};
pub use error::{EsError, Result};
pub use es_client::{EsClient, SearchOptions};
pub use models::bulk::{BulkBody, BulkOperation, BulkSummary};
pub use models::document::{Document, RawDocument};
pub use models::scroll_response::{Hit, ScrollPage, SearchResponse};
pub use models::server_info::ServerInfo;
