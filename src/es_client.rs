use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use human_bytes::human_bytes;
use logging_timer::stimer;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit_builder::{AuditBuilder, What};
use crate::conf::{EsConfig, TlsVersion};
use crate::error::{from_error_body, EsError, Result};
use crate::models::bulk::{build_body, delete_body, BulkBody, BulkOperation, BulkSummary};
use crate::models::document::Document;
use crate::models::scroll_response::{
    is_full_page, requested_page_size, ScrollPage, SearchResponse,
};
use crate::models::server_info::ServerInfo;

const NDJSON: &str = "application/x-ndjson";
const MAX_IDLE_PER_HOST: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Extra time the client waits past the store's own search timeout, so
/// partial `timed_out` answers still arrive.
const CLIENT_DEADLINE_MARGIN: Duration = Duration::from_secs(5);

/// Per-call knobs for searches. `scroll` is the keep-alive of the scroll
/// context; `None` runs a plain search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub timeout: Duration,
    pub scroll: Option<String>,
}

/// Handle on one Elasticsearch endpoint. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct EsClient {
    config: EsConfig,
    http_client: Client,
    audit: Option<Arc<Mutex<AuditBuilder>>>,
}

fn inject_auth(request_builder: RequestBuilder, config: &EsConfig) -> RequestBuilder {
    if config.has_basic_auth() {
        request_builder.basic_auth(config.get_username(), config.get_password())
    } else {
        request_builder
    }
}

fn build_reqwest_client(config: &EsConfig) -> Result<Client> {
    let tls = config.get_tls();
    let mut builder = Client::builder()
        .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(config.get_response_header_timeout())
        .min_tls_version(match tls.get_min_version() {
            TlsVersion::Tls12 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::Tls13 => reqwest::tls::Version::TLS_1_3,
        });
    if tls.is_skip_verify() {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(path) = tls.get_root_certificates() {
        for cert in load_certificates(path)? {
            builder = builder.add_root_certificate(cert);
        }
    }
    builder
        .build()
        .map_err(|e| EsError::Config(format!("failed to build HTTP client: {}", e)))
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let entries = std::fs::read_dir(path).map_err(|e| {
        EsError::Config(format!("cannot read root certificates {:?}: {}", path, e))
    })?;
    let mut certs = Vec::new();
    for entry in entries {
        let file_path = entry
            .map_err(|e| EsError::Config(e.to_string()))?
            .path();
        if !file_path.is_file() {
            continue;
        }
        let content = std::fs::read(&file_path)
            .map_err(|e| EsError::Config(format!("cannot read {:?}: {}", file_path, e)))?;
        let cert = Certificate::from_pem(&content)
            .map_err(|e| EsError::Config(format!("invalid certificate {:?}: {}", file_path, e)))?;
        certs.push(cert);
    }
    Ok(certs)
}

fn client_deadline(search_timeout: Duration) -> Duration {
    search_timeout + CLIENT_DEADLINE_MARGIN
}

/// Elasticsearch time unit for a duration, e.g. `10000ms`.
fn es_duration(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    Err(from_error_body(status, &body))
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| EsError::Decode(e.to_string()))
}

impl EsClient {
    /// Builds the HTTP client without contacting the cluster.
    pub fn new(config: EsConfig) -> Result<Self> {
        config.validate()?;
        let http_client = build_reqwest_client(&config)?;
        Ok(Self {
            config,
            http_client,
            audit: None,
        })
    }

    /// Builds the client and, unless disabled in the config, pings the cluster.
    pub async fn connect(config: EsConfig) -> Result<Self> {
        let client = Self::new(config)?;
        if client.config.is_ping_on_connect() {
            let server_info = client.server_info().await?;
            info!(
                "connected: hostname={}, name={}, uuid={:?}, version={}",
                server_info.get_hostname(),
                server_info.get_name(),
                server_info.get_uuid(),
                server_info.get_version()
            );
            if server_info.rejects_mapping_types() {
                warn!(
                    "cluster version {} rejects `_type` in bulk metadata; insert and upsert bodies carry it",
                    server_info.get_version()
                );
            }
        }
        Ok(client)
    }

    pub fn with_audit(mut self, audit: AuditBuilder) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    pub fn get_config(&self) -> &EsConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request_builder = self
            .http_client
            .request(method, format!("{}{}", self.config.get_url(), path));
        inject_auth(request_builder, &self.config)
    }

    async fn audit(&self, what: What, index: &str, data: &str) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.lock().await.append(what, index, data).await {
                warn!("failed to write audit entry {}: {}", what.as_str(), e);
            }
        }
    }

    pub async fn server_info(&self) -> Result<ServerInfo> {
        let response = self.request(Method::GET, "/").send().await?;
        let response = check_status(response).await?;
        decode_body(response).await
    }

    /// Sends a prepared body to `/{index}/_bulk`.
    ///
    /// Only the HTTP status decides success. The answer is decoded for the
    /// log and returned as a summary; failed items inside a successful
    /// answer are not reported as errors.
    pub async fn bulk(&self, index: &str, body: &BulkBody) -> Result<BulkSummary> {
        debug!(
            "bulk to {}: {} actions, {}",
            index,
            body.get_actions(),
            human_bytes(body.byte_len() as f64)
        );
        self.audit(What::BulkRequest, index, body.as_str()).await;

        let sent = self
            .request(Method::POST, &format!("/{}/_bulk", index))
            .query(&[("refresh", "false")])
            .header(CONTENT_TYPE, NDJSON)
            .body(body.as_str().to_owned())
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                warn!("bulk to {} failed: {}", index, e);
                self.audit(What::BulkResponseErr, index, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!("[{}] bulk to {} rejected", status, index);
            self.audit(What::BulkResponseErr, index, &text).await;
            return Err(from_error_body(status, &text));
        }
        self.audit(What::BulkResponseOk, index, &text).await;

        let summary = match serde_json::from_str::<BulkSummary>(&text) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("error parsing the bulk response body: {}", e);
                BulkSummary::default()
            }
        };
        if summary.errors {
            warn!(
                "bulk to {} reported item errors ({} items, took {}ms)",
                index, summary.items, summary.took
            );
        } else {
            debug!("bulk to {} done ({} items, took {}ms)", index, summary.items, summary.took);
        }
        Ok(summary)
    }

    /// Builds and sends one body for `docs`. Nothing is sent for an empty slice.
    /// Deletes go through [`EsClient::delete`] and are chunked like any id list.
    pub async fn write<D: Document>(
        &self,
        operation: BulkOperation,
        index: &str,
        docs: &[D],
    ) -> Result<BulkSummary> {
        if docs.is_empty() {
            info!("documents is empty, nothing to {}", operation.as_str());
            return Ok(BulkSummary::default());
        }
        if operation == BulkOperation::Delete {
            let ids: Vec<&str> = docs.iter().map(|doc| doc.document_id()).collect();
            return self.delete(index, &ids).await;
        }
        let body = build_body(operation, index, docs)?;
        self.bulk(index, &body).await
    }

    pub async fn insert<D: Document>(&self, index: &str, docs: &[D]) -> Result<BulkSummary> {
        self.write(BulkOperation::Insert, index, docs).await
    }

    /// Field-wise update, creating documents that do not exist yet.
    pub async fn upsert<D: Document>(&self, index: &str, docs: &[D]) -> Result<BulkSummary> {
        self.write(BulkOperation::Upsert, index, docs).await
    }

    /// Replaces whole documents, creating missing ones.
    pub async fn index<D: Document>(&self, index: &str, docs: &[D]) -> Result<BulkSummary> {
        self.write(BulkOperation::Index, index, docs).await
    }

    /// Deletes `ids` in chunks of `delete_batch_size`, one bulk call per
    /// chunk, in order. Stops at the first failing chunk; earlier chunks stay
    /// applied.
    pub async fn delete<S: AsRef<str>>(&self, index: &str, ids: &[S]) -> Result<BulkSummary> {
        let batch_size = self.config.get_delete_batch_size().max(1);
        info!("perform es document delete. index={}, total={}", index, ids.len());

        let mut summary = BulkSummary::default();
        for (chunk_no, chunk) in ids.chunks(batch_size).enumerate() {
            let body = delete_body(index, chunk, chunk_no * batch_size)?;
            let chunk_summary = self.bulk(index, &body).await?;
            summary.merge(&chunk_summary);
        }
        Ok(summary)
    }

    /// Drops the whole index.
    pub async fn delete_index(&self, index: &str) -> Result<()> {
        info!("delete ES index {}", index);
        self.audit(What::DeleteIndex, index, "").await;
        let response = self
            .request(Method::DELETE, &format!("/{}", index))
            .send()
            .await?;
        check_status(response).await?;
        info!("delete ES index {} done", index);
        Ok(())
    }

    fn default_search_options(&self) -> SearchOptions {
        SearchOptions {
            timeout: self.config.get_query_timeout(),
            scroll: None,
        }
    }

    fn default_scroll_options(&self) -> SearchOptions {
        SearchOptions {
            timeout: self.config.get_scroll_timeout(),
            scroll: Some(self.config.get_scroll_keep_alive().clone()),
        }
    }

    async fn execute_search<T: DeserializeOwned>(
        &self,
        index: &str,
        query: &Value,
        options: &SearchOptions,
    ) -> Result<T> {
        let mut params = vec![
            ("track_total_hits", "true".to_string()),
            ("timeout", es_duration(options.timeout)),
        ];
        if let Some(keep_alive) = &options.scroll {
            params.push(("scroll", keep_alive.clone()));
        }
        let response = self
            .request(Method::POST, &format!("/{}/_search", index))
            .query(&params)
            .timeout(client_deadline(options.timeout))
            .json(query)
            .send()
            .await?;
        let response = check_status(response).await?;
        decode_body(response).await
    }

    /// Runs `query` against `index` with the configured query timeout and
    /// decodes the answer into `T`.
    pub async fn search<Q, T>(&self, index: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.search_with(index, query, &self.default_search_options())
            .await
    }

    pub async fn search_with<Q, T>(&self, index: &str, query: &Q, options: &SearchOptions) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let _tmr = stimer!("es-search");
        let query = serde_json::to_value(query).map_err(EsError::Serialize)?;
        self.execute_search(index, &query, options).await
    }

    /// Opens a scroll and returns its first page. The page carries a scroll
    /// id only if it is exactly as large as the query's `size`.
    pub async fn scroll_start<Q, T>(&self, index: &str, query: &Q) -> Result<ScrollPage<T>>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.scroll_start_with(index, query, &self.default_scroll_options())
            .await
    }

    pub async fn scroll_start_with<Q, T>(
        &self,
        index: &str,
        query: &Q,
        options: &SearchOptions,
    ) -> Result<ScrollPage<T>>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let _tmr = stimer!("es-scroll-start");
        let query = serde_json::to_value(query).map_err(EsError::Serialize)?;
        let page_size = requested_page_size(&query);

        let mut options = options.clone();
        if options.scroll.is_none() {
            options.scroll = Some(self.config.get_scroll_keep_alive().clone());
        }
        let response: SearchResponse<T> = self.execute_search(index, &query, &options).await?;

        let hits = response.get_current_size();
        let scroll_id = if is_full_page(hits, page_size) {
            let scroll_id = response
                .get_scroll_id()
                .ok_or_else(|| EsError::Decode("full page without _scroll_id".to_string()))?;
            Some(scroll_id.to_string())
        } else {
            None
        };
        info!(
            "scroll started on {}: {} hits of {} requested, total {:?}, more={}",
            index,
            hits,
            page_size,
            response.get_total_size(),
            scroll_id.is_some()
        );
        Ok(ScrollPage {
            response,
            scroll_id,
        })
    }

    /// Fetches the page after `scroll_id`. An empty page ends the scroll.
    pub async fn scroll_next<T: DeserializeOwned>(&self, scroll_id: &str) -> Result<ScrollPage<T>> {
        let keep_alive = self.config.get_scroll_keep_alive().clone();
        self.scroll_next_with(scroll_id, &keep_alive).await
    }

    pub async fn scroll_next_with<T: DeserializeOwned>(
        &self,
        scroll_id: &str,
        keep_alive: &str,
    ) -> Result<ScrollPage<T>> {
        if scroll_id.is_empty() {
            return Err(EsError::InvalidArgument(
                "scroll id can not be empty".to_string(),
            ));
        }
        let _tmr = stimer!("es-scroll-next");
        let response = self
            .request(Method::POST, "/_search/scroll")
            .timeout(client_deadline(self.config.get_scroll_timeout()))
            .json(&json!({ "scroll": keep_alive, "scroll_id": scroll_id }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let response: SearchResponse<T> = decode_body(response).await?;

        let scroll_id = if response.has_docs() {
            let scroll_id = response
                .get_scroll_id()
                .ok_or_else(|| EsError::Decode("page without _scroll_id".to_string()))?;
            Some(scroll_id.to_string())
        } else {
            None
        };
        debug!(
            "scroll page: {} hits, more={}",
            response.get_current_size(),
            scroll_id.is_some()
        );
        Ok(ScrollPage {
            response,
            scroll_id,
        })
    }

    /// Releases a scroll context. An already expired context is not an error.
    pub async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        if scroll_id.is_empty() {
            return Err(EsError::InvalidArgument(
                "scroll id can not be empty".to_string(),
            ));
        }
        let response = self
            .request(Method::DELETE, "/_search/scroll")
            .json(&json!({ "scroll_id": [scroll_id] }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("scroll context already gone");
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_use_millis() {
        assert_eq!(es_duration(Duration::from_secs(10)), "10000ms");
        assert_eq!(es_duration(Duration::from_millis(5)), "5ms");
    }

    #[test]
    fn client_waits_past_search_timeout() {
        let timeout = Duration::from_secs(10);
        assert!(client_deadline(timeout) > timeout);
        assert_eq!(client_deadline(timeout), Duration::from_secs(15));
    }

    #[test]
    fn missing_certificate_dir_is_config_error() {
        let err = load_certificates(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, EsError::Config(_)));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let err = EsClient::new(EsConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, EsError::Config(_)));
    }
}
