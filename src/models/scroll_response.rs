use serde::Deserialize;
use serde_json::Value;

/// Page size the store applies when a query carries no `size`.
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse<T = Value> {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(default)]
    took: u64,
    #[serde(default)]
    timed_out: bool,
    hits: Hits<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hits<T> {
    #[serde(default)]
    total: Option<Total>,
    hits: Vec<Hit<T>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Total {
    Object { value: u64, relation: String },
    Legacy(u64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Hit<T> {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    /// Absent when the query turns `_source` off or filters it away.
    #[serde(rename = "_source", default)]
    source: Option<T>,
}

impl<T> SearchResponse<T> {
    pub fn get_scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }
    pub fn get_took(&self) -> u64 {
        self.took
    }
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }
    pub fn get_hits(&self) -> &Vec<Hit<T>> {
        &self.hits.hits
    }
    pub fn into_hits(self) -> Vec<Hit<T>> {
        self.hits.hits
    }
    pub fn get_current_size(&self) -> usize {
        self.hits.hits.len()
    }
    pub fn has_docs(&self) -> bool {
        self.get_current_size() > 0
    }
    pub fn get_total_size(&self) -> Option<u64> {
        match &self.hits.total {
            Some(Total::Object { value, .. }) => Some(*value),
            Some(Total::Legacy(value)) => Some(*value),
            None => None,
        }
    }
}

impl<T> Hit<T> {
    pub fn get_index(&self) -> &String {
        &self.index
    }
    pub fn get_id(&self) -> &String {
        &self.id
    }
    pub fn get_score(&self) -> Option<f64> {
        self.score
    }
    pub fn get_source(&self) -> Option<&T> {
        self.source.as_ref()
    }
    pub fn into_source(self) -> Option<T> {
        self.source
    }
}

/// One page of a scrolled search.
///
/// `scroll_id` is `None` once the cursor is known to be exhausted.
#[derive(Debug, Clone)]
pub struct ScrollPage<T = Value> {
    pub response: SearchResponse<T>,
    pub scroll_id: Option<String>,
}

impl<T> ScrollPage<T> {
    pub fn has_more(&self) -> bool {
        self.scroll_id.is_some()
    }
}

/// Page size requested by a query body: its `size` field, or the store default.
pub fn requested_page_size(query: &Value) -> usize {
    query
        .get("size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// Whether a first page may be followed by more: only a completely full page
/// counts. A store whose last page is exactly full costs one extra empty
/// round trip.
pub fn is_full_page(hits: usize, page_size: usize) -> bool {
    hits == page_size
}
