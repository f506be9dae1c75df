use serde::{Deserialize, Serialize};

// --- Search (/v1/search) ---

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<SearchHit>,
}

/// One organic search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

// --- Scrape (/v1/scrape) ---

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeResponse {
    #[serde(default)]
    pub success: bool,
    pub data: Option<ScrapeData>,
}

/// Best-effort page content: markdown plus whatever metadata the page exposed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeData {
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub metadata: ScrapeMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "ogImage")]
    pub og_image: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
}

// --- Extract (/v1/extract, async job) ---

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest {
    pub urls: Vec<String>,
    pub prompt: String,
    pub schema: serde_json::Value,
}

/// Response to an extract submission. The job id is polled until completion.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractSubmitResponse {
    #[serde(default)]
    pub success: bool,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractStatusResponse {
    #[serde(default)]
    pub status: String,
    /// Shape varies: an array of items, an object with a nested array, or a
    /// single merged object. Interpreting it is the caller's policy.
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Upstream job states, normalized from the raw status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractJobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExtractStatusResponse {
    pub fn state(&self) -> ExtractJobState {
        match self.status.as_str() {
            "completed" => ExtractJobState::Completed,
            "failed" | "cancelled" => ExtractJobState::Failed,
            "processing" => ExtractJobState::Processing,
            _ => ExtractJobState::Pending,
        }
    }
}
