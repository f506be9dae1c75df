//! Two-phase batch extraction: search gave us URLs, this turns them into
//! structured opportunity drafts.
//!
//! URLs are processed in fixed-size batches against the asynchronous
//! extraction capability. A batch that comes back short — fewer structured
//! items than URLs submitted — is reprocessed URL by URL, and the better of
//! the two passes wins. Per-URL failures are logged and swallowed; only a
//! poll timeout is fatal to the enclosing job.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use fundscout_common::{
    FundScoutError, MergedObjectPolicy, NewOpportunity, OpportunityDraft, SourceKind,
};

use crate::deadline::normalize_deadline;
use crate::poller::{Clock, ExtractionPoller, PollConfig};
use crate::traits::ExtractClient;

/// Instruction prompt sent with every extraction submission.
pub const EXTRACTION_PROMPT: &str = "Extract every scholarship, grant, or fellowship listing on \
the page. For each one, fill the schema fields exactly: title, provider (the offering \
organization), description (what it funds and who it is for), deadline as printed, award amount, \
eligibility requirements, required documents, essay prompts, contact info, geographic region, and \
the application URL. Use null for anything the page does not state. Do not invent values.";

/// Envelope the schema asks the extractor to return: one item per URL under a
/// known key.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractionEnvelope {
    #[serde(default)]
    pub opportunities: Vec<OpportunityDraft>,
}

/// JSON schema submitted with each extraction job. The core identity fields
/// are marked required for the extractor; locally they are still recovered by
/// defaulting when the upstream ignores that.
pub fn extraction_schema() -> serde_json::Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(ExtractionEnvelope))
        .expect("extraction schema serializes");
    if let Some(draft) = schema.pointer_mut("/definitions/OpportunityDraft") {
        draft["required"] = serde_json::json!(["title", "provider", "description", "deadline"]);
    }
    schema
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Interpret an extraction payload. Upstream returns an array in the good
/// case, sometimes an object with the array nested under `opportunities`, and
/// sometimes — when it collapses a multi-URL batch — a single merged object.
/// The last shape is read according to the configured policy.
pub fn parse_extract_payload(
    payload: &serde_json::Value,
    policy: MergedObjectPolicy,
) -> Result<Vec<OpportunityDraft>, FundScoutError> {
    match payload {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(items) => Ok(drafts_from_items(items)),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::Array(items)) = map.get("opportunities") {
                return Ok(drafts_from_items(items));
            }
            match policy {
                MergedObjectPolicy::SingleItem => {
                    warn!("Extraction returned a bare object; treating as one merged item");
                    Ok(draft_from_value(payload).into_iter().collect())
                }
                MergedObjectPolicy::Reject => Err(FundScoutError::InvalidOrMissingField(
                    "extraction returned a bare object and policy rejects merged items".to_string(),
                )),
            }
        }
        other => Err(FundScoutError::InvalidOrMissingField(format!(
            "unexpected extraction payload shape: {other}"
        ))),
    }
}

fn drafts_from_items(items: &[serde_json::Value]) -> Vec<OpportunityDraft> {
    items.iter().filter_map(draft_from_value).collect()
}

fn draft_from_value(value: &serde_json::Value) -> Option<OpportunityDraft> {
    match serde_json::from_value::<OpportunityDraft>(value.clone()) {
        Ok(draft) => Some(draft),
        Err(e) => {
            warn!(error = %e, "Skipping unparseable extraction item");
            None
        }
    }
}

/// When the item count lines up with the submitted URLs, items without an
/// application URL inherit the URL at their index.
pub fn assign_application_urls(drafts: &mut [OpportunityDraft], urls: &[String]) {
    if drafts.len() != urls.len() {
        return;
    }
    for (draft, url) in drafts.iter_mut().zip(urls) {
        if draft.application_url.as_deref().map_or(true, str::is_empty) {
            draft.application_url = Some(url.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Draft finalization — missing-field recovery
// ---------------------------------------------------------------------------

/// Turn a draft into an insertable opportunity. Missing required fields never
/// block persistence: title and provider fall back to the URL hostname, the
/// description is synthesized from whatever eligibility text exists, and the
/// deadline gets the deterministic URL-hash fallback.
pub fn finalize_draft(
    draft: OpportunityDraft,
    fallback_url: &str,
    image_url: Option<String>,
    source: SourceKind,
) -> NewOpportunity {
    let application_url = draft
        .application_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| fallback_url.to_string());
    let host = host_of(&application_url);

    let title = non_empty(draft.title)
        .unwrap_or_else(|| format!("Funding opportunity at {host}"));
    let provider = non_empty(draft.provider).unwrap_or_else(|| host.clone());
    let description = non_empty(draft.description).unwrap_or_else(|| {
        if draft.requirements.is_empty() {
            format!("{title} offered by {provider}. See the application page for details.")
        } else {
            format!("Eligibility: {}", draft.requirements.join(". "))
        }
    });
    let deadline = normalize_deadline(draft.deadline.as_deref(), &application_url);

    let mut new = NewOpportunity {
        title,
        provider,
        description,
        deadline,
        award_amount: draft.award_amount.and_then(non_empty_opt),
        requirements: draft.requirements,
        required_documents: draft.required_documents,
        essay_prompts: draft.essay_prompts,
        contact_info: draft.contact_info.and_then(non_empty_opt),
        region: draft.region.and_then(non_empty_opt),
        image_url,
        application_url,
        tags: Vec::new(),
        source,
    };
    new.apply_caps();
    new
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown source".to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn non_empty_opt(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

// ---------------------------------------------------------------------------
// Batch extractor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// URLs per extraction submission.
    pub batch_size: usize,
    pub poll: PollConfig,
    pub merged_object_policy: MergedObjectPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll: PollConfig::default(),
            merged_object_policy: MergedObjectPolicy::SingleItem,
        }
    }
}

/// Per-batch accounting, rolled up into the run stats.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_items: u32,
    pub fallback_extractions: u32,
    pub degraded: bool,
}

pub struct BatchExtractor<'a> {
    extract: &'a dyn ExtractClient,
    clock: &'a dyn Clock,
    config: BatchConfig,
}

impl<'a> BatchExtractor<'a> {
    pub fn new(extract: &'a dyn ExtractClient, clock: &'a dyn Clock, config: BatchConfig) -> Self {
        Self {
            extract,
            clock,
            config,
        }
    }

    /// Extract one batch of URLs. Shortfalls and batch errors degrade to the
    /// per-URL fallback; a poll timeout propagates and fails the job.
    pub async fn extract_batch(
        &self,
        urls: &[String],
    ) -> Result<(Vec<OpportunityDraft>, BatchReport), FundScoutError> {
        let mut report = BatchReport::default();

        let batch_result = self.attempt_batch(urls).await;
        let batch_drafts = match batch_result {
            Ok(drafts) => drafts,
            Err(FundScoutError::Timeout { attempts }) => {
                return Err(FundScoutError::Timeout { attempts });
            }
            Err(e) => {
                warn!(urls = urls.len(), error = %e, "Batch extraction failed, falling back per URL");
                report.degraded = true;
                let individual = self.extract_all_individually(urls, &mut report).await;
                return Ok((individual, report));
            }
        };
        report.batch_items = batch_drafts.len() as u32;

        if batch_drafts.len() >= urls.len() {
            return Ok((batch_drafts, report));
        }

        // Degraded batch: fewer items than URLs. Reprocess every URL
        // individually and keep whichever pass found more.
        warn!(
            expected = urls.len(),
            got = batch_drafts.len(),
            "Extraction shortfall, reprocessing batch per URL"
        );
        report.degraded = true;
        let individual = self.extract_all_individually(urls, &mut report).await;
        let merged = merge_results(batch_drafts, individual);
        Ok((merged, report))
    }

    async fn attempt_batch(
        &self,
        urls: &[String],
    ) -> Result<Vec<OpportunityDraft>, FundScoutError> {
        let job_id = self
            .extract
            .submit(urls, EXTRACTION_PROMPT, extraction_schema())
            .await
            .map_err(|e| FundScoutError::UpstreamUnavailable(e.to_string()))?;

        let poller = ExtractionPoller::new(self.extract, self.clock, self.config.poll);
        let payload = poller.wait(&job_id).await?;

        let mut drafts = parse_extract_payload(&payload, self.config.merged_object_policy)?;
        assign_application_urls(&mut drafts, urls);
        Ok(drafts)
    }

    /// Per-URL fallback over the whole batch, sequentially. Each URL gets the
    /// same schema and prompt; any failure — including a poll timeout — turns
    /// into a skipped URL, never an aborted run.
    async fn extract_all_individually(
        &self,
        urls: &[String],
        report: &mut BatchReport,
    ) -> Vec<OpportunityDraft> {
        let mut drafts = Vec::new();
        for url in urls {
            report.fallback_extractions += 1;
            if let Some(draft) = self.extract_single(url).await {
                drafts.push(draft);
            }
        }
        info!(
            urls = urls.len(),
            extracted = drafts.len(),
            "Individual fallback pass complete"
        );
        drafts
    }

    /// Extract a single URL. Returns None on any failure.
    pub async fn extract_single(&self, url: &str) -> Option<OpportunityDraft> {
        let urls = vec![url.to_string()];
        match self.attempt_batch(&urls).await {
            Ok(mut drafts) => {
                if drafts.is_empty() {
                    return None;
                }
                let mut draft = drafts.remove(0);
                if draft.application_url.as_deref().map_or(true, str::is_empty) {
                    draft.application_url = Some(url.to_string());
                }
                Some(draft)
            }
            Err(e) => {
                warn!(url, error = %e, "Individual extraction failed");
                None
            }
        }
    }
}

/// Prefer the individual pass when it found more items; otherwise keep the
/// batch results and merge in individual items for URLs the batch missed.
fn merge_results(
    batch: Vec<OpportunityDraft>,
    individual: Vec<OpportunityDraft>,
) -> Vec<OpportunityDraft> {
    if individual.len() > batch.len() {
        return individual;
    }

    let mut seen: std::collections::HashSet<String> = batch
        .iter()
        .filter_map(|d| d.application_url.clone())
        .collect();
    let mut merged = batch;
    for draft in individual {
        match &draft.application_url {
            Some(url) if seen.contains(url) => continue,
            Some(url) => {
                seen.insert(url.clone());
                merged.push(draft);
            }
            None => merged.push(draft),
        }
    }
    merged
}
