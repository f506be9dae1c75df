use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Field caps ---

/// Fixed embedding dimension, system-wide (OpenAI text-embedding-3-small).
pub const EMBEDDING_DIM: usize = 1536;

/// Descriptions are truncated to this many characters on insert.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Requirement and required-document lists are capped at this length.
pub const MAX_LIST_ITEMS: usize = 10;

/// Essay prompt lists are capped at this length.
pub const MAX_ESSAY_PROMPTS: usize = 5;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    General,
    ProfileScoped,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::General => "general",
            JobKind::ProfileScoped => "profile-scoped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "general" => Some(JobKind::General),
            "profile-scoped" => Some(JobKind::ProfileScoped),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal jobs are never reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    GeneralSearch,
    ProfileSearch,
    Crawl,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::GeneralSearch => "general-search",
            SourceKind::ProfileSearch => "profile-search",
            SourceKind::Crawl => "crawl",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "general-search" => Some(SourceKind::GeneralSearch),
            "profile-search" => Some(SourceKind::ProfileSearch),
            "crawl" => Some(SourceKind::Crawl),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a user-opportunity match, used as a tie-break priority when
/// repeated matching passes touch the same (user, opportunity) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    DailyAutomated,
    UserSearch,
    Manual,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::DailyAutomated => "daily-automated",
            MatchKind::UserSearch => "user-search",
            MatchKind::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily-automated" => Some(MatchKind::DailyAutomated),
            "user-search" => Some(MatchKind::UserSearch),
            "manual" => Some(MatchKind::Manual),
            _ => None,
        }
    }

    /// Merge priority: user-search > daily-automated > manual.
    pub fn priority(&self) -> u8 {
        match self {
            MatchKind::UserSearch => 2,
            MatchKind::DailyAutomated => 1,
            MatchKind::Manual => 0,
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Education levels ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    HighSchool,
    Undergraduate,
    Masters,
    Phd,
}

impl EducationLevel {
    /// Parse a loosely formatted level string ("Master's", "PhD", "high school").
    pub fn parse(raw: &str) -> Option<Self> {
        let norm: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match norm.as_str() {
            "highschool" | "secondary" => Some(EducationLevel::HighSchool),
            "undergraduate" | "bachelors" | "bachelor" | "college" => {
                Some(EducationLevel::Undergraduate)
            }
            "masters" | "master" | "graduate" | "postgraduate" => Some(EducationLevel::Masters),
            "phd" | "doctorate" | "doctoral" => Some(EducationLevel::Phd),
            _ => None,
        }
    }

    /// The token looked for in requirement text by the keyword scorer.
    pub fn token(&self) -> &'static str {
        match self {
            EducationLevel::HighSchool => "high school",
            EducationLevel::Undergraduate => "undergraduate",
            EducationLevel::Masters => "masters",
            EducationLevel::Phd => "phd",
        }
    }

    /// OR-joined synonym group used when building search queries. High school
    /// students are searching for undergraduate funding, so that level maps to
    /// the undergraduate group for search purposes only.
    pub fn search_synonyms(&self) -> &'static str {
        match self {
            EducationLevel::HighSchool | EducationLevel::Undergraduate => {
                "undergraduate OR bachelors OR college"
            }
            EducationLevel::Masters => "masters OR graduate OR postgraduate",
            EducationLevel::Phd => "phd OR doctoral OR doctorate",
        }
    }
}

// --- Discovery jobs ---

/// Lifecycle record of one search-and-extract run. Owned and mutated only by
/// the run that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub user_id: Option<Uuid>,
    pub query: String,
    pub status: JobStatus,
    pub result_count: i32,
    pub error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Opportunities ---

/// What the structured-extraction capability returns per URL. All fields are
/// optional at the wire level; missing required fields are recovered by
/// defaulting before persistence, never by dropping the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OpportunityDraft {
    /// Name of the scholarship, grant, or fellowship.
    pub title: Option<String>,
    /// Organization offering the award.
    pub provider: Option<String>,
    /// What the opportunity is and who it is for.
    pub description: Option<String>,
    /// Application deadline as printed on the page.
    pub deadline: Option<String>,
    /// Award amount as printed (e.g. "$5,000", "full tuition").
    pub award_amount: Option<String>,
    /// Eligibility requirements.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Documents the applicant must submit.
    #[serde(default)]
    pub required_documents: Vec<String>,
    /// Essay prompts, if any.
    #[serde(default)]
    pub essay_prompts: Vec<String>,
    /// Contact email or phone for questions.
    pub contact_info: Option<String>,
    /// Geographic region or nationality restriction.
    pub region: Option<String>,
    /// Page the applicant applies from. Defaulted to the submitted URL when
    /// the extractor does not echo it back.
    pub application_url: Option<String>,
}

/// A fully defaulted, capped opportunity ready for insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOpportunity {
    pub title: String,
    pub provider: String,
    pub description: String,
    pub deadline: String,
    pub award_amount: Option<String>,
    pub requirements: Vec<String>,
    pub required_documents: Vec<String>,
    pub essay_prompts: Vec<String>,
    pub contact_info: Option<String>,
    pub region: Option<String>,
    pub image_url: Option<String>,
    pub application_url: String,
    pub tags: Vec<String>,
    pub source: SourceKind,
}

impl NewOpportunity {
    /// Apply the field caps: description truncated to char boundary, lists
    /// capped. Idempotent.
    pub fn apply_caps(&mut self) {
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            self.description = self.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        }
        self.requirements.truncate(MAX_LIST_ITEMS);
        self.required_documents.truncate(MAX_LIST_ITEMS);
        self.essay_prompts.truncate(MAX_ESSAY_PROMPTS);
    }

    /// Canonical text blob the embedding is computed from. Stored alongside
    /// the vector for reproducibility.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            self.title.clone(),
            self.provider.clone(),
            self.description.clone(),
        ];
        if !self.requirements.is_empty() {
            parts.push(self.requirements.join(". "));
        }
        if let Some(region) = &self.region {
            parts.push(region.clone());
        }
        parts.join(" ")
    }
}

/// A persisted funding/award listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub title: String,
    pub provider: String,
    pub description: String,
    pub deadline: String,
    pub award_amount: Option<String>,
    pub requirements: Vec<String>,
    pub required_documents: Vec<String>,
    pub essay_prompts: Vec<String>,
    pub contact_info: Option<String>,
    pub region: Option<String>,
    pub image_url: Option<String>,
    pub application_url: String,
    pub tags: Vec<String>,
    pub source: SourceKind,
    pub embedding: Option<Vec<f32>>,
    pub embedding_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Advisory dedup key: lowercase(title) + "-" + lowercase(provider). Not a
/// uniqueness constraint — used by the explicit dedup utility.
pub fn dedup_key(title: &str, provider: &str) -> String {
    format!(
        "{}-{}",
        title.trim().to_lowercase(),
        provider.trim().to_lowercase()
    )
}

// --- User profiles and matches ---

/// The slice of a user profile the matcher needs. Profile CRUD lives outside
/// this pipeline; this type is the read contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub education_level: Option<EducationLevel>,
    pub intended_education_level: Option<EducationLevel>,
    /// Deprecated free-text level field still present on older profiles.
    pub legacy_education_level: Option<String>,
    pub discipline: Option<String>,
    pub academic_interests: Vec<String>,
    pub nationality: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// One live row per (user, opportunity), written by the hybrid scorer under
/// the merge-priority rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityMatch {
    pub user_id: Uuid,
    pub opportunity_id: Uuid,
    pub score: f64,
    pub kind: MatchKind,
    pub reasoning: String,
    pub eligibility_factors: Vec<String>,
    pub matched_at: DateTime<Utc>,
}

// --- Extraction response shape policy ---

/// The extraction capability sometimes collapses a multi-URL batch into one
/// merged object instead of an array. How to read that shape is a policy, not
/// a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergedObjectPolicy {
    /// Treat a bare object as exactly one extracted item (historical behavior).
    SingleItem,
    /// Treat a bare object as unparseable and fall back to per-URL extraction.
    Reject,
}

impl Default for MergedObjectPolicy {
    fn default() -> Self {
        MergedObjectPolicy::SingleItem
    }
}
