//! Search-string construction from a user profile or free text.
//!
//! Deterministic given the same input; no side effects. Education levels
//! expand to OR-joined synonym groups, interests are capped at three, and a
//! site-scoping suffix keeps commercial listing farms out of the results.

use fundscout_common::{EducationLevel, UserProfile};

/// Domain filters appended to every query to cut noise.
const SITE_FILTERS: &str = "(site:.edu OR site:.org OR site:.gov)";

/// Base funding terms every query carries.
const FUNDING_TERMS: &str = "scholarship OR grant OR fellowship";

/// How many academic interests make it into the query.
const MAX_INTEREST_TERMS: usize = 3;

/// Build the search string for a profile-scoped discovery run.
pub fn profile_query(profile: &UserProfile) -> String {
    let mut parts = vec![format!("({FUNDING_TERMS})")];

    // Education synonym groups. When current and intended levels both exist
    // and differ, both groups are searched; high school maps to the
    // undergraduate group inside search_synonyms().
    let mut groups: Vec<&'static str> = Vec::new();
    if let Some(level) = profile.intended_education_level {
        groups.push(level.search_synonyms());
    }
    if let Some(level) = profile.education_level {
        let synonyms = level.search_synonyms();
        if !groups.contains(&synonyms) {
            groups.push(synonyms);
        }
    }
    for group in groups {
        parts.push(format!("({group})"));
    }

    let interests: Vec<&str> = profile
        .academic_interests
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(MAX_INTEREST_TERMS)
        .collect();
    if !interests.is_empty() {
        parts.push(format!("({})", interests.join(" OR ")));
    }

    if let Some(discipline) = profile.discipline.as_deref().map(str::trim) {
        if !discipline.is_empty() {
            parts.push(discipline.to_string());
        }
    }
    if let Some(nationality) = profile.nationality.as_deref().map(str::trim) {
        if !nationality.is_empty() {
            parts.push(nationality.to_string());
        }
    }

    parts.push(SITE_FILTERS.to_string());
    parts.join(" ")
}

/// Build the search string for a free-text (general) discovery run.
pub fn freetext_query(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return format!("({FUNDING_TERMS}) {SITE_FILTERS}");
    }
    format!("{trimmed} ({FUNDING_TERMS}) {SITE_FILTERS}")
}
