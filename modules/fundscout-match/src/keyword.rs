//! Rule-based keyword scoring of opportunities against a user profile.
//!
//! Additive points, all matching case-insensitively on substrings:
//! - education level in requirements: +35 intended, else +25 current, else
//!   +20 legacy free-text level (first match wins, counted once)
//! - discipline mentioned in requirements: +20
//! - each academic interest found in the description: +10
//! - nationality token in the region string: +15

use uuid::Uuid;

use fundscout_common::{Opportunity, UserProfile};

const INTENDED_LEVEL_POINTS: f64 = 35.0;
const CURRENT_LEVEL_POINTS: f64 = 25.0;
const LEGACY_LEVEL_POINTS: f64 = 20.0;
const DISCIPLINE_POINTS: f64 = 20.0;
const INTEREST_POINTS: f64 = 10.0;
const NATIONALITY_POINTS: f64 = 15.0;

#[derive(Debug, Clone)]
pub struct KeywordMatch {
    pub opportunity_id: Uuid,
    pub score: f64,
    /// Human-readable reasons, persisted as eligibility factors.
    pub factors: Vec<String>,
}

/// Score a single opportunity. Returns (score, factors); a score of 0 means
/// no keyword evidence at all.
pub fn keyword_score(profile: &UserProfile, opp: &Opportunity) -> (f64, Vec<String>) {
    let requirements_text = opp.requirements.join(" ").to_lowercase();
    let description = opp.description.to_lowercase();
    let region = opp.region.as_deref().unwrap_or("").to_lowercase();

    let mut score = 0.0;
    let mut factors = Vec::new();

    // Education: intended level outranks current, which outranks the legacy
    // free-text field. One bucket only.
    if let Some((points, factor)) = education_points(profile, &requirements_text) {
        score += points;
        factors.push(factor);
    }

    if let Some(discipline) = non_empty(profile.discipline.as_deref()) {
        if requirements_text.contains(&discipline.to_lowercase()) {
            score += DISCIPLINE_POINTS;
            factors.push(format!("Requirements mention {discipline}"));
        }
    }

    for interest in &profile.academic_interests {
        let interest = interest.trim();
        if !interest.is_empty() && description.contains(&interest.to_lowercase()) {
            score += INTEREST_POINTS;
            factors.push(format!("Matches interest in {interest}"));
        }
    }

    if let Some(nationality) = non_empty(profile.nationality.as_deref()) {
        if region.contains(&nationality.to_lowercase()) {
            score += NATIONALITY_POINTS;
            factors.push(format!("Open to applicants from {nationality}"));
        }
    }

    (score, factors)
}

/// Score a batch of opportunities. Only positive scores are returned, sorted
/// descending.
pub fn keyword_matches(profile: &UserProfile, opportunities: &[Opportunity]) -> Vec<KeywordMatch> {
    let mut matches: Vec<KeywordMatch> = opportunities
        .iter()
        .filter_map(|opp| {
            let (score, factors) = keyword_score(profile, opp);
            (score > 0.0).then(|| KeywordMatch {
                opportunity_id: opp.id,
                score,
                factors,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

fn education_points(profile: &UserProfile, requirements_text: &str) -> Option<(f64, String)> {
    if let Some(level) = profile.intended_education_level {
        if requirements_text.contains(level.token()) {
            return Some((
                INTENDED_LEVEL_POINTS,
                format!("Targets your intended {} studies", level.token()),
            ));
        }
    }
    if let Some(level) = profile.education_level {
        if requirements_text.contains(level.token()) {
            return Some((
                CURRENT_LEVEL_POINTS,
                format!("Open to current {} students", level.token()),
            ));
        }
    }
    if let Some(legacy) = non_empty(profile.legacy_education_level.as_deref()) {
        if requirements_text.contains(&legacy.to_lowercase()) {
            return Some((LEGACY_LEVEL_POINTS, format!("Matches education level {legacy}")));
        }
    }
    None
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
