pub mod hybrid;
pub mod keyword;
pub mod persist;
pub mod similarity;

pub use hybrid::{combine, HybridMatcher, HybridScore, OpportunityIndex};
pub use keyword::{keyword_matches, keyword_score, KeywordMatch};
pub use persist::{
    should_overwrite, LegacyTagWriter, MatchStore, MatchWriteStats, MatchWriter,
    MatchWriterRouter, PerUserMatchWriter, ScoredMatch,
};
pub use similarity::{cosine_similarity, SimilarityError};
