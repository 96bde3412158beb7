mod assembler;
mod filter;
mod score;

pub use assembler::FeedAssembler;
pub use filter::{default_rules, ContentFilter, FilterOutcome};
pub use score::{ScoreCalculator, ScoreFactors};
