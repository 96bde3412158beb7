use chrono::{DateTime, Utc};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Content, FilterRule};

use super::{ContentFilter, ScoreCalculator};

/// Turns filter and score outcomes into ranked feed rows, one per content
/// item. Reprocessing overwrites the row, so repeated observation of the
/// same content converges instead of accumulating history.
pub struct FeedAssembler {
    filter: ContentFilter,
    scorer: ScoreCalculator,
}

impl FeedAssembler {
    pub fn new(rules: &[FilterRule]) -> Self {
        Self {
            filter: ContentFilter::new(rules),
            scorer: ScoreCalculator::new(),
        }
    }

    /// Filter and score each content against all of its recorded sources
    /// (which may span tracked users observed in earlier cycles) and upsert
    /// the resulting feed rows.
    pub async fn assemble(
        &self,
        repo: &Repository,
        contents: &[Content],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let content_ids = contents.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
        let sources_map = repo.sources_for(content_ids).await?;

        for content in contents {
            let outcome = self.filter.evaluate(content);
            let sources = sources_map
                .get(&content.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let score = self.scorer.score(content, sources, now);

            repo.upsert_feed_item(&content.id, score, !outcome.passed, outcome.reason)
                .await?;
        }
        Ok(())
    }
}
