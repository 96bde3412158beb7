use std::time::Duration;

use chrono::Utc;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedAssembler;
use crate::models::{Activity, FetchState, FetchStatePatch, TrackedUser};
use crate::source::ContentSource;

use super::throttle::{FixedDelay, Throttle};

/// Page size for both followee listing and per-user activity fetches.
const PAGE_SIZE: u32 = 20;

/// Safety cap on the number of followees collected in one sync.
const MAX_SYNC_USERS: usize = 2000;

const PAGE_DELAY: Duration = Duration::from_millis(500);
const USER_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub synced: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Users successfully fetched this cycle.
    pub processed: usize,
    /// Content items observed this cycle.
    pub new_content: usize,
    /// Zero-based index of the batch that ran.
    pub batch_index: u32,
    pub total_batches: u32,
}

impl BatchOutcome {
    fn empty() -> Self {
        Self {
            processed: 0,
            new_content: 0,
            batch_index: 0,
            total_batches: 0,
        }
    }
}

/// Pure cursor arithmetic for one cycle. Batch layout is recomputed from
/// the live user count, and the modulo folds a stale cursor back into
/// range after the tracked set shrank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchPlan {
    batch_index: u32,
    total_batches: u32,
    offset: u32,
}

impl BatchPlan {
    fn compute(state: &FetchState, user_count: u32, batch_size: u32) -> Option<Self> {
        if user_count == 0 {
            return None;
        }
        let total_batches = user_count.div_ceil(batch_size);
        let batch_index = state.current_batch % total_batches;
        Some(Self {
            batch_index,
            total_batches,
            offset: batch_index * batch_size,
        })
    }

    /// Cursor patch for the next cycle. Wrapping to zero means a complete
    /// pass over all tracked users, independent of wall-clock cadence.
    fn advance(&self, state: &FetchState, attempted: usize, now: i64) -> FetchStatePatch {
        let next_batch = (self.batch_index + 1) % self.total_batches;
        FetchStatePatch {
            current_batch: Some(next_batch),
            total_batches: Some(self.total_batches),
            last_full_sync: (next_batch == 0).then_some(now),
            users_synced: Some(state.users_synced + attempted as u64),
        }
    }
}

/// The incremental batch fetch state machine.
///
/// Each invocation selects one batch of due users from the live tracked
/// set, pulls their recent activity strictly sequentially, drives the
/// filter/score/assemble pipeline, and advances the persisted cursor. All
/// mutations are idempotent upserts, so an interrupted or repeated run
/// converges rather than corrupting state.
pub struct FetchScheduler<S> {
    source: S,
    repo: Repository,
    batch_size: u32,
    throttle: Box<dyn Throttle>,
}

impl<S: ContentSource> FetchScheduler<S> {
    pub fn new(source: S, repo: Repository, batch_size: u32) -> Self {
        Self {
            source,
            repo,
            // A zero batch size would make every cycle a no-op divide.
            batch_size: batch_size.max(1),
            throttle: Box::new(FixedDelay),
        }
    }

    pub fn with_throttle(mut self, throttle: Box<dyn Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Full reconciliation of the tracked-user set: page through the
    /// followee listing and bulk-upsert the result. A mid-sync fetch error
    /// aborts the whole sync; nothing is written in that case.
    pub async fn sync_followees(&self, root_handle: &str) -> Result<SyncOutcome> {
        tracing::info!("Starting followee sync for {root_handle}");

        let mut users: Vec<TrackedUser> = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self
                .source
                .followees(root_handle, offset, PAGE_SIZE)
                .await?;
            let is_end = page.is_end;
            users.extend(page.users);

            if is_end {
                break;
            }
            if users.len() >= MAX_SYNC_USERS {
                tracing::info!("Reached followee sync cap ({MAX_SYNC_USERS})");
                break;
            }

            offset += PAGE_SIZE;
            self.throttle.pause(PAGE_DELAY).await;
        }

        let synced = users.len();
        self.repo.upsert_users(users).await?;

        tracing::info!("Synced {synced} followees");
        Ok(SyncOutcome { synced })
    }

    /// Run one scheduling cycle: select the due batch, fetch and process
    /// each user sequentially, then advance and persist the cursor.
    ///
    /// Per-user upstream errors are logged and skipped; the user's
    /// `last_fetched_at` stays put, so the fairness ordering resurfaces
    /// them at the front of a future cycle. Auth and state-store errors
    /// are fatal for the cycle.
    pub async fn fetch_batch(&self) -> Result<BatchOutcome> {
        let state = self.repo.read_fetch_state().await?;
        let user_count = self.repo.user_count().await?;

        let Some(plan) = BatchPlan::compute(&state, user_count, self.batch_size) else {
            tracing::info!("No tracked users; nothing to fetch");
            return Ok(BatchOutcome::empty());
        };

        tracing::info!(
            "Processing batch {}/{}",
            plan.batch_index + 1,
            plan.total_batches
        );

        let users = self
            .repo
            .users_due_for_fetch(self.batch_size, plan.offset)
            .await?;
        let rules = self.repo.enabled_filter_rules().await?;
        let assembler = FeedAssembler::new(&rules);

        let mut processed = 0usize;
        let mut new_content = 0usize;

        for user in &users {
            let now = Utc::now();
            match self.fetch_user(user, &assembler, now).await {
                Ok(count) => {
                    new_content += count;
                    processed += 1;
                    self.repo.mark_user_fetched(&user.id, now.timestamp()).await?;
                }
                Err(err @ AppError::Auth(_)) => return Err(err),
                Err(err) if err.is_persistence() => return Err(err),
                Err(err) => {
                    tracing::warn!("Failed to fetch activity for {}: {}", user.name, err);
                }
            }

            self.throttle.pause(USER_DELAY).await;
        }

        let patch = plan.advance(&state, users.len(), Utc::now().timestamp());
        self.repo.write_fetch_state(patch).await?;

        tracing::info!(
            "Batch complete: {} users processed, {} contents",
            processed,
            new_content
        );

        Ok(BatchOutcome {
            processed,
            new_content,
            batch_index: plan.batch_index,
            total_batches: plan.total_batches,
        })
    }

    /// Fetch one page of a user's recent activity, persist the edges and
    /// contents, and run the assembly pipeline over them.
    async fn fetch_user(
        &self,
        user: &TrackedUser,
        assembler: &FeedAssembler,
        now: chrono::DateTime<Utc>,
    ) -> Result<usize> {
        let records = self.source.recent_activity(&user.handle, PAGE_SIZE).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let contents: Vec<_> = records.iter().map(|r| r.content.clone()).collect();
        self.repo.upsert_contents(contents.clone()).await?;

        for record in &records {
            self.repo
                .upsert_activity(Activity {
                    user_id: user.id.clone(),
                    content_id: record.content.id.clone(),
                    action_kind: record.action_kind,
                    action_time: record.action_time,
                })
                .await?;
        }

        assembler.assemble(&self.repo, &contents, now).await?;
        Ok(contents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, Content, ContentKind};
    use crate::source::{ActivityRecord, FolloweePage};
    use crate::sync::NoThrottle;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockSource {
        users: Vec<TrackedUser>,
        activity: HashMap<String, Vec<ActivityRecord>>,
        failing_handles: HashSet<String>,
        auth_rejected: bool,
        fetched_handles: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                users: Vec::new(),
                activity: HashMap::new(),
                failing_handles: HashSet::new(),
                auth_rejected: false,
                fetched_handles: Mutex::new(Vec::new()),
            }
        }

        fn with_users(mut self, count: usize) -> Self {
            self.users = (0..count).map(|i| user(&format!("u{i:04}"))).collect();
            self
        }
    }

    #[async_trait]
    impl ContentSource for MockSource {
        async fn followees(
            &self,
            _root_handle: &str,
            offset: u32,
            limit: u32,
        ) -> Result<FolloweePage> {
            if self.auth_rejected {
                return Err(AppError::Auth("HTTP 401".to_string()));
            }
            let start = (offset as usize).min(self.users.len());
            let end = (start + limit as usize).min(self.users.len());
            Ok(FolloweePage {
                users: self.users[start..end].to_vec(),
                is_end: end == self.users.len(),
            })
        }

        async fn recent_activity(
            &self,
            handle: &str,
            _limit: u32,
        ) -> Result<Vec<ActivityRecord>> {
            self.fetched_handles
                .lock()
                .unwrap()
                .push(handle.to_string());
            if self.failing_handles.contains(handle) {
                return Err(AppError::Upstream("HTTP 503".to_string()));
            }
            Ok(self.activity.get(handle).cloned().unwrap_or_default())
        }
    }

    fn user(id: &str) -> TrackedUser {
        TrackedUser {
            id: id.to_string(),
            handle: format!("handle-{id}"),
            name: format!("name-{id}"),
            headline: None,
            avatar_url: None,
            last_fetched_at: None,
        }
    }

    fn record(content_id: &str, action_kind: ActionKind) -> ActivityRecord {
        ActivityRecord {
            content: Content {
                id: content_id.to_string(),
                kind: ContentKind::Article,
                title: format!("title {content_id}"),
                excerpt: "excerpt".to_string(),
                body: String::new(),
                url: format!("https://example.com/{content_id}"),
                author_id: "a1".to_string(),
                author_name: "Ada".to_string(),
                word_count: 1000,
                voteup_count: 10,
                comment_count: 0,
                created_time: Utc::now().timestamp(),
                updated_time: Utc::now().timestamp(),
            },
            action_kind,
            action_time: Utc::now().timestamp(),
        }
    }

    async fn test_repo() -> (Repository, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        (repo, dir)
    }

    fn scheduler(source: MockSource, repo: Repository, batch_size: u32) -> FetchScheduler<MockSource> {
        FetchScheduler::new(source, repo, batch_size).with_throttle(Box::new(NoThrottle))
    }

    #[test]
    fn plan_is_none_for_zero_users() {
        assert_eq!(BatchPlan::compute(&FetchState::default(), 0, 50), None);
    }

    #[test]
    fn plan_folds_any_stored_cursor_into_range() {
        for stored in [0, 1, 2, 3, 7, 1000] {
            let state = FetchState {
                current_batch: stored,
                ..Default::default()
            };
            let plan = BatchPlan::compute(&state, 5, 2).unwrap();
            assert_eq!(plan.total_batches, 3);
            assert!(plan.batch_index < plan.total_batches);
            assert_eq!(plan.offset, plan.batch_index * 2);
        }
    }

    #[test]
    fn plan_advance_wraps_and_stamps_full_pass() {
        let state = FetchState {
            current_batch: 2,
            users_synced: 10,
            ..Default::default()
        };
        let plan = BatchPlan::compute(&state, 5, 2).unwrap();
        assert_eq!(plan.batch_index, 2);

        let patch = plan.advance(&state, 1, 777);
        assert_eq!(patch.current_batch, Some(0));
        assert_eq!(patch.total_batches, Some(3));
        assert_eq!(patch.last_full_sync, Some(777));
        assert_eq!(patch.users_synced, Some(11));

        // A non-wrapping advance leaves the full-pass stamp alone.
        let mid = FetchState::default();
        let plan = BatchPlan::compute(&mid, 5, 2).unwrap();
        let patch = plan.advance(&mid, 2, 777);
        assert_eq!(patch.current_batch, Some(1));
        assert_eq!(patch.last_full_sync, None);
    }

    #[tokio::test]
    async fn zero_users_is_a_no_op() {
        let (repo, _dir) = test_repo().await;
        let sched = scheduler(MockSource::new(), repo.clone(), 10);

        let outcome = sched.fetch_batch().await.unwrap();
        assert_eq!(outcome, BatchOutcome::empty());
        // The cursor is untouched.
        assert_eq!(repo.read_fetch_state().await.unwrap().total_batches, 0);
    }

    #[tokio::test]
    async fn first_batch_fetches_lowest_ids_and_moves_them_back() {
        let (repo, _dir) = test_repo().await;
        let users: Vec<TrackedUser> = (0..5).map(|i| user(&format!("u{i}"))).collect();
        repo.upsert_users(users).await.unwrap();

        let sched = scheduler(MockSource::new(), repo.clone(), 2);
        let outcome = sched.fetch_batch().await.unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.batch_index, 0);
        assert_eq!(outcome.total_batches, 3);

        // Exactly the first two by id gained a timestamp.
        let due = repo.users_due_for_fetch(10, 0).await.unwrap();
        let fetched: Vec<&str> = due
            .iter()
            .filter(|u| u.last_fetched_at.is_some())
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(fetched, vec!["u0", "u1"]);

        // And they now sort behind the never-fetched users.
        let ids: Vec<&str> = due.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(&ids[..3], &["u2", "u3", "u4"]);

        let state = repo.read_fetch_state().await.unwrap();
        assert_eq!(state.current_batch, 1);
        assert_eq!(state.total_batches, 3);
        assert_eq!(state.users_synced, 2);
        assert_eq!(state.last_full_sync, 0);
    }

    #[tokio::test]
    async fn cursor_stays_in_bounds_across_cycles() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users((0..5).map(|i| user(&format!("u{i}"))).collect())
            .await
            .unwrap();

        let sched = scheduler(MockSource::new(), repo.clone(), 2);
        for _ in 0..7 {
            sched.fetch_batch().await.unwrap();
            let state = repo.read_fetch_state().await.unwrap();
            assert!(state.current_batch < state.total_batches);
        }
    }

    #[tokio::test]
    async fn stale_cursor_is_folded_back_into_range() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users((0..3).map(|i| user(&format!("u{i}"))).collect())
            .await
            .unwrap();
        // Cursor left over from when the tracked set was much larger.
        repo.write_fetch_state(FetchStatePatch {
            current_batch: Some(7),
            total_batches: Some(9),
            ..Default::default()
        })
        .await
        .unwrap();

        let sched = scheduler(MockSource::new(), repo.clone(), 2);
        let outcome = sched.fetch_batch().await.unwrap();

        // 7 mod 2 = 1: the second (and last) batch of the shrunken set.
        assert_eq!(outcome.batch_index, 1);
        assert_eq!(outcome.total_batches, 2);
        assert_eq!(outcome.processed, 1);

        // Wrapping to zero marks a completed pass.
        let state = repo.read_fetch_state().await.unwrap();
        assert_eq!(state.current_batch, 0);
        assert!(state.last_full_sync > 0);
    }

    #[tokio::test]
    async fn failed_user_is_skipped_and_resurfaces_first() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users((0..2).map(|i| user(&format!("u{i}"))).collect())
            .await
            .unwrap();

        let mut source = MockSource::new();
        source.failing_handles.insert("handle-u0".to_string());
        let sched = scheduler(source, repo.clone(), 2);

        let outcome = sched.fetch_batch().await.unwrap();
        assert_eq!(outcome.processed, 1);

        let due = repo.users_due_for_fetch(10, 0).await.unwrap();
        // The failed user kept its null timestamp and is due first again.
        assert_eq!(due[0].id, "u0");
        assert_eq!(due[0].last_fetched_at, None);
        assert!(due[1].last_fetched_at.is_some());

        // The cursor still advanced; the batch never aborts on user errors.
        assert_eq!(repo.read_fetch_state().await.unwrap().current_batch, 0);
    }

    #[tokio::test]
    async fn every_user_failing_still_returns_a_summary() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users((0..2).map(|i| user(&format!("u{i}"))).collect())
            .await
            .unwrap();

        let mut source = MockSource::new();
        source.failing_handles.insert("handle-u0".to_string());
        source.failing_handles.insert("handle-u1".to_string());
        let sched = scheduler(source, repo.clone(), 2);

        let outcome = sched.fetch_batch().await.unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.new_content, 0);
        assert_eq!(outcome.total_batches, 1);
    }

    #[tokio::test]
    async fn fetched_activity_flows_into_the_feed() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users(vec![user("u0")]).await.unwrap();

        let mut source = MockSource::new();
        source.activity.insert(
            "handle-u0".to_string(),
            vec![
                record("c1", ActionKind::Create),
                record("c2", ActionKind::Like),
            ],
        );
        let sched = scheduler(source, repo.clone(), 10);

        let outcome = sched.fetch_batch().await.unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.new_content, 2);

        assert_eq!(repo.content_count().await.unwrap(), 2);
        let items = repo.feed_items(10, true).await.unwrap();
        assert_eq!(items.len(), 2);
        // The created item outscores the liked one (1.5x vs 1.0x bonus).
        let by_id = |id: &str| items.iter().find(|i| i.content_id == id).unwrap().score;
        assert!(by_id("c1") > by_id("c2"));
    }

    #[tokio::test]
    async fn repeated_cycles_converge_without_duplicates() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users(vec![user("u0")]).await.unwrap();

        let mut source = MockSource::new();
        source
            .activity
            .insert("handle-u0".to_string(), vec![record("c1", ActionKind::Create)]);
        let sched = scheduler(source, repo.clone(), 10);

        sched.fetch_batch().await.unwrap();
        sched.fetch_batch().await.unwrap();

        assert_eq!(repo.content_count().await.unwrap(), 1);
        assert_eq!(repo.feed_items(10, true).await.unwrap().len(), 1);

        let state = repo.read_fetch_state().await.unwrap();
        assert_eq!(state.users_synced, 2);
    }

    #[tokio::test]
    async fn users_are_fetched_sequentially_in_due_order() {
        let (repo, _dir) = test_repo().await;
        repo.upsert_users((0..3).map(|i| user(&format!("u{i}"))).collect())
            .await
            .unwrap();

        let sched = scheduler(MockSource::new(), repo.clone(), 3);
        sched.fetch_batch().await.unwrap();

        let handles = sched.source.fetched_handles.lock().unwrap().clone();
        assert_eq!(handles, vec!["handle-u0", "handle-u1", "handle-u2"]);
    }

    #[tokio::test]
    async fn sync_collects_all_pages() {
        let (repo, _dir) = test_repo().await;
        let sched = scheduler(MockSource::new().with_users(45), repo.clone(), 10);

        let outcome = sched.sync_followees("root").await.unwrap();
        assert_eq!(outcome.synced, 45);
        assert_eq!(repo.user_count().await.unwrap(), 45);
    }

    #[tokio::test]
    async fn sync_stops_at_the_safety_cap() {
        let (repo, _dir) = test_repo().await;
        let sched = scheduler(MockSource::new().with_users(2010), repo.clone(), 10);

        let outcome = sched.sync_followees("root").await.unwrap();
        assert_eq!(outcome.synced, 2000);
        assert_eq!(repo.user_count().await.unwrap(), 2000);
    }

    #[tokio::test]
    async fn sync_auth_failure_propagates_and_writes_nothing() {
        let (repo, _dir) = test_repo().await;
        let mut source = MockSource::new().with_users(5);
        source.auth_rejected = true;
        let sched = scheduler(source, repo.clone(), 10);

        let err = sched.sync_followees("root").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert_eq!(repo.user_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resync_does_not_reset_fetch_fairness() {
        let (repo, _dir) = test_repo().await;
        let source = MockSource::new().with_users(3);
        let sched = scheduler(source, repo.clone(), 10);

        sched.sync_followees("root").await.unwrap();
        sched.fetch_batch().await.unwrap();
        sched.sync_followees("root").await.unwrap();

        let due = repo.users_due_for_fetch(10, 0).await.unwrap();
        assert!(due.iter().all(|u| u.last_fetched_at.is_some()));
    }
}
