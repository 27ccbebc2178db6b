// src/pipeline/session.rs

//! One job's walk through the paginated item stream.
//!
//! The source emits items roughly newest first. Items newer than the window
//! are skipped, items inside it are persisted, and the walk stops once more
//! than `tolerance` stale items arrive in a row. The resume cursor is saved at
//! every page boundary before anything from the next page is written, so a
//! crash replays at most one page.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{HarvestConfig, Placement, Window};
use crate::pipeline::{BackoffController, RateLimiter};
use crate::source::{ContentSource, FetchOutcome, Page};
use crate::storage::{CheckpointStore, ItemSink};

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub fetches: usize,
    pub pages: usize,
    pub persisted: usize,
    pub skipped_new: usize,
    pub stale: usize,
    pub blocks: usize,
    pub unexpected: usize,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Too many consecutive stale items: the back edge of the window.
    WindowExhausted,
    /// The source has no further pages.
    EndOfStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed {
        completion: Completion,
        report: SessionReport,
    },
    /// The target is gone; the job should be failed, not retried.
    NotFound {
        message: String,
        report: SessionReport,
    },
}

/// Mutable walk state, owned by a single session.
#[derive(Debug, Clone, Default)]
struct SessionState {
    /// Cursor of the page being fetched; `None` is the first page.
    cursor: Option<String>,
    consecutive_stale: usize,
    consecutive_unexpected: u32,
    report: SessionReport,
}

impl SessionState {
    fn resume(cursor: Option<String>) -> Self {
        Self {
            cursor,
            ..Self::default()
        }
    }
}

/// Shared collaborators a session borrows from its worker.
pub struct HarvestSession<'a> {
    job_key: &'a str,
    window: Window,
    settings: &'a HarvestConfig,
    source: &'a dyn ContentSource,
    limiter: &'a RateLimiter,
    backoff: &'a mut BackoffController,
    checkpoints: &'a dyn CheckpointStore,
    sink: &'a dyn ItemSink,
}

enum PageVerdict {
    Continue,
    WindowExhausted,
}

impl<'a> HarvestSession<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_key: &'a str,
        window: Window,
        settings: &'a HarvestConfig,
        source: &'a dyn ContentSource,
        limiter: &'a RateLimiter,
        backoff: &'a mut BackoffController,
        checkpoints: &'a dyn CheckpointStore,
        sink: &'a dyn ItemSink,
    ) -> Self {
        Self {
            job_key,
            window,
            settings,
            source,
            limiter,
            backoff,
            checkpoints,
            sink,
        }
    }

    /// Walk the stream from `resume_from` (or the start) to completion.
    ///
    /// On error the last known cursor is written to the checkpoint store
    /// before the error is returned.
    pub async fn run(mut self, resume_from: Option<String>) -> Result<SessionOutcome> {
        let mut state = SessionState::resume(resume_from);
        match self.drive(&mut state).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.flush_checkpoint(&state).await;
                Err(error)
            }
        }
    }

    async fn drive(&mut self, state: &mut SessionState) -> Result<SessionOutcome> {
        loop {
            self.limiter.acquire().await;
            let outcome = self
                .source
                .fetch_page(self.job_key, state.cursor.as_deref())
                .await?;
            state.report.fetches += 1;

            let page = match outcome {
                FetchOutcome::Page(page) => page,
                FetchOutcome::NotFound(message) => {
                    log::error!("{} not found: {}", self.job_key, message);
                    return Ok(SessionOutcome::NotFound {
                        message,
                        report: state.report.clone(),
                    });
                }
                FetchOutcome::TemporarilyBlocked(message) => {
                    state.report.blocks += 1;
                    log::warn!("Temporary ban while harvesting {}: {}", self.job_key, message);
                    self.backoff.on_blocked().await?;
                    continue;
                }
                FetchOutcome::UnexpectedResponse(message) => {
                    self.on_unexpected(state, message).await?;
                    continue;
                }
            };

            self.backoff.on_success();
            state.consecutive_unexpected = 0;
            state.report.pages += 1;

            let next_cursor = page.next_cursor.clone();
            if let PageVerdict::WindowExhausted = self.consume_page(state, page).await? {
                log::info!(
                    "{}: {} consecutive items before window start, stopping",
                    self.job_key,
                    state.consecutive_stale
                );
                return Ok(self.completed(Completion::WindowExhausted, state));
            }

            match next_cursor {
                Some(next) => {
                    // Must land before any item of the next page is written.
                    self.checkpoints.save(self.job_key, &next).await?;
                    state.cursor = Some(next);
                }
                None => return Ok(self.completed(Completion::EndOfStream, state)),
            }
        }
    }

    async fn consume_page(&mut self, state: &mut SessionState, page: Page) -> Result<PageVerdict> {
        let item_delay = Duration::from_millis(self.settings.item_delay_ms);

        for item in page.items {
            match self.window.place_item(&item) {
                Placement::TooNew => state.report.skipped_new += 1,
                Placement::Stale => {
                    state.report.stale += 1;
                    state.consecutive_stale += 1;
                    if state.consecutive_stale > self.settings.tolerance {
                        return Ok(PageVerdict::WindowExhausted);
                    }
                }
                Placement::Inside => {
                    state.consecutive_stale = 0;
                    self.sink.write(self.job_key, &item).await?;
                    state.report.persisted += 1;
                    if !item_delay.is_zero() {
                        tokio::time::sleep(item_delay).await;
                    }
                }
            }
        }
        Ok(PageVerdict::Continue)
    }

    async fn on_unexpected(&mut self, state: &mut SessionState, message: String) -> Result<()> {
        state.report.unexpected += 1;
        state.consecutive_unexpected += 1;
        if state.consecutive_unexpected > self.settings.max_unexpected_responses {
            return Err(AppError::unexpected(format!(
                "{} malformed responses in a row for {}, last: {}",
                state.consecutive_unexpected, self.job_key, message
            )));
        }

        log::warn!("Unexpected response for {}: {}. Retrying", self.job_key, message);
        let pause = Duration::from_millis(self.settings.unexpected_retry_ms);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    async fn flush_checkpoint(&self, state: &SessionState) {
        let Some(cursor) = &state.cursor else {
            return;
        };
        match self.checkpoints.save(self.job_key, cursor).await {
            Ok(()) => log::error!("Saved resume info for {} at {}", self.job_key, cursor),
            Err(e) => log::error!("Could not save resume info for {}: {}", self.job_key, e),
        }
    }

    fn completed(&self, completion: Completion, state: &SessionState) -> SessionOutcome {
        SessionOutcome::Completed {
            completion,
            report: state.report.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackoffConfig, CooldownConfig, Item};
    use crate::source::scripted::{Interruption, ScriptedSource, day, items, undated};
    use crate::storage::{LocalCheckpointStore, LocalItemSink};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        checkpoints: LocalCheckpointStore,
        sink: LocalItemSink,
        limiter: RateLimiter,
        backoff: BackoffController,
        settings: HarvestConfig,
        window: Window,
    }

    impl Fixture {
        fn new(tolerance: usize) -> Self {
            let tmp = TempDir::new().unwrap();
            Self {
                checkpoints: LocalCheckpointStore::new(tmp.path().join("resume")),
                sink: LocalItemSink::new(tmp.path().join("downloads")),
                _tmp: tmp,
                limiter: RateLimiter::new(1000, Duration::from_secs(900)),
                backoff: BackoffController::new(
                    BackoffConfig {
                        base_secs: 600,
                        factor: 2.0,
                        jitter_ratio: 0.0,
                        max_delay_secs: 3600,
                        max_total_wait_secs: 86_400,
                    },
                    CooldownConfig::disabled(),
                ),
                settings: HarvestConfig {
                    tolerance,
                    item_delay_ms: 0,
                    max_unexpected_responses: 2,
                    unexpected_retry_ms: 10,
                },
                window: Window::new(day(10), day(20)),
            }
        }

        async fn run(
            &mut self,
            source: &ScriptedSource,
            resume: Option<String>,
        ) -> Result<SessionOutcome> {
            HarvestSession::new(
                "group-1",
                self.window,
                &self.settings,
                source,
                &self.limiter,
                &mut self.backoff,
                &self.checkpoints,
                &self.sink,
            )
            .run(resume)
            .await
        }

        async fn stored(&self) -> usize {
            self.sink.count("group-1").await.unwrap()
        }

        async fn checkpoint(&self) -> Option<String> {
            self.checkpoints
                .load("group-1")
                .await
                .unwrap()
                .map(|c| c.cursor)
        }
    }

    fn report_of(outcome: &SessionOutcome) -> &SessionReport {
        match outcome {
            SessionOutcome::Completed { report, .. } | SessionOutcome::NotFound { report, .. } => {
                report
            }
        }
    }

    #[tokio::test]
    async fn test_twenty_inside_then_fifteen_stale() {
        let mut page = items("in", 20, day(15));
        page.extend(items("old", 15, day(5)));
        let source = ScriptedSource::new(vec![page]);
        let mut fx = Fixture::new(10);

        let outcome = fx.run(&source, None).await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Completed {
                completion: Completion::WindowExhausted,
                ..
            }
        ));
        assert_eq!(report_of(&outcome).persisted, 20);
        assert_eq!(report_of(&outcome).stale, 11);
        assert_eq!(fx.stored().await, 20);
    }

    #[tokio::test]
    async fn test_stops_exactly_when_tolerance_exceeded() {
        // 3 stale (tolerated), 1 inside resets, then 4 stale stops before "late".
        let mut page = items("old-a", 3, day(1));
        page.extend(items("in-a", 1, day(12)));
        page.extend(items("old-b", 4, day(2)));
        page.extend(items("late", 2, day(11)));
        let source = ScriptedSource::new(vec![page]);
        let mut fx = Fixture::new(3);

        let outcome = fx.run(&source, None).await.unwrap();
        let report = report_of(&outcome);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.stale, 7);
        assert_eq!(fx.stored().await, 1);
    }

    #[tokio::test]
    async fn test_too_new_items_are_skipped_without_counting_stale() {
        let page: Vec<Item> = [
            items("new", 30, day(25)),
            items("in", 2, day(15)),
            items("old", 2, day(1)),
        ]
        .concat();
        let source = ScriptedSource::new(vec![page]);
        let mut fx = Fixture::new(2);

        let outcome = fx.run(&source, None).await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Completed {
                completion: Completion::EndOfStream,
                ..
            }
        ));
        let report = report_of(&outcome);
        assert_eq!(report.skipped_new, 30);
        assert_eq!(report.persisted, 2);
    }

    #[tokio::test]
    async fn test_undated_item_is_kept_with_the_rest_of_its_page() {
        let mut first = items("in", 2, day(15));
        first.push(undated("no-time"));
        first.extend(items("old-a", 2, day(1)));
        first.push(undated("no-time-2"));
        let second = items("old-b", 3, day(2));
        let source = ScriptedSource::new(vec![first, second]);
        let mut fx = Fixture::new(2);

        let outcome = fx.run(&source, None).await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Completed {
                completion: Completion::WindowExhausted,
                ..
            }
        ));
        let report = report_of(&outcome);
        assert_eq!(report.persisted, 4);
        assert_eq!(report.unexpected, 0);
        assert_eq!(report.stale, 5);
        assert_eq!(fx.stored().await, 4);
    }

    #[tokio::test]
    async fn test_checkpoint_advances_on_every_page_boundary() {
        let pages = (0..3).map(|p| items(&format!("p{p}"), 2, day(15))).collect();
        let source = ScriptedSource::new(pages);
        let mut fx = Fixture::new(10);

        fx.run(&source, None).await.unwrap();
        assert_eq!(
            source.requested(),
            vec![
                None,
                Some(ScriptedSource::cursor(1)),
                Some(ScriptedSource::cursor(2))
            ]
        );
        // The last boundary saved was the move onto page 2.
        assert_eq!(fx.checkpoint().await, Some(ScriptedSource::cursor(2)));
        assert_eq!(fx.stored().await, 6);
    }

    #[tokio::test]
    async fn test_crash_after_boundary_resumes_without_loss_or_duplicates() {
        let pages: Vec<Vec<Item>> = (0..6)
            .map(|p| items(&format!("p{p}"), 5, day(15)))
            .collect();

        // Pages 1-3 succeed; fetching page 4 fails after its boundary was saved.
        let crashing = ScriptedSource::new(pages.clone()).interrupt(4, Interruption::Fail);
        let mut fx = Fixture::new(10);
        let err = fx.run(&crashing, None).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(fx.stored().await, 15);
        assert_eq!(fx.checkpoint().await, Some(ScriptedSource::cursor(3)));

        let resumed = ScriptedSource::new(pages);
        let resume_from = fx.checkpoint().await;
        fx.run(&resumed, resume_from).await.unwrap();

        assert_eq!(resumed.requested()[0], Some(ScriptedSource::cursor(3)));
        assert_eq!(resumed.requested().len(), 3);
        assert_eq!(fx.stored().await, 30);
    }

    #[tokio::test]
    async fn test_replaying_a_page_is_idempotent() {
        let pages: Vec<Vec<Item>> = (0..2).map(|p| items(&format!("p{p}"), 4, day(15))).collect();
        let mut fx = Fixture::new(10);

        fx.run(&ScriptedSource::new(pages.clone()), None).await.unwrap();
        let uninterrupted = fx.stored().await;

        // A resume from the last boundary refetches page 1 and rewrites it.
        fx.run(&ScriptedSource::new(pages), Some(ScriptedSource::cursor(1)))
            .await
            .unwrap();
        assert_eq!(fx.stored().await, uninterrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_on_fifth_fetch_retries_same_cursor() {
        let pages: Vec<Vec<Item>> = (0..6).map(|p| items(&format!("p{p}"), 3, day(15))).collect();
        let source = ScriptedSource::new(pages).interrupt(5, Interruption::Blocked);
        let mut fx = Fixture::new(10);

        let start = tokio::time::Instant::now();
        let outcome = fx.run(&source, None).await.unwrap();

        let requested = source.requested();
        assert_eq!(requested[4], Some(ScriptedSource::cursor(4)));
        assert_eq!(requested[5], Some(ScriptedSource::cursor(4)));
        assert_eq!(requested.len(), 7);
        assert!(start.elapsed() >= Duration::from_secs(600));

        let report = report_of(&outcome);
        assert_eq!(report.blocks, 1);
        assert_eq!(report.persisted, 18);
        assert_eq!(fx.stored().await, 18);
        assert_eq!(fx.backoff.state().consecutive_bans, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_responses_are_retried() {
        let pages = vec![items("a", 2, day(15)), items("b", 2, day(15))];
        let source = ScriptedSource::new(pages)
            .interrupt(2, Interruption::Unexpected)
            .interrupt(3, Interruption::Unexpected);
        let mut fx = Fixture::new(10);

        let outcome = fx.run(&source, None).await.unwrap();
        assert_eq!(report_of(&outcome).unexpected, 2);
        assert_eq!(fx.stored().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_unexpected_responses_flush_checkpoint() {
        let pages = vec![items("a", 2, day(15)), items("b", 2, day(15))];
        let source = ScriptedSource::new(pages)
            .interrupt(2, Interruption::Unexpected)
            .interrupt(3, Interruption::Unexpected)
            .interrupt(4, Interruption::Unexpected);
        let mut fx = Fixture::new(10);

        let err = fx.run(&source, None).await.unwrap_err();
        assert!(matches!(err, AppError::UnexpectedResponse { .. }));
        assert_eq!(fx.checkpoint().await, Some(ScriptedSource::cursor(1)));
    }

    #[tokio::test]
    async fn test_not_found_ends_session() {
        let source =
            ScriptedSource::new(vec![items("a", 2, day(15))]).interrupt(1, Interruption::NotFound);
        let mut fx = Fixture::new(10);

        let outcome = fx.run(&source, None).await.unwrap();
        assert!(matches!(outcome, SessionOutcome::NotFound { .. }));
        assert_eq!(fx.stored().await, 0);
    }

    #[tokio::test]
    async fn test_failure_on_first_page_saves_nothing() {
        let source =
            ScriptedSource::new(vec![items("a", 2, day(15))]).interrupt(1, Interruption::Fail);
        let mut fx = Fixture::new(10);

        assert!(fx.run(&source, None).await.is_err());
        assert_eq!(fx.checkpoint().await, None);
    }
}
