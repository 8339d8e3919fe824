//! Background warming of upcoming pages.

use crate::backend::PaginationBackend;
use crate::viewport::ViewportConfig;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Pages already requested under the current pagination.
///
/// Page numbers only mean something for one viewport, so every
/// repagination starts a new generation. Jobs from an older generation can
/// neither claim nor release pages.
#[derive(Debug, Default)]
pub(super) struct PrefetchSet {
    generation: u64,
    pages: HashSet<u32>,
}

impl PrefetchSet {
    /// Forget every page and start a new generation.
    pub(super) fn reset(&mut self) {
        self.generation += 1;
        self.pages.clear();
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation
    }

    /// Claimed pages, ascending.
    pub(super) fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.pages.iter().copied().collect();
        pages.sort_unstable();
        pages
    }

    fn claim(&mut self, generation: u64, first: u32, last: u32) -> Vec<u32> {
        if generation != self.generation {
            return Vec::new();
        }
        (first..=last).filter(|p| self.pages.insert(*p)).collect()
    }

    fn release(&mut self, generation: u64, page: u32) {
        if generation == self.generation {
            self.pages.remove(&page);
        }
    }
}

/// Pages to warm after the current page settles.
pub(super) struct PrefetchJob {
    pub(super) pages: Arc<dyn PaginationBackend>,
    pub(super) prefetched: Arc<Mutex<PrefetchSet>>,
    pub(super) generation: u64,
    pub(super) book_id: String,
    pub(super) viewport: ViewportConfig,
    pub(super) format_override: Option<String>,
    pub(super) first: u32,
    pub(super) last: u32,
    pub(super) delay: Duration,
}

impl PrefetchJob {
    /// Wait out the delay, claim the pages, then fetch in a detached task.
    ///
    /// Aborting the returned future only cancels the delay; once pages are
    /// claimed their fetch always runs to completion.
    pub(super) async fn run(self) {
        tokio::time::sleep(self.delay).await;
        let wanted = self
            .prefetched
            .lock()
            .claim(self.generation, self.first, self.last);
        if wanted.is_empty() {
            return;
        }
        tokio::spawn(self.fetch(wanted));
    }

    async fn fetch(self, wanted: Vec<u32>) {
        for page in wanted {
            match self
                .pages
                .get_reader_page(
                    &self.book_id,
                    page,
                    &self.viewport,
                    self.format_override.as_deref(),
                )
                .await
            {
                Ok(content) => {
                    if let Some(url) = content.image_url() {
                        self.pages.preload_image(url).await;
                    }
                    tracing::trace!(page, "Prefetched page");
                }
                Err(e) => {
                    self.prefetched.lock().release(self.generation, page);
                    tracing::debug!(page, error = %e, "Prefetch failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBook;

    fn job(book: &Arc<FakeBook>, set: &Arc<Mutex<PrefetchSet>>, generation: u64) -> PrefetchJob {
        PrefetchJob {
            pages: book.clone(),
            prefetched: set.clone(),
            generation,
            book_id: "book".to_string(),
            viewport: ViewportConfig {
                width: 800,
                height: 600,
                font_size: 18,
                line_height: 1.6,
            },
            format_override: None,
            first: 2,
            last: 4,
            delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn stale_generations_cannot_claim_or_release() {
        let mut set = PrefetchSet::default();
        assert_eq!(set.claim(0, 2, 4), vec![2, 3, 4]);
        assert_eq!(set.claim(0, 3, 5), vec![5]);

        set.reset();
        assert!(set.claim(0, 2, 4).is_empty());
        assert_eq!(set.claim(1, 2, 2), vec![2]);
        set.release(0, 2);
        assert_eq!(set.pages(), vec![2]);
        set.release(1, 2);
        assert!(set.pages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn job_from_before_a_repagination_does_nothing() {
        let book = FakeBook::text(10);
        let set = Arc::new(Mutex::new(PrefetchSet::default()));
        let generation = set.lock().generation();
        let stale = job(&book, &set, generation);

        set.lock().reset();
        stale.run().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(set.lock().pages().is_empty());
        assert!(book.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn current_job_claims_and_fetches() {
        let book = FakeBook::text(10);
        let set = Arc::new(Mutex::new(PrefetchSet::default()));

        let generation = set.lock().generation();
        job(&book, &set, generation).run().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(set.lock().pages(), vec![2, 3, 4]);
        assert_eq!(book.count("page:3"), 1);
    }
}
