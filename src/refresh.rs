//! Periodic report re-pull that keeps the displayed feed current.
//!
//! Scoring never reads from here; every scoring request takes its own
//! snapshot from the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::IncidentReport;
use crate::store::SafetyStore;

/// Reports as of the last successful pull, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFeed {
    pub reports: Vec<IncidentReport>,
    pub refreshed_at: DateTime<Utc>,
}

impl ReportFeed {
    pub fn empty() -> Self {
        Self {
            reports: Vec::new(),
            refreshed_at: Utc::now(),
        }
    }

    pub fn page(&self, skip: usize, limit: usize) -> &[IncidentReport] {
        let start = skip.min(self.reports.len());
        let end = start.saturating_add(limit).min(self.reports.len());
        &self.reports[start..end]
    }
}

/// One pull from the store.
pub fn load_feed(store: &dyn SafetyStore) -> Result<ReportFeed> {
    let reports = store
        .reports(None)?
        .into_iter()
        .sorted_by(|a, b| b.timestamp.cmp(&a.timestamp))
        .collect();
    Ok(ReportFeed {
        reports,
        refreshed_at: Utc::now(),
    })
}

/// Re-pulls reports every `every` and publishes the result. A failed pull
/// keeps the previous feed. The task ends once every receiver is dropped.
pub fn spawn_feed_refresh(
    store: Arc<dyn SafetyStore>,
    every: Duration,
) -> (watch::Receiver<Arc<ReportFeed>>, JoinHandle<()>) {
    let initial = load_feed(store.as_ref()).unwrap_or_else(|e| {
        warn!("Initial report pull failed: {}", e);
        ReportFeed::empty()
    });
    let (tx, rx) = watch::channel(Arc::new(initial));

    let handle = tokio::spawn(async move {
        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; the initial pull already happened.
        timer.tick().await;

        loop {
            timer.tick().await;
            if tx.is_closed() {
                debug!("Report feed has no subscribers, stopping refresh");
                break;
            }

            match load_feed(store.as_ref()) {
                Ok(feed) => {
                    let previous = tx.borrow().reports.len();
                    if feed.reports.len() != previous {
                        info!(
                            "Report feed refreshed: {} reports ({} new)",
                            feed.reports.len(),
                            feed.reports.len().saturating_sub(previous)
                        );
                    }
                    tx.send_replace(Arc::new(feed));
                }
                Err(e) => warn!("Report refresh failed, keeping previous feed: {}", e),
            }
        }
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coordinate;
    use crate::model::{IncidentCategory, NewReport};
    use crate::store::{MemoryStore, ReportSink};

    fn submit(store: &MemoryStore, note: &str) {
        store
            .submit_report(NewReport {
                category: IncidentCategory::Suspicious,
                location: Coordinate::new(30.7, 76.8).unwrap(),
                note: note.to_string(),
                reporter: "tester".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn feed_is_newest_first_and_pages() {
        let store = MemoryStore::new();
        submit(&store, "first");
        std::thread::sleep(Duration::from_millis(5));
        submit(&store, "second");
        std::thread::sleep(Duration::from_millis(5));
        submit(&store, "third");

        let feed = load_feed(&store).unwrap();
        let notes: Vec<_> = feed.reports.iter().map(|r| r.note.as_str()).collect();
        assert_eq!(notes, vec!["third", "second", "first"]);
        assert_eq!(feed.page(1, 5).len(), 2);
        assert_eq!(feed.page(1, 1)[0].note, "second");
        assert!(feed.page(10, 5).is_empty());
        assert_eq!(feed.page(0, usize::MAX).len(), 3);
    }

    #[tokio::test]
    async fn refresh_picks_up_new_reports() {
        let store = Arc::new(MemoryStore::new());
        submit(&store, "before");

        let (mut rx, handle) = spawn_feed_refresh(store.clone(), Duration::from_millis(20));
        assert_eq!(rx.borrow().reports.len(), 1);

        submit(&store, "after");
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                rx.changed().await.unwrap();
                if rx.borrow().reports.len() == 2 {
                    break;
                }
            }
        })
        .await
        .expect("feed should refresh");

        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("refresh task should stop")
            .unwrap();
    }
}
