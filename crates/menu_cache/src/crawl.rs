//! Crawl orchestration.
//!
//! Walks the lookahead window × hall list, fetching and parsing every pair,
//! then assembles one complete [`MenuCache`]. A failed or empty pair just
//! leaves that hall out of that day; only a crawl where no fetch succeeded is
//! an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use common::config::{CrawlConfig, HallConfig};
use common::{DaySnapshot, Error, HallMenu, Meal, MenuCache};
use futures_util::{stream, StreamExt};
use nutrition_client::{parse_document, HallFetcher};
use tracing::{debug, info, warn};

/// Counters for one completed crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub dates: Vec<NaiveDate>,
    /// Pairs whose document was retrieved.
    pub fetched: usize,
    /// Pairs whose fetch failed.
    pub failed: usize,
    /// Retrieved pairs with no meals (hall closed).
    pub closed: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub cache: MenuCache,
    pub summary: CrawlSummary,
}

enum PairOutcome {
    Open(Vec<Meal>),
    Closed,
    Failed,
}

/// `days` consecutive dates starting at `today`.
pub fn crawl_window(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    today.iter_days().take(days as usize).collect()
}

pub struct CrawlOrchestrator {
    fetcher: Arc<dyn HallFetcher>,
    halls: Vec<HallConfig>,
    lookahead_days: u32,
    tz: Tz,
    concurrency: usize,
}

impl CrawlOrchestrator {
    pub fn new(
        fetcher: Arc<dyn HallFetcher>,
        halls: Vec<HallConfig>,
        crawl: &CrawlConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            fetcher,
            halls,
            lookahead_days: crawl.lookahead_days,
            tz: crawl.tz()?,
            concurrency: crawl.concurrency.max(1),
        })
    }

    /// Today's date in the reference time zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Crawl the window starting today.
    pub async fn run(&self) -> Result<CrawlReport, Error> {
        self.run_from(self.today()).await
    }

    /// Crawl the window starting at `start`.
    pub async fn run_from(&self, start: NaiveDate) -> Result<CrawlReport, Error> {
        let started = Instant::now();
        let dates = crawl_window(start, self.lookahead_days);
        let total = dates.len() * self.halls.len();

        info!(
            "Crawling {} days from {} across {} halls ({} pairs)",
            dates.len(),
            start,
            self.halls.len(),
            total
        );

        let pairs: Vec<(usize, usize)> = (0..dates.len())
            .flat_map(|d| (0..self.halls.len()).map(move |h| (d, h)))
            .collect();

        let dates_ref = &dates;
        let results: Vec<(usize, usize, PairOutcome)> = stream::iter(pairs)
            .map(|(d, h)| async move {
                let outcome = self.crawl_pair(&self.halls[h], dates_ref[d]).await;
                (d, h, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut slots: Vec<Vec<Option<HallMenu>>> = vec![vec![None; self.halls.len()]; dates.len()];
        let mut fetched = 0usize;
        let mut failed = 0usize;
        let mut closed = 0usize;

        for (d, h, outcome) in results {
            match outcome {
                PairOutcome::Open(meals) => {
                    fetched += 1;
                    slots[d][h] = Some(HallMenu::new(&self.halls[h], meals));
                }
                PairOutcome::Closed => {
                    fetched += 1;
                    closed += 1;
                }
                PairOutcome::Failed => failed += 1,
            }
        }

        if fetched == 0 {
            return Err(Error::Crawl(format!(
                "all {} fetches failed for {} days from {}",
                total,
                dates.len(),
                start
            )));
        }

        let snapshot: BTreeMap<NaiveDate, DaySnapshot> = dates
            .iter()
            .zip(slots)
            .map(|(date, halls)| {
                (
                    *date,
                    DaySnapshot {
                        halls: halls.into_iter().flatten().collect(),
                    },
                )
            })
            .collect();

        let summary = CrawlSummary {
            dates,
            fetched,
            failed,
            closed,
            elapsed: started.elapsed(),
        };

        info!(
            "Crawl finished in {:.1}s: fetched={} failed={} closed={}",
            summary.elapsed.as_secs_f64(),
            summary.fetched,
            summary.failed,
            summary.closed
        );

        Ok(CrawlReport {
            cache: MenuCache::new(snapshot, Utc::now()),
            summary,
        })
    }

    async fn crawl_pair(&self, hall: &HallConfig, date: NaiveDate) -> PairOutcome {
        let raw = match self.fetcher.fetch_document(hall, date).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("No menu for {} on {}: {}", hall.name, date, e);
                return PairOutcome::Failed;
            }
        };

        let parsed = parse_document(&raw, date, &hall.code);
        if parsed.skipped_lines > 0 {
            debug!(
                "{} on {}: skipped {} out-of-place lines",
                hall.name, date, parsed.skipped_lines
            );
        }

        if parsed.meals.is_empty() {
            debug!("{} closed on {}", hall.name, date);
            PairOutcome::Closed
        } else {
            PairOutcome::Open(parsed.meals)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn menu_doc(item: &str) -> String {
        format!(
            "<div class='shortmenumeals'>Lunch</div>\n\
             <div class='shortmenucats'>Grill</div>\n\
             <div class='shortmenurecipes'>{}</div>\n",
            item
        )
    }

    pub(crate) fn halls(n: usize) -> Vec<HallConfig> {
        (0..n)
            .map(|i| HallConfig {
                code: format!("{:02}", i * 5),
                name: format!("Hall {}", i),
                color: None,
                hours_url: None,
            })
            .collect()
    }

    pub(crate) fn crawl_config(days: u32) -> CrawlConfig {
        CrawlConfig {
            lookahead_days: days,
            ..CrawlConfig::default()
        }
    }

    /// Serves a lunch menu per hall code; listed pairs fail or come back closed.
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        pub failing: HashSet<(String, NaiveDate)>,
        pub closed: HashSet<(String, NaiveDate)>,
        pub fail_all: bool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl HallFetcher for ScriptedFetcher {
        async fn fetch_document(&self, hall: &HallConfig, date: NaiveDate) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = (hall.code.clone(), date);
            if self.fail_all || self.failing.contains(&key) {
                return Err(Error::Http("connection refused".into()));
            }
            if self.closed.contains(&key) {
                return Ok("<html>closed</html>".into());
            }
            Ok(menu_doc(&format!("Burger {}", hall.code)))
        }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date")
    }

    fn codes(cache: &MenuCache, date: NaiveDate) -> Vec<String> {
        cache.halls_on(date).iter().map(|h| h.code.clone()).collect()
    }

    #[test]
    fn test_window_spans_consecutive_days() {
        let days = crawl_window(NaiveDate::from_ymd_opt(2026, 12, 30).unwrap(), 4);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2026, 12, 30).unwrap(),
                NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2027, 1, 2).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_omits_only_that_pair() {
        let day1 = start().succ_opt().unwrap();
        let fetcher = ScriptedFetcher {
            failing: HashSet::from([("05".to_string(), day1)]),
            ..ScriptedFetcher::default()
        };
        let orchestrator =
            CrawlOrchestrator::new(Arc::new(fetcher), halls(3), &crawl_config(3)).expect("orchestrator");

        let report = orchestrator.run_from(start()).await.expect("crawl should succeed");

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.fetched, 8);
        assert_eq!(report.cache.dates.len(), 3);
        assert_eq!(codes(&report.cache, start()), vec!["00", "05", "10"]);
        assert_eq!(codes(&report.cache, day1), vec!["00", "10"]);
        assert_eq!(
            codes(&report.cache, day1.succ_opt().unwrap()),
            vec!["00", "05", "10"]
        );
        assert!(report.cache.last_refreshed.is_some());
    }

    #[tokio::test]
    async fn test_closed_halls_are_absent_not_empty() {
        let fetcher = ScriptedFetcher {
            closed: HashSet::from([("10".to_string(), start())]),
            ..ScriptedFetcher::default()
        };
        let orchestrator =
            CrawlOrchestrator::new(Arc::new(fetcher), halls(3), &crawl_config(1)).expect("orchestrator");

        let report = orchestrator.run_from(start()).await.expect("crawl should succeed");

        assert_eq!(report.summary.closed, 1);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(codes(&report.cache, start()), vec!["00", "05"]);
    }

    #[tokio::test]
    async fn test_all_fetches_failing_is_an_error() {
        let fetcher = Arc::new(ScriptedFetcher {
            fail_all: true,
            ..ScriptedFetcher::default()
        });
        let orchestrator =
            CrawlOrchestrator::new(fetcher.clone(), halls(5), &crawl_config(8)).expect("orchestrator");

        let result = orchestrator.run_from(start()).await;

        assert!(matches!(result, Err(Error::Crawl(_))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 40);
    }

    #[tokio::test]
    async fn test_every_day_closed_still_publishes() {
        let fetcher = ScriptedFetcher {
            closed: crawl_window(start(), 2)
                .into_iter()
                .flat_map(|d| halls(2).into_iter().map(move |h| (h.code, d)))
                .collect(),
            ..ScriptedFetcher::default()
        };
        let orchestrator =
            CrawlOrchestrator::new(Arc::new(fetcher), halls(2), &crawl_config(2)).expect("orchestrator");

        let report = orchestrator.run_from(start()).await.expect("crawl should succeed");

        assert_eq!(report.summary.closed, 4);
        assert_eq!(report.cache.dates.len(), 2);
        assert!(report.cache.dates.values().all(|d| d.halls.is_empty()));
    }

    #[tokio::test]
    async fn test_items_carry_date_and_hall_ids() {
        let orchestrator = CrawlOrchestrator::new(
            Arc::new(ScriptedFetcher::default()),
            halls(2),
            &crawl_config(1),
        )
        .expect("orchestrator");

        let report = orchestrator.run_from(start()).await.expect("crawl should succeed");
        let ids: HashMap<String, String> = report
            .cache
            .halls_on(start())
            .iter()
            .map(|h| (h.code.clone(), h.meals[0].categories[0].items[0].id.clone()))
            .collect();

        assert_eq!(ids["00"], "20261016-00-0");
        assert_eq!(ids["05"], "20261016-05-0");
    }

    #[test]
    fn test_bad_timezone_is_rejected() {
        let crawl = CrawlConfig {
            timezone: "Nowhere/Special".into(),
            ..CrawlConfig::default()
        };
        let result = CrawlOrchestrator::new(Arc::new(ScriptedFetcher::default()), halls(1), &crawl);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
