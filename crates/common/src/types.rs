//! Menu domain types shared across the service.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HallConfig;

/// Tag assigned to a food item that carried no legend markers.
pub const UNKNOWN_TAG: &str = "unknown";

/// Meal names that lead the calendar in this order when present.
pub const CANONICAL_MEALS: [&str; 4] = ["Breakfast", "Lunch", "Dinner", "Late Night"];

// ── Menu hierarchy ────────────────────────────────────────────────────

/// A single dish on a menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    /// Dietary and allergen markers (e.g. "eggs", "vegan").
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// `<YYYYMMDD>-<hall code>-<index>`; cross-references items in the UI.
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "cat")]
    pub name: String,
    #[serde(rename = "foods", default)]
    pub items: Vec<FoodItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    #[serde(rename = "meal")]
    pub name: String,
    #[serde(rename = "cats", default)]
    pub categories: Vec<Category>,
}

/// One hall's menu for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallMenu {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_url: Option<String>,
    pub meals: Vec<Meal>,
}

impl HallMenu {
    pub fn new(hall: &HallConfig, meals: Vec<Meal>) -> Self {
        Self {
            name: hall.name.clone(),
            code: hall.code.clone(),
            color: hall.color.clone(),
            hours_url: hall.hours_url.clone(),
            meals,
        }
    }
}

/// All open halls for one calendar date. Closed halls are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySnapshot {
    #[serde(default)]
    pub halls: Vec<HallMenu>,
}

// ── Cache snapshot ────────────────────────────────────────────────────

/// The whole published mapping plus a single freshness stamp.
///
/// Serialized as `{ "time": <unix secs>, "dates": { "<YYYY-MM-DD>": { "halls": [...] } } }`.
/// `time` is absent until the first crawl completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCache {
    #[serde(rename = "time", default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<i64>,
    #[serde(default)]
    pub dates: BTreeMap<NaiveDate, DaySnapshot>,
}

impl MenuCache {
    pub fn new(dates: BTreeMap<NaiveDate, DaySnapshot>, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            last_refreshed: Some(refreshed_at.timestamp()),
            dates,
        }
    }

    /// True until a crawl has been published at least once.
    pub fn is_unpopulated(&self) -> bool {
        self.last_refreshed.is_none()
    }

    /// Seconds since the last completed crawl; `None` when never populated.
    pub fn age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_refreshed.map(|t| now.timestamp() - t)
    }

    /// Never-populated caches are treated as maximally stale.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        match self.age_secs(now) {
            Some(age) => age >= i64::try_from(max_age_secs).unwrap_or(i64::MAX),
            None => true,
        }
    }

    pub fn halls_on(&self, date: NaiveDate) -> &[HallMenu] {
        self.dates
            .get(&date)
            .map(|day| day.halls.as_slice())
            .unwrap_or(&[])
    }
}

// ── Calendar view ─────────────────────────────────────────────────────

/// One row of the calendar view.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay<'a> {
    pub date: NaiveDate,
    pub weekday: String,
    pub halls: &'a [HallMenu],
}

/// Ordered meal catalogue with stable element ids for the front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MealIndex {
    pub meals: Vec<String>,
    pub ids: BTreeMap<String, String>,
}

/// Dates in ascending order with their halls.
pub fn calendar(cache: &MenuCache) -> Vec<CalendarDay<'_>> {
    cache
        .dates
        .iter()
        .map(|(date, day)| CalendarDay {
            date: *date,
            weekday: date.format("%A").to_string(),
            halls: &day.halls,
        })
        .collect()
}

/// Every meal name seen in the cache: canonical meals first, then the rest sorted.
pub fn meal_index(cache: &MenuCache) -> MealIndex {
    let mut seen: HashSet<&str> = HashSet::new();
    for day in cache.dates.values() {
        for hall in &day.halls {
            for meal in &hall.meals {
                seen.insert(meal.name.as_str());
            }
        }
    }

    let mut meals: Vec<String> = Vec::with_capacity(seen.len());
    for name in CANONICAL_MEALS {
        if seen.remove(name) {
            meals.push(name.to_string());
        }
    }
    let mut rest: Vec<&str> = seen.into_iter().collect();
    rest.sort_unstable();
    meals.extend(rest.into_iter().map(str::to_string));

    let ids = meals
        .iter()
        .enumerate()
        .map(|(i, m)| (m.clone(), format!("meal-{}", i)))
        .collect();

    MealIndex { meals, ids }
}
