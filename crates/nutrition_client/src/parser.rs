//! Short-menu markup parser.
//!
//! The nutrition site renders one hall/day as line-oriented HTML where each
//! structural element sits on its own line behind a `shortmenu*` class:
//!
//! ```text
//! <div class='shortmenumeals'>Breakfast</div>
//! <div class='shortmenucats'><span>-- Entrees --</span></div>
//! <div class='shortmenurecipes'><span>Scrambled Eggs&nbsp;</span></div>
//! <img src="LegendImages/eggs.gif" alt="">
//! ```
//!
//! Each line is reduced to a [`Line`] token and fed through a small state
//! machine. Lines that do not fit the current state are skipped, never fatal.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use common::{Category, FoodItem, Meal, UNKNOWN_TAG};
use regex::Regex;

static STRUCTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"shortmenu(meals|cats|recipes).*>\s*([^<]+?)\s*<").expect("valid structure regex")
});

static LEGEND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"LegendImages/([A-Za-z0-9_]+)").expect("valid legend regex"));

/// Structural marker found on a line. At most one per line; meal wins over
/// category, category over food.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Meal(String),
    Category(String),
    Food(String),
}

/// One tokenized source line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub marker: Option<Marker>,
    /// Legend tags on this line, in source order.
    pub legends: Vec<String>,
}

impl Line {
    fn is_empty(&self) -> bool {
        self.marker.is_none() && self.legends.is_empty()
    }
}

/// Parser output for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMenu {
    pub meals: Vec<Meal>,
    /// Marker or legend lines that arrived in a state that could not take them.
    pub skipped_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing open yet.
    Start,
    /// A meal is open but has no category.
    InMeal,
    /// A category is open but has no item.
    InCategory,
    /// A food item is open and accepts legend tags.
    InItem,
}

/// Strip decorative entities and placeholder dashes.
pub fn normalize(line: &str) -> String {
    line.replace("&nbsp;", " ")
        .replace("--", "")
        .replace("&amp;", "&")
}

/// Classify a raw line.
pub fn tokenize(raw: &str) -> Line {
    let line = normalize(raw);

    let marker = STRUCTURE_RE.captures(&line).and_then(|caps| {
        let text = caps.get(2)?.as_str().trim().to_string();
        if text.is_empty() {
            return None;
        }
        match caps.get(1)?.as_str() {
            "meals" => Some(Marker::Meal(text)),
            "cats" => Some(Marker::Category(text)),
            "recipes" => Some(Marker::Food(text)),
            _ => None,
        }
    });

    let legends = LEGEND_RE
        .captures_iter(&line)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();

    Line { marker, legends }
}

/// Parse one hall/day document into meals → categories → items.
///
/// `date` and `hall_code` only feed the item ids; the function has no other
/// inputs and always returns the same output for the same document.
pub fn parse_document(raw: &str, date: NaiveDate, hall_code: &str) -> ParsedMenu {
    let id_prefix = format!("{}-{}", date.format("%Y%m%d"), hall_code);

    let mut meals: Vec<Meal> = Vec::new();
    let mut state = State::Start;
    let mut next_index: usize = 0;
    let mut skipped_lines = 0usize;

    for raw_line in raw.lines() {
        let line = tokenize(raw_line);
        if line.is_empty() {
            continue;
        }

        let mut accepted = true;

        match line.marker {
            Some(Marker::Meal(name)) => {
                meals.push(Meal {
                    name,
                    categories: Vec::new(),
                });
                state = State::InMeal;
            }
            Some(Marker::Category(name)) => match meals.last_mut() {
                Some(meal) if state != State::Start => {
                    meal.categories.push(Category {
                        name,
                        items: Vec::new(),
                    });
                    state = State::InCategory;
                }
                _ => accepted = false,
            },
            Some(Marker::Food(name)) => {
                let category = match state {
                    State::InCategory | State::InItem => meals
                        .last_mut()
                        .and_then(|meal| meal.categories.last_mut()),
                    State::Start | State::InMeal => None,
                };
                match category {
                    Some(category) => {
                        category.items.push(FoodItem {
                            name,
                            tags: BTreeSet::new(),
                            id: format!("{}-{}", id_prefix, next_index),
                        });
                        next_index += 1;
                        state = State::InItem;
                    }
                    None => accepted = false,
                }
            }
            None => {}
        }

        if !line.legends.is_empty() {
            let item = match state {
                State::InItem => meals
                    .last_mut()
                    .and_then(|meal| meal.categories.last_mut())
                    .and_then(|category| category.items.last_mut()),
                _ => None,
            };
            match item {
                Some(item) => item.tags.extend(line.legends),
                None => accepted = false,
            }
        }

        if !accepted {
            skipped_lines += 1;
        }
    }

    for meal in &mut meals {
        for category in &mut meal.categories {
            for item in &mut category.items {
                if item.tags.is_empty() {
                    item.tags.insert(UNKNOWN_TAG.to_string());
                }
            }
        }
    }

    prune(&mut meals);

    ParsedMenu {
        meals,
        skipped_lines,
    }
}

/// Drop empty categories, then meals left without categories.
fn prune(meals: &mut Vec<Meal>) {
    for meal in meals.iter_mut() {
        meal.categories.retain(|c| !c.items.is_empty());
    }
    meals.retain(|m| !m.categories.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("valid date")
    }

    fn tags(item: &FoodItem) -> Vec<&str> {
        item.tags.iter().map(String::as_str).collect()
    }

    const SAMPLE: &str = r#"<html><body>
<table>
<tr><td><div class='shortmenumeals'>Breakfast</div></td></tr>
<tr><td><div class='shortmenucats'><span style="color: #000000">-- Entrees --</span></div></td></tr>
<tr><td><div class='shortmenurecipes'><span style='color: #000000'>Scrambled Eggs&nbsp;</span></div></td></tr>
<td><img src="LegendImages/eggs.gif" alt="" width="25" height="25"></td>
<tr><td><div class='shortmenurecipes'><span style='color: #000000'>Oatmeal&nbsp;</span></div></td></tr>
<td><img src="LegendImages/vegan.gif" alt=""><img src="LegendImages/gluten.gif" alt=""></td>
<tr><td><div class='shortmenucats'><span>-- Bakery --</span></div></td></tr>
<tr><td><div class='shortmenumeals'>Lunch</div></td></tr>
<tr><td><div class='shortmenucats'><span>-- Grill --</span></div></td></tr>
<tr><td><div class='shortmenurecipes'><span>Mac &amp; Cheese</span></div></td></tr>
<tr><td><div class='shortmenurecipes'><span>Veggie Burger</span></div></td></tr>
<td><img src="LegendImages/veggie.gif" alt=""></td>
<tr><td><div class='shortmenumeals'>Dinner</div></td></tr>
<tr><td><div class='shortmenucats'><span>-- Closed --</span></div></td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_scrambled_eggs_scenario() {
        let doc = "<div class='shortmenumeals'>Breakfast</div>\n\
                   <div class='shortmenucats'>Entrees</div>\n\
                   <div class='shortmenurecipes'>Scrambled Eggs</div>\n\
                   <img src=\"LegendImages/eggs.gif\">\n";

        let meals = parse_document(doc, day(), "40").meals;

        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].name, "Breakfast");
        assert_eq!(meals[0].categories.len(), 1);
        assert_eq!(meals[0].categories[0].name, "Entrees");
        let items = &meals[0].categories[0].items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Scrambled Eggs");
        assert_eq!(tags(&items[0]), vec!["eggs"]);
        assert_eq!(items[0].id, "20261016-40-0");
    }

    #[test]
    fn test_category_before_any_meal_is_skipped() {
        let doc = "<div class='shortmenucats'>Entrees</div>\n\
                   <div class='shortmenurecipes'>Pancakes</div>\n";

        let parsed = parse_document(doc, day(), "40");

        assert!(parsed.meals.is_empty());
        assert_eq!(parsed.skipped_lines, 2);
    }

    #[test]
    fn test_food_without_category_is_skipped() {
        let doc = "<div class='shortmenumeals'>Lunch</div>\n\
                   <div class='shortmenurecipes'>Orphan Soup</div>\n\
                   <img src=\"LegendImages/vegan.gif\">\n\
                   <div class='shortmenucats'>Soups</div>\n\
                   <div class='shortmenurecipes'>Minestrone</div>\n";

        let parsed = parse_document(doc, day(), "05");

        assert_eq!(parsed.skipped_lines, 2);
        assert_eq!(parsed.meals.len(), 1);
        let items = &parsed.meals[0].categories[0].items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Minestrone");
        assert_eq!(tags(&items[0]), vec![UNKNOWN_TAG]);
        assert_eq!(items[0].id, "20261016-05-0");
    }

    #[test]
    fn test_full_document_structure_and_pruning() {
        let meals = parse_document(SAMPLE, day(), "25").meals;

        let names: Vec<&str> = meals.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Breakfast", "Lunch"], "Dinner has only an empty category");

        let breakfast = &meals[0];
        assert_eq!(breakfast.categories.len(), 1, "empty Bakery dropped");
        let items = &breakfast.categories[0].items;
        assert_eq!(items[0].name, "Scrambled Eggs");
        assert_eq!(items[1].name, "Oatmeal");
        assert_eq!(tags(&items[1]), vec!["gluten", "vegan"]);

        let grill = &meals[1].categories[0];
        assert_eq!(grill.name, "Grill");
        assert_eq!(grill.items[0].name, "Mac & Cheese");
        assert_eq!(tags(&grill.items[0]), vec![UNKNOWN_TAG]);
        assert_eq!(tags(&grill.items[1]), vec!["veggie"]);
        assert_eq!(grill.items[1].id, "20261016-25-3");

        for meal in &meals {
            assert!(!meal.categories.is_empty());
            for category in &meal.categories {
                assert!(!category.items.is_empty());
                for item in &category.items {
                    assert!(!item.tags.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = parse_document(SAMPLE, day(), "25");
        let second = parse_document(SAMPLE, day(), "25");
        assert_eq!(first, second);
    }

    #[test]
    fn test_source_order_is_kept() {
        let doc = "<div class='shortmenumeals'>Dinner</div>\n\
                   <div class='shortmenucats'>Zucchini Bar</div>\n\
                   <div class='shortmenurecipes'>Zebra Cake</div>\n\
                   <div class='shortmenurecipes'>Apple Pie</div>\n\
                   <div class='shortmenucats'>Asian Wok</div>\n\
                   <div class='shortmenurecipes'>Chow Mein</div>\n\
                   <div class='shortmenumeals'>Breakfast</div>\n\
                   <div class='shortmenucats'>Entrees</div>\n\
                   <div class='shortmenurecipes'>Toast</div>\n";

        let meals = parse_document(doc, day(), "20").meals;

        assert_eq!(meals[0].name, "Dinner");
        assert_eq!(meals[1].name, "Breakfast");
        assert_eq!(meals[0].categories[0].name, "Zucchini Bar");
        assert_eq!(meals[0].categories[1].name, "Asian Wok");
        assert_eq!(meals[0].categories[0].items[0].name, "Zebra Cake");
        assert_eq!(meals[0].categories[0].items[1].name, "Apple Pie");
    }

    #[test]
    fn test_legend_after_new_category_is_not_misattributed() {
        let doc = "<div class='shortmenumeals'>Lunch</div>\n\
                   <div class='shortmenucats'>Grill</div>\n\
                   <div class='shortmenurecipes'>Burger</div>\n\
                   <div class='shortmenucats'>Salads</div>\n\
                   <img src=\"LegendImages/vegan.gif\">\n";

        let parsed = parse_document(doc, day(), "40");

        assert_eq!(parsed.skipped_lines, 1);
        assert_eq!(tags(&parsed.meals[0].categories[0].items[0]), vec![UNKNOWN_TAG]);
    }

    #[test]
    fn test_tokenize_normalizes_entities_and_dashes() {
        let line = tokenize("<div class='shortmenucats'><span>--&nbsp;Soups &amp; Stews&nbsp;--</span></div>");
        assert_eq!(line.marker, Some(Marker::Category("Soups & Stews".into())));
        assert!(line.legends.is_empty());

        let line = tokenize("<p>nothing to see</p>");
        assert_eq!(line, Line::default());
    }

    #[test]
    fn test_garbage_yields_empty_menu() {
        assert!(parse_document("", day(), "40").meals.is_empty());
        assert!(parse_document("<html>\n<body>Closed</body>\n</html>", day(), "40").meals.is_empty());
    }
}
