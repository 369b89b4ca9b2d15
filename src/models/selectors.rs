// src/models/selectors.rs

//! CSS selectors for extracting listings from a page.

use serde::{Deserialize, Serialize};

/// CSS selectors for scraping a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingSelectors {
    /// Selector for each card/row in the listing
    pub item_selector: String,

    /// Selector for the title element within an item
    pub title_selector: String,

    /// Optional selector for the link element (if different from title)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_selector: Option<String>,

    /// HTML attribute name for extracting links (usually "href")
    #[serde(default = "default_attr_name")]
    pub attr_name: String,

    /// Attribute on the item element carrying a stable id, if the site has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_attr: Option<String>,

    /// Selector for the instructor element within an item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor_selector: Option<String>,

    /// Selector for the rating element within an item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_selector: Option<String>,

    /// Selector for the enrolment count element within an item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub students_selector: Option<String>,
}

fn default_attr_name() -> String {
    "href".to_string()
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            item_selector: "div.course-card".to_string(),
            title_selector: "h3 a".to_string(),
            link_selector: None,
            attr_name: default_attr_name(),
            id_attr: None,
            instructor_selector: None,
            rating_selector: None,
            students_selector: None,
        }
    }
}

impl ListingSelectors {
    /// Every selector string that has to parse, paired with its field name.
    pub fn all(&self) -> Vec<(&'static str, &str)> {
        let mut out = vec![
            ("item_selector", self.item_selector.as_str()),
            ("title_selector", self.title_selector.as_str()),
        ];
        let optional = [
            ("link_selector", &self.link_selector),
            ("instructor_selector", &self.instructor_selector),
            ("rating_selector", &self.rating_selector),
            ("students_selector", &self.students_selector),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                out.push((name, v.as_str()));
            }
        }
        out
    }
}
