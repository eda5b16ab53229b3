// src/services/fragments.rs

//! Listing table extraction.
//!
//! Turns the free places page into the flat, ordered sequence of anchors and
//! labels the builder works on.

use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::Fragment;

/// Parse `html` and collect the table cell children matched by `selector`.
///
/// `<a>` elements become anchors and `<span>` elements labels, in document
/// order. Anything else inside the cells is skipped.
pub fn extract_fragments(html: &str, selector: &str) -> Result<Vec<Fragment>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selector)?;

    let mut fragments = Vec::new();
    for element in document.select(&selector) {
        let value = element.value();
        let tag = value.name();
        if tag != "a" && tag != "span" {
            log::debug!("Skipping <{}> in listing table", tag);
            continue;
        }

        let id = value
            .id()
            .ok_or_else(|| AppError::scrape(format!("<{tag}> in listing table has no id")))?
            .to_string();
        let text: String = element.text().collect();

        if tag == "a" {
            let href = value
                .attr("href")
                .ok_or_else(|| AppError::scrape(format!("anchor {id} has no href")))?
                .to_string();
            fragments.push(Fragment::Anchor { id, text, href });
        } else {
            fragments.push(Fragment::Label { id, text });
        }
    }

    Ok(fragments)
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
