// src/services/builder.rs

//! Rebuilds kita listings from the flat fragment sequence.
//!
//! The free places table is rendered as a grid control: every row starts
//! with an anchor and the remaining cells are labels whose ids end in the
//! zero-based row number, e.g. `GridView1_lblKitaName_3`. A kita offering
//! several schedules shows up as several rows with the same `KitaNr`; those
//! rows are folded into one listing with multiple daily hours.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::kita::attr;
use crate::models::{Fragment, Kita};

static ROW_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)$").expect("row suffix pattern is valid"));

/// Attributes collected for one table row.
#[derive(Debug, Default)]
struct PartialRow {
    attributes: BTreeMap<String, String>,
    daily_hours: Vec<String>,
}

impl PartialRow {
    fn set(&mut self, name: String, value: String) {
        if name == attr::DAILY_HOURS {
            self.daily_hours.push(value);
        } else {
            self.attributes.insert(name, value);
        }
    }

    fn into_kita(self) -> Result<Kita> {
        let hours = self
            .daily_hours
            .into_iter()
            .map(|h| (attr::DAILY_HOURS.to_string(), h));
        Kita::from_attributes(self.attributes.into_iter().chain(hours))
    }
}

/// Incremental builder fed one fragment at a time.
#[derive(Debug)]
pub struct KitaBuilder {
    base_url: String,
    rows: Vec<PartialRow>,
}

impl KitaBuilder {
    /// `base_url` is prefixed to anchor targets to form each listing's link.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            rows: Vec::new(),
        }
    }

    /// Apply one fragment.
    ///
    /// Anchors open a new row; labels are attached to the row their id
    /// suffix points at. A suffix past the last opened row means the page
    /// layout changed and is reported as a scrape error.
    pub fn push(&mut self, fragment: &Fragment) -> Result<()> {
        match fragment {
            Fragment::Anchor { id, text, href } => {
                let mut row = PartialRow::default();
                row.set(attribute_name(id)?, text.clone());
                let link: String = format!("{}{}", self.base_url, href)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                row.set(attr::LINK.to_string(), link);
                self.rows.push(row);
            }
            Fragment::Label { id, text } => {
                let index = row_index(id)?;
                let open_rows = self.rows.len();
                let row = self.rows.get_mut(index).ok_or_else(|| {
                    AppError::scrape(format!(
                        "label {id} points at row {index} but only {open_rows} rows were opened"
                    ))
                })?;
                row.set(attribute_name(id)?, text.clone());
            }
        }
        Ok(())
    }

    /// Turn the collected rows into listings keyed by `KitaNr`.
    pub fn finish(self) -> Result<HashMap<String, Kita>> {
        let mut kitas: HashMap<String, Kita> = HashMap::new();

        for row in self.rows {
            let kita = row.into_kita()?;
            match kitas.get_mut(kita.key()) {
                Some(existing) => {
                    log::debug!("Merging continuation row for kita {}", kita.key());
                    for hours in kita.daily_hours() {
                        existing.add_daily_hours(hours.clone());
                    }
                }
                None => {
                    kitas.insert(kita.key().to_string(), kita);
                }
            }
        }

        Ok(kitas)
    }
}

/// Build all listings from a complete fragment sequence.
pub fn build_kitas(fragments: &[Fragment], base_url: &str) -> Result<HashMap<String, Kita>> {
    let mut builder = KitaBuilder::new(base_url);
    for fragment in fragments {
        builder.push(fragment)?;
    }
    builder.finish()
}

/// `GridView1_lblKitaName_0` -> `KitaName`, `GridView1_HLinkKitaNr_0` -> `KitaNr`.
fn attribute_name(id: &str) -> Result<String> {
    let token = id
        .split('_')
        .nth(1)
        .ok_or_else(|| AppError::scrape(format!("unexpected element id {id}")))?;
    let name = token.replace("lbl", "").replace("HLink", "");
    if name.is_empty() {
        return Err(AppError::scrape(format!("no attribute name in element id {id}")));
    }
    Ok(name)
}

fn row_index(id: &str) -> Result<usize> {
    ROW_SUFFIX
        .captures(id)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| AppError::scrape(format!("label id {id} has no row number")))
}
