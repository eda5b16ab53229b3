//! Kita listing record.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// Attribute names as they appear in the listing markup ids.
pub mod attr {
    pub const KEY: &str = "KitaNr";
    pub const NAME: &str = "KitaName";
    pub const ADDRESS: &str = "KitaAdresse";
    pub const LINK: &str = "Link";
    pub const DISTRICT: &str = "Ortsteil";
    pub const OWNER_NAME: &str = "TraegerName";
    pub const MIN_ADMISSION_AGE: &str = "Aufnahmealter";
    pub const FREE_UNDER_THRESHOLD: &str = "PlaetzeUnter3";
    pub const FREE_OVER_THRESHOLD: &str = "PlaetzeUeber3";
    pub const DAILY_HOURS: &str = "StdTaeglich";
}

/// A daycare listing scraped from the free places table.
///
/// Identity is the `KitaNr` key together with the daily hours: the same
/// kita offering a different set of schedules counts as a different record.
/// Attributes the page adds later land in `extra` and never affect equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kita {
    #[serde(rename = "KitaNr")]
    key: String,

    #[serde(rename = "KitaName", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "KitaAdresse", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(rename = "Link", default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(rename = "Ortsteil", default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(rename = "TraegerName", default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,

    #[serde(rename = "Aufnahmealter", default, skip_serializing_if = "Option::is_none")]
    pub min_admission_age: Option<String>,

    /// Free places for children under three, verbatim
    #[serde(rename = "PlaetzeUnter3", default, skip_serializing_if = "Option::is_none")]
    pub free_spots_under_threshold: Option<String>,

    /// Free places for children over three, verbatim
    #[serde(rename = "PlaetzeUeber3", default, skip_serializing_if = "Option::is_none")]
    pub free_spots_over_threshold: Option<String>,

    /// Offered daily hours in document order; a single string is read as one entry
    #[serde(rename = "StdTaeglich", default, deserialize_with = "one_or_many")]
    daily_hours: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Kita {
    /// Build a listing from markup attribute names and their text.
    ///
    /// Fails when the identity attribute is missing.
    pub fn from_attributes<I>(attributes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut key = None;
        let mut kita = Kita {
            key: String::new(),
            name: None,
            address: None,
            link: None,
            district: None,
            owner_name: None,
            min_admission_age: None,
            free_spots_under_threshold: None,
            free_spots_over_threshold: None,
            daily_hours: Vec::new(),
            extra: BTreeMap::new(),
        };

        for (name, value) in attributes {
            match name.as_str() {
                attr::KEY => key = Some(value),
                attr::NAME => kita.name = Some(value),
                attr::ADDRESS => kita.address = Some(value),
                attr::LINK => kita.link = Some(value),
                attr::DISTRICT => kita.district = Some(value),
                attr::OWNER_NAME => kita.owner_name = Some(value),
                attr::MIN_ADMISSION_AGE => kita.min_admission_age = Some(value),
                attr::FREE_UNDER_THRESHOLD => kita.free_spots_under_threshold = Some(value),
                attr::FREE_OVER_THRESHOLD => kita.free_spots_over_threshold = Some(value),
                attr::DAILY_HOURS => kita.daily_hours.push(value),
                _ => {
                    kita.extra.insert(name, value);
                }
            }
        }

        kita.key = key.ok_or_else(|| {
            AppError::scrape(format!("listing row without {} attribute", attr::KEY))
        })?;
        Ok(kita)
    }

    /// Stable identifier of this kita.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Daily hours observed so far, in encounter order.
    pub fn daily_hours(&self) -> &[String] {
        &self.daily_hours
    }

    /// Record another daily-hours row for the same kita.
    pub fn add_daily_hours(&mut self, hours: impl Into<String>) {
        self.daily_hours.push(hours.into());
    }

    /// Whether one of the offered schedules is exactly `hours`.
    pub fn has_daily_hours(&self, hours: &str) -> bool {
        self.daily_hours.iter().any(|h| h == hours)
    }

    /// Free places under three as a number; anything unparsable counts as none.
    pub fn free_spots_under(&self) -> i64 {
        parse_spots(self.free_spots_under_threshold.as_deref())
    }

    /// One-line rendering used in notifications and logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("Name: {}", text(&self.name)),
            format!("Adr: {}", text(&self.address)),
            format!("Link: {}", text(&self.link)),
            format!("Reg: {}", text(&self.district)),
            format!("freeUnder3: {}", text(&self.free_spots_under_threshold)),
            format!("freeOver3: {}", text(&self.free_spots_over_threshold)),
            format!("dailyHours: {}", self.hours_text()),
        ];
        parts.extend(self.extra.iter().map(|(k, v)| format!("{k}: {v}")));
        parts.join(", ")
    }

    fn hours_text(&self) -> String {
        match self.daily_hours.as_slice() {
            [single] => single.clone(),
            many => format!("[{}]", many.join(", ")),
        }
    }
}

impl PartialEq for Kita {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.daily_hours == other.daily_hours
    }
}

impl Eq for Kita {}

impl Hash for Kita {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn parse_spots(value: Option<&str>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
