//! Region name canonicalization.
//!
//! Survey exports and boundary layers spell region names differently
//! ("Nairobi City County", "NAIROBI CITY", "Tharaka-Nithi", "Tharaka Nithi").
//! Both sides go through the same [`RegionNameCanonicalizer`] so that the
//! join downstream can use exact string equality.
//!
//! The function is total and idempotent. Irregular spellings are handled by a
//! data-driven override table ([`NameOverrides`]) instead of inline rules.

use crate::error::{PipelineError, Result};
use crate::utils::string_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Administrative suffix removed from names as a whole word.
pub const ADMIN_SUFFIX: &str = "County";

/// Override table mapping a normalised pre-image to its final canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameOverrides(BTreeMap<String, String>);

impl Default for NameOverrides {
    fn default() -> Self {
        Self::from_pairs([("Nairobi City", "Nairobi")])
    }
}

impl NameOverrides {
    /// An empty table.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Load an override table from a JSON object of `"from": "to"` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::unreadable(path, e))?;
        serde_json::from_str(&text).map_err(|e| PipelineError::unreadable(path, e))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Maps free-text region names to one canonical spelling.
#[derive(Debug, Clone)]
pub struct RegionNameCanonicalizer {
    overrides: BTreeMap<String, String>,
}

impl Default for RegionNameCanonicalizer {
    fn default() -> Self {
        // The built-in table is a fixed point by construction.
        Self {
            overrides: normalise_keys(&NameOverrides::default()),
        }
    }
}

impl RegionNameCanonicalizer {
    /// Build a canonicalizer from an override table.
    ///
    /// Keys are normalised with the same steps that precede the lookup, so
    /// `"nairobi city county"` and `"Nairobi City"` address the same entry.
    /// Every target must already be canonical; otherwise re-applying the
    /// function would move it again.
    pub fn new(overrides: NameOverrides) -> Result<Self> {
        let canonicalizer = Self {
            overrides: normalise_keys(&overrides),
        };

        for (from, to) in overrides.iter() {
            if from.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "name override with empty source name".to_string(),
                ));
            }
            let settled = canonicalizer.canonicalize_str(to);
            if settled != to {
                return Err(PipelineError::InvalidConfig(format!(
                    "name override '{}' -> '{}' is not stable (canonicalizes to '{}')",
                    from, to, settled
                )));
            }
        }

        Ok(canonicalizer)
    }

    /// Canonicalize an optional name. Absent values stay absent.
    pub fn canonicalize(&self, name: Option<&str>) -> Option<String> {
        name.map(|n| self.canonicalize_str(n))
    }

    /// Canonicalize a present name.
    pub fn canonicalize_str(&self, name: &str) -> String {
        let normalised = normalise(name);
        match self.overrides.get(&normalised) {
            Some(target) => target.trim().to_string(),
            None => normalised,
        }
    }

    /// Canonicalize every value of a text column in place.
    pub fn canonicalize_column(&self, df: &mut DataFrame, column: &str) -> Result<()> {
        let values: Vec<Option<String>> = string_values(df, column)?
            .iter()
            .map(|v| self.canonicalize(v.as_deref()))
            .collect();
        df.replace(column, Series::new(column.into(), values))?;
        Ok(())
    }
}

fn normalise_keys(overrides: &NameOverrides) -> BTreeMap<String, String> {
    overrides
        .iter()
        .map(|(from, to)| (normalise(from), to.to_string()))
        .collect()
}

/// Every step except the override lookup.
fn normalise(name: &str) -> String {
    let titled = title_case(name.trim());

    let separated: String = titled
        .chars()
        .map(|c| match c {
            '/' | '-' => ' ',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();

    separated
        .split(' ')
        .filter(|token| !token.is_empty() && *token != ADMIN_SUFFIX)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-case the first letter of each word and lower-case the rest.
///
/// A word starts after any non-alphabetic character other than a combining
/// mark. When the upper-case form of a letter expands to several characters,
/// only the first stays upper-case so that a second pass leaves the result
/// unchanged.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;

    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                let mut upper = c.to_uppercase();
                if let Some(first) = upper.next() {
                    out.push(first);
                }
                for rest in upper {
                    out.extend(rest.to_lowercase());
                }
            }
            in_word = true;
        } else {
            out.push(c);
            // Lower-casing can emit a letter plus a combining mark ('İ' -> "i\u{307}").
            in_word = in_word && joins_word(c);
        }
    }

    out
}

/// Combining diacritical marks continue the word they follow.
fn joins_word(c: char) -> bool {
    matches!(
        c,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE20}'..='\u{FE2F}'
    )
}
