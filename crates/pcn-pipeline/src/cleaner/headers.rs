//! Header repair for survey exports.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(" {2,}").expect("Invalid regex: space runs"));

/// Clean a single header: trim, turn line breaks into spaces, collapse space runs.
pub fn clean_header(raw: &str) -> String {
    let replaced = raw.trim().replace(['\n', '\r'], " ");
    SPACE_RUNS.replace_all(&replaced, " ").into_owned()
}

/// Clean every header. Length and order are preserved.
pub fn clean_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter().map(|h| clean_header(h.as_ref())).collect()
}

/// Make cleaned headers usable as column names.
///
/// Empty headers become `Unnamed: {index}`; repeated names get `.1`, `.2`, ...
/// suffixes in order of appearance.
pub fn disambiguate_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut out = Vec::with_capacity(headers.len());

    for (index, header) in headers.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", index)
        } else {
            header
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }

        seen.insert(candidate.clone());
        out.push(candidate);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_header_trailing_newline() {
        assert_eq!(clean_header("  Governance Score \n"), "Governance Score");
    }

    #[test]
    fn test_clean_header_internal_breaks() {
        assert_eq!(
            clean_header("Proportion of PCNs\r\nGazetted"),
            "Proportion of PCNs Gazetted"
        );
        assert_eq!(clean_header("HRH   Weighted\nScore"), "HRH Weighted Score");
    }

    #[test]
    fn test_clean_header_keeps_single_spaces_and_tabs() {
        assert_eq!(clean_header("A B\tC"), "A B\tC");
        assert_eq!(clean_header(""), "");
        assert_eq!(clean_header("   "), "");
    }

    #[test]
    fn test_clean_headers_preserves_length_and_order() {
        let raw = vec!["County", " b\n", "", "c  d", "County"];
        let cleaned = clean_headers(&raw);
        assert_eq!(cleaned.len(), raw.len());
        assert_eq!(cleaned, vec!["County", "b", "", "c d", "County"]);
    }

    #[test]
    fn test_disambiguate_headers() {
        let headers = vec![
            "County".to_string(),
            "Score".to_string(),
            "".to_string(),
            "Score".to_string(),
            "Score".to_string(),
        ];
        assert_eq!(
            disambiguate_headers(headers),
            vec!["County", "Score", "Unnamed: 2", "Score.1", "Score.2"]
        );
    }

    #[test]
    fn test_disambiguate_headers_avoids_existing_suffix() {
        let headers = vec!["A".to_string(), "A.1".to_string(), "A".to_string()];
        assert_eq!(disambiguate_headers(headers), vec!["A", "A.1", "A.2"]);
    }
}
