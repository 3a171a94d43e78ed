//! Search aggregation and selection.
//!
//! Merges result groups across queries with stable canonical-URL dedupe,
//! applies the language preference, filters thin snippets, and caps per
//! registrable domain and in total. Pure functions over in-memory data.

use std::collections::HashMap;

use url::Url;

use super::SearchResult;

/// Selection limits and preferences.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    /// Maximum results overall.
    pub max_total: usize,
    /// Maximum results per registrable domain (eTLD+1).
    pub per_domain: usize,
    /// Minimum non-whitespace snippet length.
    pub min_snippet_chars: usize,
    /// Preferred language code (e.g. `en`); matching results rank first.
    pub preferred_language: Option<String>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            max_total: 12,
            per_domain: 3,
            min_snippet_chars: 40,
            preferred_language: None,
        }
    }
}

/// Canonicalizes a URL for dedupe keys: lowercase scheme and host, no
/// fragment, default ports dropped, and no trailing slash on path-only
/// URLs. Returns `None` for unparseable or non-http(s) URLs.
#[must_use]
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    let mut serialized = parsed.to_string();
    if parsed.path() == "/" && parsed.query().is_none() {
        serialized.truncate(serialized.len() - 1);
    }
    Some(serialized)
}

/// Second-level suffixes where the registrable domain spans three labels.
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "co.jp", "ne.jp", "or.jp", "ac.jp", "com.au",
    "net.au", "org.au", "edu.au", "gov.au", "co.nz", "org.nz", "com.br", "com.cn", "com.sg",
    "com.tw", "co.in", "co.kr", "co.za", "com.mx", "com.ar",
];

/// Derives the registrable domain (eTLD+1) from a host.
///
/// Uses a compact second-level-suffix table plus a last-two-labels
/// fallback rather than a full public-suffix list. IP literals and
/// single-label hosts are returned unchanged.
#[must_use]
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }
    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if SECOND_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len().saturating_sub(keep)..].join(".")
}

/// Merges result groups in input order, deduping by canonical URL and
/// keeping the earliest occurrence. Results with unusable URLs are
/// dropped. The canonical form replaces each kept result's URL.
#[must_use]
pub fn merge_results(groups: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut seen: HashMap<String, ()> = HashMap::new();
    let mut merged = Vec::new();
    for group in groups {
        for mut result in group {
            let Some(canonical) = canonical_url(&result.url) else {
                continue;
            };
            if seen.insert(canonical.clone(), ()).is_none() {
                result.url = canonical;
                merged.push(result);
            }
        }
    }
    merged
}

/// Applies the selection policy: language preference ordering, minimum
/// snippet filter, per-domain cap, and total cap. Ordering is stable with
/// ties broken by original position.
#[must_use]
pub fn select(results: Vec<SearchResult>, policy: &SelectionPolicy) -> Vec<SearchResult> {
    let filtered: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| {
            r.snippet.chars().filter(|c| !c.is_whitespace()).count() >= policy.min_snippet_chars
        })
        .collect();

    let ordered: Vec<SearchResult> = match policy.preferred_language.as_deref() {
        Some(lang) => {
            let (matching, other): (Vec<_>, Vec<_>) = filtered
                .into_iter()
                .partition(|r| matches_language(&format!("{} {}", r.title, r.snippet), lang));
            matching.into_iter().chain(other).collect()
        }
        None => filtered,
    };

    let mut per_domain: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::new();
    for result in ordered {
        if selected.len() >= policy.max_total {
            break;
        }
        let host = Url::parse(&result.url)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_default();
        let domain = registrable_domain(&host);
        let count = per_domain.entry(domain).or_insert(0);
        if *count >= policy.per_domain {
            continue;
        }
        *count += 1;
        selected.push(result);
    }
    selected
}

/// Tiny stopword lists for the language preference heuristic.
const LANGUAGE_STOPWORDS: &[(&str, &[&str])] = &[
    ("en", &[" the ", " and ", " of ", " to ", " is ", " in "]),
    ("de", &[" der ", " die ", " das ", " und ", " ist ", " nicht "]),
    ("fr", &[" le ", " la ", " les ", " et ", " est ", " dans "]),
    ("es", &[" el ", " la ", " los ", " y ", " es ", " en "]),
    ("it", &[" il ", " la ", " di ", " che ", " e ", " per "]),
];

/// Rough language check: at least two of the language's common stopwords
/// occur in the text. Unknown languages always match so the preference
/// degrades to a no-op instead of hiding results.
#[must_use]
pub fn matches_language(text: &str, lang: &str) -> bool {
    let Some(&(_, stopwords)) = LANGUAGE_STOPWORDS
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(lang))
    else {
        return true;
    };
    let padded = format!(" {} ", text.to_lowercase());
    stopwords.iter().filter(|w| padded.contains(**w)).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn result(url: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: "Title".to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            source: "test".to_string(),
        }
    }

    fn long_snippet() -> String {
        "a sufficiently long snippet describing the result content in detail".to_string()
    }

    #[test]
    fn test_canonical_url_normalizes() {
        assert_eq!(
            canonical_url("HTTP://Example.COM:80/"),
            Some("http://example.com".to_string())
        );
        assert_eq!(
            canonical_url("https://example.com:443/path#frag"),
            Some("https://example.com/path".to_string())
        );
        assert_eq!(
            canonical_url("https://example.com/path?q=1#frag"),
            Some("https://example.com/path?q=1".to_string())
        );
        assert_eq!(canonical_url("ftp://example.com/x"), None);
        assert_eq!(canonical_url("not a url"), None);
    }

    #[test]
    fn test_canonical_url_keeps_non_default_port() {
        assert_eq!(
            canonical_url("http://example.com:8080/x"),
            Some("http://example.com:8080/x".to_string())
        );
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
        assert_eq!(registrable_domain("192.168.0.1"), "192.168.0.1");
    }

    #[test]
    fn test_merge_dedupes_by_canonical_url_keeping_earliest() {
        let merged = merge_results(vec![
            vec![result("https://example.com/a", "one")],
            vec![
                result("https://example.com/a#section", "duplicate"),
                result("https://example.com/b", "two"),
            ],
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].snippet, "one");
        assert_eq!(merged[1].url, "https://example.com/b");
    }

    #[test]
    fn test_select_enforces_min_snippet() {
        let policy = SelectionPolicy {
            min_snippet_chars: 10,
            ..SelectionPolicy::default()
        };
        let out = select(
            vec![
                result("https://a.example/1", "tiny"),
                result("https://a.example/2", "long enough snippet here"),
            ],
            &policy,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://a.example/2");
    }

    #[test]
    fn test_select_caps_per_domain() {
        let policy = SelectionPolicy {
            per_domain: 2,
            min_snippet_chars: 1,
            ..SelectionPolicy::default()
        };
        let out = select(
            vec![
                result("https://news.example.com/1", &long_snippet()),
                result("https://blog.example.com/2", &long_snippet()),
                result("https://example.com/3", &long_snippet()),
                result("https://other.example/4", &long_snippet()),
            ],
            &policy,
        );
        // example.com counts subdomains toward the same registrable domain.
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].url, "https://other.example/4");
    }

    #[test]
    fn test_select_caps_total_and_preserves_order() {
        let policy = SelectionPolicy {
            max_total: 2,
            per_domain: 10,
            min_snippet_chars: 1,
            preferred_language: None,
        };
        let out = select(
            vec![
                result("https://a.example/1", &long_snippet()),
                result("https://b.example/2", &long_snippet()),
                result("https://c.example/3", &long_snippet()),
            ],
            &policy,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://a.example/1");
        assert_eq!(out[1].url, "https://b.example/2");
    }

    #[test]
    fn test_language_preference_reorders_stably() {
        let policy = SelectionPolicy {
            min_snippet_chars: 1,
            preferred_language: Some("en".to_string()),
            ..SelectionPolicy::default()
        };
        let out = select(
            vec![
                result("https://a.example/de", "der Hund ist nicht da und die Katze"),
                result("https://b.example/en1", "the cat is in the house and happy"),
                result("https://c.example/en2", "the dog is out of the yard today"),
            ],
            &policy,
        );
        assert_eq!(out[0].url, "https://b.example/en1");
        assert_eq!(out[1].url, "https://c.example/en2");
        assert_eq!(out[2].url, "https://a.example/de");
    }

    #[test]
    fn test_unknown_language_matches_everything() {
        assert!(matches_language("whatever text", "tlh"));
    }

    proptest! {
        #[test]
        fn prop_selection_respects_caps(
            urls in proptest::collection::vec("[a-f]{1,6}", 0..30),
            max_total in 1usize..10,
            per_domain in 1usize..4,
        ) {
            let results: Vec<SearchResult> = urls
                .iter()
                .enumerate()
                .map(|(i, host)| result(
                    &format!("https://{host}.example.com/{i}"),
                    "a sufficiently long snippet for the filter to keep",
                ))
                .collect();
            let policy = SelectionPolicy {
                max_total,
                per_domain,
                min_snippet_chars: 10,
                preferred_language: None,
            };
            let selected = select(results, &policy);

            prop_assert!(selected.len() <= max_total);
            let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
            for r in &selected {
                let host = url::Url::parse(&r.url)
                    .ok()
                    .and_then(|u| u.host_str().map(ToString::to_string))
                    .unwrap_or_default();
                *counts.entry(registrable_domain(&host)).or_insert(0) += 1;
            }
            for count in counts.values() {
                prop_assert!(*count <= per_domain);
            }
        }
    }
}
