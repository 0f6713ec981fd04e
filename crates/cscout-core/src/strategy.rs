use serde::{Deserialize, Serialize};

/// Maximum size of the combined keyword list, seed included.
pub const MAX_COMBINED_KEYWORDS: usize = 8;

const MIN_KEYWORD_LEN: usize = 3;
const MAX_KEYWORD_LEN: usize = 49;

/// Tokens the generation model sometimes leaves behind in place of a real
/// keyword; any candidate containing one is dropped.
const PLACEHOLDER_TOKENS: &[&str] = &["{seed}", "[keyword]", "keyword1", "keyword2", "..."];

/// A categorized keyword set expanded from one seed keyword.
///
/// `combined` is the working list the batch scheduler actually searches:
/// deduplicated case-insensitively, length-filtered, capped at
/// [`MAX_COMBINED_KEYWORDS`], and always beginning with the original seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordStrategy {
    pub seed: String,
    pub primary: Vec<String>,
    pub semantic: Vec<String>,
    pub trending: Vec<String>,
    pub niche: Vec<String>,
    pub combined: Vec<String>,
}

impl KeywordStrategy {
    /// Assembles a strategy from labeled groups, applying the combined-list
    /// post-processing rules.
    #[must_use]
    pub fn from_groups(
        seed: &str,
        primary: Vec<String>,
        semantic: Vec<String>,
        trending: Vec<String>,
        niche: Vec<String>,
    ) -> Self {
        let seed = seed.trim().to_owned();
        let mut combined = vec![seed.clone()];
        let mut seen = vec![seed.to_lowercase()];

        let groups = [&primary, &semantic, &trending, &niche];
        'outer: for group in groups {
            for candidate in group {
                if combined.len() >= MAX_COMBINED_KEYWORDS {
                    break 'outer;
                }
                let candidate = candidate.trim();
                if !is_usable_keyword(candidate) {
                    continue;
                }
                let folded = candidate.to_lowercase();
                if seen.contains(&folded) {
                    continue;
                }
                seen.push(folded);
                combined.push(candidate.to_owned());
            }
        }

        Self {
            seed,
            primary,
            semantic,
            trending,
            niche,
            combined,
        }
    }

    /// Deterministic strategy synthesized from simple seed variants, used
    /// whenever the generation model is unavailable so the pipeline never
    /// blocks on expansion.
    #[must_use]
    pub fn fallback(seed: &str) -> Self {
        let seed = seed.trim();
        Self::from_groups(
            seed,
            vec![format!("{seed} content"), format!("{seed} posts")],
            vec![format!("{seed} trends")],
            vec![format!("{seed} tips")],
            Vec::new(),
        )
    }
}

fn is_usable_keyword(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if !(MIN_KEYWORD_LEN..=MAX_KEYWORD_LEN).contains(&len) {
        return false;
    }
    let folded = candidate.to_lowercase();
    !PLACEHOLDER_TOKENS.iter().any(|t| folded.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn combined_starts_with_seed() {
        let s = KeywordStrategy::from_groups(
            "coffee roaster",
            strings(&["specialty coffee"]),
            strings(&["home brewing"]),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(s.combined[0], "coffee roaster");
        assert_eq!(s.combined.len(), 3);
    }

    #[test]
    fn combined_dedupes_case_insensitively() {
        let s = KeywordStrategy::from_groups(
            "coffee",
            strings(&["Coffee", "COFFEE", "espresso"]),
            strings(&["Espresso"]),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(s.combined, vec!["coffee", "espresso"]);
    }

    #[test]
    fn combined_drops_out_of_bounds_and_placeholder_entries() {
        let long = "x".repeat(50);
        let s = KeywordStrategy::from_groups(
            "coffee",
            strings(&["ab", &long, "{seed} ideas", "latte art"]),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(s.combined, vec!["coffee", "latte art"]);
    }

    #[test]
    fn combined_is_capped() {
        let many: Vec<String> = (0..20).map(|i| format!("keyword number {i}")).collect();
        let s = KeywordStrategy::from_groups("coffee", many, Vec::new(), Vec::new(), Vec::new());
        assert_eq!(s.combined.len(), MAX_COMBINED_KEYWORDS);
        assert_eq!(s.combined[0], "coffee");
    }

    #[test]
    fn fallback_is_nonempty_and_seed_first() {
        let s = KeywordStrategy::fallback("coffee roaster");
        assert!(!s.combined.is_empty());
        assert_eq!(s.combined[0], "coffee roaster");
        assert!(s.combined.contains(&"coffee roaster content".to_owned()));
        assert!(s.combined.contains(&"coffee roaster tips".to_owned()));
    }
}
