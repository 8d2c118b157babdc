use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// A cashtag: `$` followed by one to five uppercase letters ending at a word boundary.
static TICKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Z]{1,5}\b").expect("ticker pattern is valid"));

/// Unique cashtags found in `text`, sorted.
pub fn extract_tickers(text: &str) -> BTreeSet<String> {
    TICKER_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tickers(text: &str) -> Vec<String> {
        extract_tickers(text).into_iter().collect()
    }

    #[test]
    fn test_duplicates_collapse_and_long_symbols_rejected() {
        assert_eq!(tickers("Buy $AAPL and $AAPL now, also $TOOLONG1"), vec!["$AAPL"]);
    }

    #[test]
    fn test_multiple_symbols_sorted() {
        assert_eq!(
            tickers("$TSLA up, $AMD down, $A flat"),
            vec!["$A", "$AMD", "$TSLA"]
        );
    }

    #[test]
    fn test_case_sensitive() {
        assert!(tickers("watching $aapl and $Tsla").is_empty());
    }

    #[test]
    fn test_word_boundary_required() {
        // Six letters, trailing digit and trailing underscore all fail the boundary.
        assert!(tickers("$ABCDEF $ABC1 $ABC_").is_empty());
        // Punctuation is a boundary.
        assert_eq!(tickers("($MSFT), $GME. $BRK.B"), vec!["$BRK", "$GME", "$MSFT"]);
    }

    #[test]
    fn test_prices_are_not_tickers() {
        assert!(tickers("target $150, stop at $9.50").is_empty());
    }

    #[test]
    fn test_empty_text() {
        assert!(extract_tickers("").is_empty());
    }
}
