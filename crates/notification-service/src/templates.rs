use crate::TickerAlert;

pub struct EmailTemplate;

impl EmailTemplate {
    pub fn subject(alert: &TickerAlert) -> String {
        format!("New Stock Ticker Alert: {}", alert.symbol_list())
    }

    /// Plain-text body, one symbol per line.
    pub fn render(alert: &TickerAlert) -> String {
        format!(
            "The following new stock tickers were found in recent posts:\n\n{}\n\nSent at {} UTC\n",
            alert.symbols.join("\n"),
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_lists_symbols() {
        let alert = TickerAlert::new(vec!["$AAPL".into(), "$NVDA".into()]);
        assert_eq!(
            EmailTemplate::subject(&alert),
            "New Stock Ticker Alert: $AAPL, $NVDA"
        );
    }

    #[test]
    fn test_body_one_symbol_per_line() {
        let alert = TickerAlert::new(vec!["$AAPL".into(), "$NVDA".into()]);
        let body = EmailTemplate::render(&alert);
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines[0], "The following new stock tickers were found in recent posts:");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "$AAPL");
        assert_eq!(lines[3], "$NVDA");
        assert!(lines.last().unwrap().starts_with("Sent at "));
    }
}
