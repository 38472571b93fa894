use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const DEFAULT_CHAT_ALLOCATION: &str = "General Allocation";

static MARKED_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:£|gbp)\s?([0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)(?:\.([0-9]{1,2}))?")
        .expect("marked amount pattern")
});
static BARE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)(?:\.([0-9]{1,2}))?")
        .expect("bare amount pattern")
});
static CHAT_ALLOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bto\s+([a-z0-9\s-]+?)(?:[.?!]|$)").expect("chat allocation pattern")
});

/// Reads a money amount from a receipt total such as `£1,234.50`,
/// `GBP 12` or `12.3`. A currency-marked figure wins over an earlier bare
/// number; pence are kept exactly as written.
pub fn parse_currency_amount(text: &str) -> Option<f64> {
    let caps = MARKED_AMOUNT
        .captures(text)
        .or_else(|| BARE_AMOUNT.captures(text))?;
    amount_from(&caps)
}

fn amount_from(caps: &Captures<'_>) -> Option<f64> {
    let whole = caps.get(1)?.as_str().replace(',', "");
    let rendered = match caps.get(2) {
        Some(pence) => format!("{whole}.{}", pence.as_str()),
        None => whole,
    };
    rendered.parse::<f64>().ok().filter(|amount| amount.is_finite())
}

/// A spend mentioned in a chat message, e.g. "Send £500 to the lifeboat fund."
#[derive(Debug, Clone, PartialEq)]
pub struct Spend {
    pub amount: f64,
    pub allocation: String,
}

pub fn extract_spend(text: &str) -> Option<Spend> {
    let amount = amount_from(&MARKED_AMOUNT.captures(text)?)?;
    let allocation = CHAT_ALLOCATION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().trim().to_string())
        .filter(|allocation| !allocation.is_empty())
        .unwrap_or_else(|| DEFAULT_CHAT_ALLOCATION.to_string());
    Some(Spend { amount, allocation })
}

#[cfg(test)]
mod tests {
    use super::{extract_spend, parse_currency_amount, Spend, DEFAULT_CHAT_ALLOCATION};

    #[test]
    fn receipt_totals_parse_with_pence_preserved() {
        assert_eq!(parse_currency_amount("£45.00"), Some(45.0));
        assert_eq!(parse_currency_amount("£12.3"), Some(12.3));
        assert_eq!(parse_currency_amount("GBP 7.99"), Some(7.99));
        assert_eq!(parse_currency_amount("gbp12"), Some(12.0));
        assert_eq!(parse_currency_amount("£1,234.50"), Some(1234.5));
        assert_eq!(parse_currency_amount("Total 19.95"), Some(19.95));
    }

    #[test]
    fn marked_amount_beats_earlier_bare_number() {
        assert_eq!(parse_currency_amount("2 items, total £8.40"), Some(8.4));
    }

    #[test]
    fn unparseable_totals_yield_none() {
        assert_eq!(parse_currency_amount("free"), None);
        assert_eq!(parse_currency_amount(""), None);
    }

    #[test]
    fn chat_spend_reads_amount_and_allocation() {
        assert_eq!(
            extract_spend("Allocate £500 to the lifeboat fund."),
            Some(Spend {
                amount: 500.0,
                allocation: "the lifeboat fund".to_string()
            })
        );
        assert_eq!(
            extract_spend("I spent GBP 12.50 today"),
            Some(Spend {
                amount: 12.5,
                allocation: DEFAULT_CHAT_ALLOCATION.to_string()
            })
        );
        assert_eq!(extract_spend("no money mentioned"), None);
    }

    #[test]
    fn chat_spend_keeps_thousands() {
        assert_eq!(
            extract_spend("Wire £1,500 to the harbour wall."),
            Some(Spend {
                amount: 1500.0,
                allocation: "the harbour wall".to_string()
            })
        );
    }

    #[test]
    fn allocation_needs_a_standalone_to() {
        let into = extract_spend("Put £5 into savings.").map(|spend| spend.allocation);
        assert_eq!(into.as_deref(), Some(DEFAULT_CHAT_ALLOCATION));
        let auto = extract_spend("Paid £30 for the auto repair.").map(|spend| spend.allocation);
        assert_eq!(auto.as_deref(), Some(DEFAULT_CHAT_ALLOCATION));
    }
}
