mod currency;
mod store;

use serde_json::json;

use crate::components::{format_gbp, ComponentId};
use crate::payload::A2uiPayload;

pub use currency::{extract_spend, parse_currency_amount, Spend, DEFAULT_CHAT_ALLOCATION};
pub use store::{
    JsonLedgerStore, LedgerEntry, LedgerStore, NewLedgerEntry, SignOutcome, DEFAULT_VERIFIER,
    UNKNOWN_VENDOR,
};

pub const DEFAULT_FETCH_LIMIT: usize = 10;
pub const ARCHIVE_HEADER: &str = "SEAVIEW LEDGER ARCHIVES";
pub const EMPTY_LEDGER_SUMMARY: &str =
    "The ledger is currently empty. No spending records found in the Seaview archives.";

/// The tool-facing text returned by `fetch_ledger`.
pub fn format_ledger_summary(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_LEDGER_SUMMARY.to_string();
    }
    let formatted = entries
        .iter()
        .map(|entry| {
            format!(
                "{}: {} [{}] on {}",
                entry.merchant,
                format_gbp(entry.amount_gbp),
                entry.allocation,
                entry.date
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("Found {} ledger entries: {formatted}", entries.len())
}

pub fn archive_lines(entries: &[LedgerEntry]) -> Vec<String> {
    let mut lines = vec![
        format!("PROVISIONING HISTORY: {} ENTRIES RECOVERED", entries.len()),
        String::new(),
    ];
    lines.extend(entries.iter().map(|entry| {
        format!(
            "{} | {} | {}",
            format_gbp(entry.amount_gbp),
            entry.merchant,
            entry.allocation
        )
    }));
    lines.push(String::new());
    lines.push("LEDGER INTEGRITY: VERIFIED".to_string());
    lines
}

pub fn archive_payload(entries: &[LedgerEntry]) -> A2uiPayload {
    A2uiPayload::new(
        ComponentId::BunkerTerminal,
        json!({"header": ARCHIVE_HEADER, "lines": archive_lines(entries)}),
    )
}

/// The wall card for one entry.
pub fn ledger_payload(entry: &LedgerEntry) -> A2uiPayload {
    let mut props = json!({
        "date": entry.date,
        "amountGBP": entry.amount_gbp,
        "allocation": entry.allocation,
        "verifiedBy": entry.verified_by,
        "entryId": entry.id,
    });
    if let (Some(at), Some(by), Some(map)) =
        (entry.signed_at, &entry.signed_by, props.as_object_mut())
    {
        map.insert("signedAt".to_string(), json!(at));
        map.insert("signedBy".to_string(), json!(by));
    }
    A2uiPayload::new(ComponentId::BunkerLedger, props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{resolve, Projection};
    use crate::rooms::UserId;

    fn entry(amount: f64, merchant: &str, allocation: &str) -> LedgerEntry {
        LedgerEntry {
            id: format!("id-{allocation}"),
            user_id: UserId::guest(),
            amount_gbp: amount,
            allocation: allocation.to_string(),
            merchant: merchant.to_string(),
            date: "2026-10-16".to_string(),
            scan_id: None,
            verified_by: DEFAULT_VERIFIER.to_string(),
            created_at: 0,
            signed_at: None,
            signed_by: None,
        }
    }

    #[test]
    fn summary_lists_entries_or_reports_empty() {
        assert_eq!(format_ledger_summary(&[]), EMPTY_LEDGER_SUMMARY);
        let text = format_ledger_summary(&[
            entry(45.0, "Harbour Stores", "Provisions"),
            entry(3.5, "Tide Café", "Morale"),
        ]);
        assert_eq!(
            text,
            "Found 2 ledger entries: Harbour Stores: £45.00 [Provisions] on 2026-10-16, \
             Tide Café: £3.50 [Morale] on 2026-10-16"
        );
    }

    #[test]
    fn archive_is_a_valid_terminal() {
        let payload = archive_payload(&[entry(45.0, "Harbour Stores", "Provisions")]);
        let Projection::Terminal(props) = resolve(&payload) else {
            panic!("archive should resolve to a terminal");
        };
        assert_eq!(props.header, ARCHIVE_HEADER);
        assert_eq!(props.lines[0], "PROVISIONING HISTORY: 1 ENTRIES RECOVERED");
        assert_eq!(props.lines[2], "£45.00 | Harbour Stores | Provisions");
        assert_eq!(props.lines.last().map(String::as_str), Some("LEDGER INTEGRITY: VERIFIED"));
    }

    #[test]
    fn ledger_card_carries_entry_id_and_signature() {
        let mut signed = entry(10.0, "Chandlery", "Rope");
        signed.signed_at = Some(99);
        signed.signed_by = Some("eleanor".to_string());
        let Projection::Ledger(props) = resolve(&ledger_payload(&signed)) else {
            panic!("ledger card should resolve");
        };
        assert_eq!(props.entry_id.as_deref(), Some("id-Rope"));
        assert_eq!(props.signed_by.as_deref(), Some("eleanor"));
        assert_eq!(props.amount_gbp, 10.0);
    }
}
