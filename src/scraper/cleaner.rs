use super::parsers::RawPriceRow;
use crate::models::Quote;
use tracing::warn;

// ── Token cleaning ────────────────────────────────────────────────────────────

/// Collapse inner whitespace runs and reject placeholder cells.
/// " 8.550.000 " → "8.550.000" | "—" → None
pub fn clean_price_token(s: &str) -> Option<String> {
    let token = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if token.is_empty() || token == "N/A" || token == "-" || token == "—" {
        return None;
    }
    Some(token)
}

// ── Raw row → Quote ───────────────────────────────────────────────────────────

pub fn row_to_quote(row: &RawPriceRow) -> Option<Quote> {
    let buy = row.buy.as_deref().and_then(clean_price_token);
    let sell = row.sell.as_deref().and_then(clean_price_token);

    match (buy, sell) {
        (Some(buy), Some(sell)) => Some(Quote::new(buy, sell)),
        _ => {
            warn!("Row {:?} is missing a buy or sell price", row.name);
            None
        }
    }
}
