use anyhow::Result;
use scraper::{Html, Selector};

/// Trimmed cells of the matching price-table row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPriceRow {
    pub name: String,
    pub buy: Option<String>,
    pub sell: Option<String>,
}

// ── Price table ───────────────────────────────────────────────────────────────

/// Find the row whose first cell contains `label`. Layout: Name | Buy | Sell.
/// When several rows match, the last one wins.
pub fn parse_price_table(html: &str, label: &str) -> Result<Option<RawPriceRow>> {
    let doc = Html::parse_document(html);

    let row_sel = Selector::parse("table tbody tr")
        .map_err(|e| anyhow::anyhow!("row selector: {:?}", e))?;
    let td_sel = Selector::parse("td")
        .map_err(|e| anyhow::anyhow!("td selector: {:?}", e))?;

    let mut found = None;

    for tr in doc.select(&row_sel) {
        let cells: Vec<String> = tr
            .select(&td_sel)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();

        let Some(name) = cells.first() else { continue };
        if !name.contains(label) {
            continue;
        }

        found = Some(RawPriceRow {
            name: name.clone(),
            buy: cells.get(1).cloned(),
            sell: cells.get(2).cloned(),
        });
    }

    Ok(found)
}
