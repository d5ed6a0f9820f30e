use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value as JsonValue;

fn string_field<'a>(row: &'a JsonValue, key: &str) -> Option<&'a str> {
    let v = row.get(key)?.as_str()?.trim();
    (!v.is_empty()).then_some(v)
}

fn numeric_field(row: &JsonValue, key: &str) -> Option<f64> {
    let v = string_field(row, key)?.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Mean over the cells of `key` that parse as finite numbers; `None` when
/// no cell does.
pub fn column_average(rows: &[JsonValue], key: &str) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for row in rows {
        if let Some(v) = numeric_field(row, key) {
            sum += v;
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePoolMeta {
    pub updated_at: Option<String>,
    pub total: usize,
    pub avg_amount_60: Option<f64>,
    pub avg_trade_ratio_60: Option<f64>,
    pub avg_range_60: Option<f64>,
}

pub fn active_pool_meta(rows: &[JsonValue], updated_at: Option<String>) -> ActivePoolMeta {
    ActivePoolMeta {
        updated_at,
        total: rows.len(),
        avg_amount_60: column_average(rows, "mean_amount_60"),
        avg_trade_ratio_60: column_average(rows, "trade_days_ratio_60"),
        avg_range_60: column_average(rows, "median_range_60"),
    }
}

// Compact `YYYYMMDD` with ISO `YYYY-MM-DD` as a fallback. Invalid calendar
// dates, including the `00000000` placeholder, parse to `None`.
pub fn parse_list_date(raw: &str) -> Option<NaiveDate> {
    let v = raw.trim();
    if v.len() == 8 && v.bytes().all(|b| b.is_ascii_digit()) {
        let year = v[0..4].parse().ok()?;
        let month = v[4..6].parse().ok()?;
        let day = v[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPoolMeta {
    pub updated_at: Option<String>,
    pub new_within_30d: usize,
    pub anomaly_count: usize,
}

// `today` is injected so the 30-day listing window is testable; the handler
// passes the current UTC date.
pub fn full_pool_meta(
    rows: &[JsonValue],
    today: NaiveDate,
    updated_at: Option<String>,
) -> FullPoolMeta {
    let threshold = today - Duration::days(30);
    let new_within_30d = rows
        .iter()
        .filter(|row| {
            string_field(row, "list_date")
                .and_then(parse_list_date)
                .map(|d| d >= threshold)
                .unwrap_or(false)
        })
        .count();
    let anomaly_count = rows
        .iter()
        .filter(|row| string_field(row, "ts_code").is_none() || string_field(row, "name").is_none())
        .count();
    FullPoolMeta {
        updated_at,
        new_within_30d,
        anomaly_count,
    }
}
