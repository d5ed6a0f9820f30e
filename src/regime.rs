use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Bull,
    Sideways,
    Bear,
}

impl Regime {
    pub fn label(&self) -> &'static str {
        match self {
            Regime::Bull => "Bull trend",
            Regime::Sideways => "Range-bound",
            Regime::Bear => "Bear trend",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Regime::Bull => "#15803d",
            Regime::Sideways => "#2563eb",
            Regime::Bear => "#b91c1c",
        }
    }

    // Unknown or missing labels classify as sideways.
    pub fn parse_or_default(raw: &str) -> Regime {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bull" => Regime::Bull,
            "bear" => Regime::Bear,
            _ => Regime::Sideways,
        }
    }
}

/// Reformats 8-digit dates as `YYYY-MM-DD`; anything else passes through.
pub fn normalize_date(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 8 {
        return raw.to_string();
    }
    format!("{}-{}-{}", &digits[0..4], &digits[4..6], &digits[6..8])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegimePoint {
    pub date: String,
    pub regime: Regime,
}

fn field<'a>(row: &'a JsonValue, key: &str) -> Option<&'a str> {
    let v = row.get(key)?.as_str()?.trim();
    (!v.is_empty()).then_some(v)
}

// Rows without a date are dropped. Equal dates keep their file order.
pub fn points_from_rows(rows: &[JsonValue]) -> Vec<RegimePoint> {
    let mut points: Vec<RegimePoint> = rows
        .iter()
        .filter_map(|row| {
            let date = field(row, "date")?;
            let regime = Regime::parse_or_default(field(row, "regime").unwrap_or(""));
            Some(RegimePoint {
                date: normalize_date(date),
                regime,
            })
        })
        .collect();
    points.sort_by(|a, b| a.date.cmp(&b.date));
    points
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub regime: Regime,
    pub start: String,
    pub end: String,
    // Points in the run, not calendar days.
    pub length: usize,
}

/// Run-length encode the sorted sequence into maximal segments.
pub fn segments(points: &[RegimePoint]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    let mut run: Option<Segment> = None;
    for p in points {
        match run.as_mut() {
            Some(seg) if seg.regime == p.regime => {
                seg.end = p.date.clone();
                seg.length += 1;
            }
            _ => {
                if let Some(done) = run.take() {
                    out.push(done);
                }
                run = Some(Segment {
                    regime: p.regime,
                    start: p.date.clone(),
                    end: p.date.clone(),
                    length: 1,
                });
            }
        }
    }
    if let Some(done) = run {
        out.push(done);
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegimeCounts {
    pub bull: usize,
    pub sideways: usize,
    pub bear: usize,
}

impl RegimeCounts {
    pub fn bump(&mut self, regime: Regime) {
        match regime {
            Regime::Bull => self.bull += 1,
            Regime::Sideways => self.sideways += 1,
            Regime::Bear => self.bear += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    // min(window, len)
    pub window_size: usize,
    pub counts: RegimeCounts,
}

pub fn distribution(points: &[RegimePoint], window: usize) -> Distribution {
    let tail = &points[points.len().saturating_sub(window)..];
    let mut counts = RegimeCounts::default();
    for p in tail {
        counts.bump(p.regime);
    }
    Distribution {
        window_size: tail.len(),
        counts,
    }
}

pub fn current_streak(points: &[RegimePoint]) -> usize {
    let Some(last) = points.last() else { return 0 };
    points
        .iter()
        .rev()
        .take_while(|p| p.regime == last.regime)
        .count()
}

// One row of the pipeline's published segments file. Only the latest record
// participates in the report, and only as the streak override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub regime: Regime,
    pub start: String,
    pub end: String,
    pub days: Option<usize>,
}

pub fn segment_records(rows: &[JsonValue]) -> Vec<SegmentRecord> {
    let mut records: Vec<SegmentRecord> = rows
        .iter()
        .filter_map(|row| {
            let start = field(row, "start")?;
            let end = field(row, "end")?;
            let regime = Regime::parse_or_default(field(row, "regime").unwrap_or(""));
            let days = field(row, "days").and_then(|v| v.parse::<usize>().ok());
            Some(SegmentRecord {
                regime,
                start: normalize_date(start),
                end: normalize_date(end),
                days,
            })
        })
        .collect();
    records.sort_by(|a, b| a.start.cmp(&b.start));
    records
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRegime {
    pub regime: Regime,
    pub regime_label: &'static str,
    pub date: String,
    pub since: String,
    pub streak_days: usize,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousRegime {
    pub regime: Regime,
    pub regime_label: &'static str,
    pub end: String,
    pub days: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    pub date: String,
    pub regime: Regime,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub window: usize,
    pub points: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub updated_at: Option<String>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeReport {
    pub current: CurrentRegime,
    pub previous: Option<PreviousRegime>,
    // The envelope key stays `distribution30d` even when the window is configured.
    #[serde(rename = "distribution30d")]
    pub distribution_30d: Distribution,
    pub history: History,
    pub meta: ReportMeta,
}

/// Build the report from sorted points. `published` overrides the streak
/// only when its regime matches the last point's; `None` on empty input.
pub fn summarize(
    points: &[RegimePoint],
    published: Option<&SegmentRecord>,
    history_window: usize,
    distribution_window: usize,
    updated_at: Option<String>,
) -> Option<RegimeReport> {
    let latest = points.last()?;
    let segs = segments(points);
    let current_seg = segs.last()?;

    let local_streak = current_streak(points);
    let streak_days = match published {
        Some(rec) if rec.regime == latest.regime => rec.days.unwrap_or(local_streak),
        _ => local_streak,
    };

    let previous = (segs.len() > 1).then(|| {
        let seg = &segs[segs.len() - 2];
        PreviousRegime {
            regime: seg.regime,
            regime_label: seg.regime.label(),
            end: seg.end.clone(),
            days: seg.length,
        }
    });

    let tail = &points[points.len().saturating_sub(history_window)..];
    let history = History {
        window: tail.len(),
        points: tail
            .iter()
            .map(|p| HistoryPoint {
                date: p.date.clone(),
                regime: p.regime,
                color: p.regime.color(),
            })
            .collect(),
    };

    Some(RegimeReport {
        current: CurrentRegime {
            regime: latest.regime,
            regime_label: latest.regime.label(),
            date: latest.date.clone(),
            since: current_seg.start.clone(),
            streak_days,
            summary: format!("{}, {}-day streak", latest.regime.label(), streak_days),
        },
        previous,
        distribution_30d: distribution(points, distribution_window),
        history,
        meta: ReportMeta {
            updated_at,
            total_rows: points.len(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pts(entries: &[(&str, Regime)]) -> Vec<RegimePoint> {
        entries
            .iter()
            .map(|(date, regime)| RegimePoint {
                date: date.to_string(),
                regime: *regime,
            })
            .collect()
    }

    fn sample_week() -> Vec<RegimePoint> {
        pts(&[
            ("2024-01-01", Regime::Bull),
            ("2024-01-02", Regime::Bull),
            ("2024-01-03", Regime::Sideways),
            ("2024-01-04", Regime::Bear),
            ("2024-01-05", Regime::Bear),
            ("2024-01-08", Regime::Bear),
        ])
    }

    #[test]
    fn normalize_date_compact_form() {
        assert_eq!(normalize_date("20240115"), "2024-01-15");
    }

    #[test]
    fn normalize_date_with_separators() {
        assert_eq!(normalize_date("2024/01/15"), "2024-01-15");
        assert_eq!(normalize_date("2024-01-15"), "2024-01-15");
    }

    #[test]
    fn normalize_date_passes_through_unrecognized() {
        assert_eq!(normalize_date("not-a-date"), "not-a-date");
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("202401"), "202401");
    }

    #[test]
    fn parse_or_default_falls_back_to_sideways() {
        assert_eq!(Regime::parse_or_default("bull"), Regime::Bull);
        assert_eq!(Regime::parse_or_default(" BEAR "), Regime::Bear);
        assert_eq!(Regime::parse_or_default("sideways"), Regime::Sideways);
        assert_eq!(Regime::parse_or_default("momentum"), Regime::Sideways);
        assert_eq!(Regime::parse_or_default(""), Regime::Sideways);
    }

    #[test]
    fn points_from_rows_applies_defaults_and_sorts() {
        let rows = vec![
            json!({"date": "20240103", "regime": "bear"}),
            json!({"date": "20240101", "regime": "bull"}),
            json!({"date": "20240102"}),
            json!({"date": "", "regime": "bull"}),
            json!({"regime": "bull"}),
        ];
        let points = points_from_rows(&rows);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, "2024-01-01");
        assert_eq!(points[1].regime, Regime::Sideways);
        assert_eq!(points[2].date, "2024-01-03");
    }

    #[test]
    fn points_from_rows_sorts_mixed_date_formats() {
        let rows = vec![
            json!({"date": "2024-01-03", "regime": "bear"}),
            json!({"date": "20240102", "regime": "bull"}),
        ];
        let points = points_from_rows(&rows);
        assert_eq!(points[0].date, "2024-01-02");
        assert_eq!(points[1].date, "2024-01-03");
    }

    #[test]
    fn points_from_rows_keeps_file_order_on_equal_dates() {
        let rows = vec![
            json!({"date": "20240102", "regime": "bear"}),
            json!({"date": "20240101", "regime": "bull"}),
            json!({"date": "20240101", "regime": "sideways"}),
        ];
        let points = points_from_rows(&rows);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, "2024-01-01");
        assert_eq!(points[0].regime, Regime::Bull);
        assert_eq!(points[1].date, "2024-01-01");
        assert_eq!(points[1].regime, Regime::Sideways);
        assert_eq!(points[2].date, "2024-01-02");
        let segs = segments(&points);
        assert_eq!(segs.len(), 3);
        let total: usize = segs.iter().map(|s| s.length).sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn segments_of_empty_input() {
        assert!(segments(&[]).is_empty());
    }

    #[test]
    fn segments_of_single_point() {
        let segs = segments(&pts(&[("2024-01-01", Regime::Bull)]));
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].start, "2024-01-01");
        assert_eq!(segs[0].end, "2024-01-01");
        assert_eq!(segs[0].length, 1);
    }

    #[test]
    fn segments_runs_are_maximal() {
        let segs = segments(&sample_week());
        assert_eq!(segs.len(), 3);
        assert_eq!(
            (segs[0].regime, segs[0].length, segs[0].end.as_str()),
            (Regime::Bull, 2, "2024-01-02")
        );
        assert_eq!((segs[1].regime, segs[1].length), (Regime::Sideways, 1));
        assert_eq!(
            (segs[2].regime, segs[2].start.as_str(), segs[2].length),
            (Regime::Bear, "2024-01-04", 3)
        );
        for pair in segs.windows(2) {
            assert_ne!(pair[0].regime, pair[1].regime);
        }
    }

    #[test]
    fn segments_partition_the_input() {
        let points = pts(&[
            ("2024-01-01", Regime::Bull),
            ("2024-01-02", Regime::Bear),
            ("2024-01-03", Regime::Bear),
            ("2024-01-04", Regime::Sideways),
            ("2024-01-05", Regime::Bull),
            ("2024-01-08", Regime::Bull),
            ("2024-01-09", Regime::Bear),
        ]);
        let segs = segments(&points);
        let total: usize = segs.iter().map(|s| s.length).sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn segments_flush_trailing_change() {
        // A regime change on the last point must still produce its segment.
        let segs = segments(&pts(&[
            ("2024-01-01", Regime::Bull),
            ("2024-01-02", Regime::Bull),
            ("2024-01-03", Regime::Bear),
        ]));
        assert_eq!(segs.len(), 2);
        assert_eq!((segs[1].regime, segs[1].length), (Regime::Bear, 1));
    }

    #[test]
    fn distribution_counts_trailing_window() {
        let points = sample_week();
        let dist = distribution(&points, 3);
        assert_eq!(dist.window_size, 3);
        assert_eq!(dist.counts.bear, 3);
        assert_eq!(dist.counts.bull, 0);
        assert_eq!(dist.counts.sideways, 0);
    }

    #[test]
    fn distribution_window_exceeding_input_uses_everything() {
        let points = sample_week();
        let dist = distribution(&points, 30);
        assert_eq!(dist.window_size, points.len());
        let counted = dist.counts.bull + dist.counts.sideways + dist.counts.bear;
        assert_eq!(counted, points.len());
    }

    #[test]
    fn distribution_of_empty_input() {
        let dist = distribution(&[], 30);
        assert_eq!(dist.window_size, 0);
        assert_eq!(dist.counts, RegimeCounts::default());
    }

    #[test]
    fn distribution_seeds_absent_regimes_with_zero() {
        let dist = distribution(&pts(&[("2024-01-01", Regime::Bull)]), 30);
        assert_eq!(dist.counts.bull, 1);
        assert_eq!(dist.counts.sideways, 0);
        assert_eq!(dist.counts.bear, 0);
        let out = serde_json::to_value(dist).unwrap();
        assert_eq!(out["counts"]["sideways"], 0);
        assert_eq!(out["counts"]["bear"], 0);
    }

    #[test]
    fn current_streak_scans_backwards() {
        assert_eq!(current_streak(&sample_week()), 3);
        assert_eq!(current_streak(&[]), 0);
        assert_eq!(current_streak(&pts(&[("2024-01-01", Regime::Bull)])), 1);
    }

    #[test]
    fn segment_records_filter_and_sort() {
        let rows = vec![
            json!({"regime": "bear", "start": "20240104", "end": "20240108", "days": "12"}),
            json!({"regime": "bull", "start": "20240101", "end": "20240102", "days": "2"}),
            json!({"regime": "sideways", "start": "", "end": "20240103"}),
            json!({"regime": "sideways", "start": "20240103", "end": "20240103", "days": "n/a"}),
        ];
        let records = segment_records(&rows);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].regime, Regime::Bull);
        assert_eq!(records[1].days, None);
        assert_eq!(records[2].start, "2024-01-04");
        assert_eq!(records[2].days, Some(12));
    }

    #[test]
    fn summarize_empty_input_is_none() {
        assert!(summarize(&[], None, 60, 30, None).is_none());
    }

    #[test]
    fn summarize_basic_report() {
        let report = summarize(&sample_week(), None, 60, 30, None).unwrap();
        assert_eq!(report.current.regime, Regime::Bear);
        assert_eq!(report.current.date, "2024-01-08");
        assert_eq!(report.current.since, "2024-01-04");
        assert_eq!(report.current.streak_days, 3);
        let prev = report.previous.unwrap();
        assert_eq!(prev.regime, Regime::Sideways);
        assert_eq!(prev.end, "2024-01-03");
        assert_eq!(prev.days, 1);
        assert_eq!(report.distribution_30d.counts.bull, 2);
        assert_eq!(report.meta.total_rows, 6);
    }

    #[test]
    fn summarize_single_run_has_no_previous() {
        let points = pts(&[
            ("2024-01-01", Regime::Bull),
            ("2024-01-02", Regime::Bull),
        ]);
        let report = summarize(&points, None, 60, 30, None).unwrap();
        assert!(report.previous.is_none());
        assert_eq!(report.current.since, "2024-01-01");
        assert_eq!(report.current.streak_days, 2);
    }

    #[test]
    fn summarize_history_is_capped() {
        let report = summarize(&sample_week(), None, 4, 30, None).unwrap();
        assert_eq!(report.history.window, 4);
        assert_eq!(report.history.points.len(), 4);
        assert_eq!(report.history.points[0].date, "2024-01-03");
        assert_eq!(report.history.points[0].color, "#2563eb");
    }

    #[test]
    fn summarize_override_wins_when_regimes_match() {
        let rec = SegmentRecord {
            regime: Regime::Bear,
            start: "2023-12-01".to_string(),
            end: "2024-01-08".to_string(),
            days: Some(12),
        };
        let report = summarize(&sample_week(), Some(&rec), 60, 30, None).unwrap();
        assert_eq!(report.current.streak_days, 12);
        // The published record never feeds `since`.
        assert_eq!(report.current.since, "2024-01-04");
    }

    #[test]
    fn summarize_override_ignored_on_regime_mismatch() {
        let rec = SegmentRecord {
            regime: Regime::Bull,
            start: "2023-12-01".to_string(),
            end: "2024-01-08".to_string(),
            days: Some(12),
        };
        let report = summarize(&sample_week(), Some(&rec), 60, 30, None).unwrap();
        assert_eq!(report.current.streak_days, 3);
    }

    #[test]
    fn summarize_override_without_days_falls_back() {
        let rec = SegmentRecord {
            regime: Regime::Bear,
            start: "2024-01-04".to_string(),
            end: "2024-01-08".to_string(),
            days: None,
        };
        let report = summarize(&sample_week(), Some(&rec), 60, 30, None).unwrap();
        assert_eq!(report.current.streak_days, 3);
    }

    #[test]
    fn summarize_is_deterministic() {
        let points = sample_week();
        let a = serde_json::to_value(summarize(&points, None, 60, 30, None).unwrap()).unwrap();
        let b = serde_json::to_value(summarize(&points, None, 60, 30, None).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn report_envelope_uses_camel_case_keys() {
        let stamp = Some("2024-01-08T09:30:00.000Z".to_string());
        let report = summarize(&sample_week(), None, 60, 30, stamp).unwrap();
        let out = serde_json::to_value(report).unwrap();
        assert_eq!(out["current"]["regime"], "bear");
        assert_eq!(out["current"]["streakDays"], 3);
        assert!(out["current"]["regimeLabel"].is_string());
        assert_eq!(out["distribution30d"]["windowSize"], 6);
        assert_eq!(out["history"]["window"], 6);
        assert_eq!(out["meta"]["updatedAt"], "2024-01-08T09:30:00.000Z");
        assert_eq!(out["meta"]["totalRows"], 6);
        assert_eq!(out["previous"]["days"], 1);
    }
}
