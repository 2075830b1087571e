//! Lag computation and deterministic ordering of change records.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use market_core::ChangeRecord;

/// Maximum rows returned by point-in-time comparisons.
pub const TOP_N: usize = 50;

/// One aggregated value before any comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub date: String,
    pub entity: String,
    pub report: Option<String>,
    pub value: Option<f64>,
}

/// Period-over-period change within each (entity, report) partition.
///
/// The first point of a partition has no prior and yields a `None` change.
pub fn lag_changes(points: Vec<SeriesPoint>) -> Vec<ChangeRecord> {
    let mut partitions: BTreeMap<(String, Option<String>), Vec<SeriesPoint>> = BTreeMap::new();
    for point in points {
        partitions
            .entry((point.entity.clone(), point.report.clone()))
            .or_default()
            .push(point);
    }

    let mut records = Vec::new();
    for ((entity, report), mut points) in partitions {
        points.sort_by(|a, b| a.date.cmp(&b.date));

        let mut prior: Option<&SeriesPoint> = None;
        for point in &points {
            let record = ChangeRecord::new(
                point.date.clone(),
                entity.clone(),
                prior.and_then(|p| p.value),
                point.value,
            )
            .with_prior_date(prior.map(|p| p.date.clone()))
            .with_report(report.clone());
            records.push(record);
            prior = Some(point);
        }
    }
    records
}

/// Descending with `None` last.
pub fn cmp_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Change descending (undefined last), then entity ascending, then date descending.
pub fn sort_point_in_time(records: &mut [ChangeRecord]) {
    records.sort_by(|a, b| {
        cmp_desc_nulls_last(a.percent_change, b.percent_change)
            .then_with(|| a.entity.cmp(&b.entity))
            .then_with(|| b.date.cmp(&a.date))
    });
}

/// Date ascending, then entity and report ascending.
pub fn sort_time_series(records: &mut [ChangeRecord]) {
    records.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.entity.cmp(&b.entity))
            .then_with(|| a.report.cmp(&b.report))
    });
}
