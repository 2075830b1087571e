//! Statement builders for the aggregation engine.
//!
//! Every statement joins a fact table `t` to `ticker_info i` and carries the
//! exchange/industry/security-type predicates. Identifiers come from the metric
//! catalogue; dates, labels and codes are always bound.

use market_core::{ChangeRecord, FilterSpec, Placeholder, Row};

use crate::filter::push_filter_predicates;
use crate::metrics::{Entity, Measure};
use crate::series::SeriesPoint;
use crate::sql::SqlBuilder;

/// `SELECT d, entity[, report], v` summed per date and entity at the given dates.
fn push_aggregate(
    b: &mut SqlBuilder,
    measure: Measure,
    entity: Entity,
    filter: &FilterSpec,
    dates: &[String],
) {
    let date = measure.date_column();
    let group = entity.column();

    b.push(&format!("SELECT t.{date} AS d, {group} AS entity"));
    if measure.has_report_lines() {
        b.push(", LOWER(t.report_name) AS report");
    }
    b.push(&format!(
        ", SUM(t.{}) AS v FROM {} t INNER JOIN ticker_info i ON i.code = t.code WHERE t.{date} IN ",
        measure.value_column(),
        measure.table()
    ))
    .push_in(dates.iter().map(String::as_str));

    push_filter_predicates(b, filter, "i");

    match measure {
        Measure::Trade(_) => {}
        Measure::Ratio(code) => {
            b.push(" AND t.ratio_code = ").push_bind(code);
        }
        Measure::Report(lines) => {
            b.push(" AND LOWER(t.report_name) IN ")
                .push_in(lines.iter().map(|l| l.to_lowercase()));
        }
    }

    b.push(&format!(" GROUP BY t.{date}, {group}"));
    if measure.has_report_lines() {
        b.push(", LOWER(t.report_name)");
    }
}

/// Current-vs-prior join. `strict` requires the current date to be later than the prior one.
pub fn comparison_query(
    placeholder: Placeholder,
    measure: Measure,
    entity: Entity,
    filter: &FilterSpec,
    current: &[String],
    prior: &[String],
    strict: bool,
) -> SqlBuilder {
    let with_report = measure.has_report_lines();
    let mut b = SqlBuilder::new(placeholder);

    b.push("SELECT cur.d AS period, prev.d AS prior_period, cur.entity AS entity");
    if with_report {
        b.push(", cur.report AS report");
    }
    b.push(", prev.v AS prior_value, cur.v AS current_value FROM (");
    push_aggregate(&mut b, measure, entity, filter, current);
    b.push(") AS cur INNER JOIN (");
    push_aggregate(&mut b, measure, entity, filter, prior);
    b.push(if strict { ") AS prev ON cur.d > prev.d" } else { ") AS prev ON cur.d >= prev.d" });
    b.push(" AND cur.entity = prev.entity");
    if with_report {
        b.push(" AND cur.report = prev.report");
    }
    b
}

/// Raw per-date values for lag series.
pub fn series_query(
    placeholder: Placeholder,
    measure: Measure,
    entity: Entity,
    filter: &FilterSpec,
    dates: &[String],
) -> SqlBuilder {
    let mut b = SqlBuilder::new(placeholder);
    push_aggregate(&mut b, measure, entity, filter, dates);
    b
}

/// Advance/decline/ceiling/floor counts per industry between two sessions.
pub fn breadth_counts_query(
    placeholder: Placeholder,
    filter: &FilterSpec,
    latest: &str,
    previous: &str,
) -> SqlBuilder {
    let mut b = SqlBuilder::new(placeholder);
    b.push(
        "SELECT i.industry AS industry, \
         SUM(CASE WHEN t.close_price > prev.close_price THEN 1 ELSE 0 END) AS increase, \
         SUM(CASE WHEN t.close_price < prev.close_price THEN 1 ELSE 0 END) AS decrease, \
         SUM(CASE WHEN t.close_price = prev.close_price THEN 1 ELSE 0 END) AS equal, \
         SUM(CASE WHEN t.close_price >= t.ceiling_price THEN 1 ELSE 0 END) AS high, \
         SUM(CASE WHEN t.close_price <= t.floor_price THEN 1 ELSE 0 END) AS low \
         FROM ticker_trade t \
         INNER JOIN ticker_trade prev ON prev.code = t.code AND prev.trade_date = ",
    )
    .push_bind(previous)
    .push(" INNER JOIN ticker_info i ON i.code = t.code WHERE t.trade_date = ")
    .push_bind(latest);
    push_filter_predicates(&mut b, filter, "i");
    b.push(" GROUP BY i.industry");
    b
}

/// Per-ticker close prices at the given sessions.
pub fn closes_query(placeholder: Placeholder, filter: &FilterSpec, dates: &[String]) -> SqlBuilder {
    let mut b = SqlBuilder::new(placeholder);
    b.push(
        "SELECT t.code AS code, i.industry AS industry, t.trade_date AS d, t.close_price AS v \
         FROM ticker_trade t INNER JOIN ticker_info i ON i.code = t.code WHERE t.trade_date IN ",
    )
    .push_in(dates.iter().map(String::as_str));
    push_filter_predicates(&mut b, filter, "i");
    b
}

pub fn decode_change(row: &Row) -> Option<ChangeRecord> {
    let record = ChangeRecord::new(
        row.text("period")?,
        row.text("entity")?,
        row.f64("prior_value"),
        row.f64("current_value"),
    );
    Some(
        record
            .with_prior_date(row.text("prior_period"))
            .with_report(row.text("report")),
    )
}

pub fn decode_point(row: &Row) -> Option<SeriesPoint> {
    Some(SeriesPoint {
        date: row.text("d")?,
        entity: row.text("entity")?,
        report: row.text("report"),
        value: row.f64("v"),
    })
}
