//! Maps flat change records into the shapes served to clients.

use std::collections::HashMap;

use market_core::{industry_color, ChangeRecord};

use crate::models::IndustryChange;
use crate::series::{cmp_desc_nulls_last, TOP_N};

/// How records are routed into the named slots of a pivoted row.
#[derive(Debug, Clone)]
pub enum PivotMode {
    /// Slot `i` takes the record whose prior date equals `anchors[i]`.
    /// Coinciding anchors fill several slots from one record.
    ByOffset(Vec<String>),
    /// Slot `i` takes the record whose report line matches `labels[i]`, ignoring case.
    ByLabel(Vec<String>),
}

impl PivotMode {
    pub fn depth(&self) -> usize {
        match self {
            PivotMode::ByOffset(slots) | PivotMode::ByLabel(slots) => slots.len(),
        }
    }

    fn slots_for(&self, record: &ChangeRecord) -> Vec<usize> {
        let (slots, key) = match self {
            PivotMode::ByOffset(anchors) => (anchors, record.prior_date.as_deref()),
            PivotMode::ByLabel(labels) => (labels, record.report.as_deref()),
        };
        let Some(key) = key else {
            return Vec::new();
        };
        let by_label = matches!(self, PivotMode::ByLabel(_));
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                if by_label {
                    slot.to_lowercase() == key.to_lowercase()
                } else {
                    slot.as_str() == key
                }
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// One entity with its pivoted changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub entity: String,
    pub slots: Vec<Option<f64>>,
}

impl PivotRow {
    pub fn slot(&self, i: usize) -> Option<f64> {
        self.slots.get(i).copied().flatten()
    }
}

/// Entities keep the order in which they first appear in `records`.
pub fn pivot(records: &[ChangeRecord], mode: &PivotMode) -> Vec<PivotRow> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut rows: Vec<PivotRow> = Vec::new();

    for record in records {
        let slots = mode.slots_for(record);
        if slots.is_empty() {
            continue;
        }
        let at = *index.entry(record.entity.as_str()).or_insert_with(|| {
            rows.push(PivotRow {
                entity: record.entity.clone(),
                slots: vec![None; mode.depth()],
            });
            rows.len() - 1
        });
        for slot in slots {
            rows[at].slots[slot] = record.percent_change;
        }
    }
    rows
}

/// One output record per (date, industry), keeping record order.
pub fn to_series(records: &[ChangeRecord]) -> Vec<IndustryChange> {
    records
        .iter()
        .map(|r| IndustryChange {
            date: r.date.clone(),
            industry: r.entity.clone(),
            color: industry_color(&r.entity).to_string(),
            per_change: r.percent_change,
        })
        .collect()
}

/// Sort by `primary` descending (undefined last), then code ascending, and keep the top rows.
pub fn rank_top<T, P, C>(mut items: Vec<T>, limit: usize, primary: P, code: C) -> Vec<T>
where
    P: Fn(&T) -> Option<f64>,
    C: Fn(&T) -> &str,
{
    items.sort_by(|a, b| {
        cmp_desc_nulls_last(primary(a), primary(b)).then_with(|| code(a).cmp(code(b)))
    });
    items.truncate(limit.min(TOP_N));
    items
}
