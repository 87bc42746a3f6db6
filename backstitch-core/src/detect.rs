//! Rollover anchor detection.
//!
//! Finds, per contract transition, the row at which the continuous series
//! should switch contracts: the per-date volume leader, corrected so the
//! series never rolls back to a younger contract, then pruned to one
//! anchor per contract.

use crate::error::ContinuousError;
use crate::frame::{self, DateKey};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};

/// Detect rollover anchors in a raw contract table.
///
/// The table must be ordered oldest contract first, then oldest date first
/// within a contract: row position stands in for contract age, which is
/// what the tie-break and the monotonicity correction lean on. Returns the
/// anchor row positions in ascending date order.
pub fn detect_rollover_anchors(
    df: &DataFrame,
    date_col: &str,
    volume_col: &str,
    contract_col: &str,
) -> Result<Vec<usize>, ContinuousError> {
    frame::require_columns(df, &[date_col, volume_col, contract_col])?;
    let dates = frame::date_keys(df, date_col)?;
    let volumes = frame::numeric_values(df, volume_col)?;
    let contracts = frame::contract_ids(df, contract_col)?;
    Ok(anchor_positions(&dates, &volumes, &contracts))
}

/// Core detection over extracted columns.
pub(crate) fn anchor_positions(
    dates: &[DateKey],
    volumes: &[f64],
    contracts: &[String],
) -> Vec<usize> {
    // One volume-leader candidate per distinct date. Ties break to the
    // earliest position (the older contract); a NaN volume never beats a
    // comparable one.
    let mut leaders: BTreeMap<&DateKey, (f64, usize)> = BTreeMap::new();
    for (pos, (date, &vol)) in dates.iter().zip(volumes).enumerate() {
        match leaders.get_mut(date) {
            None => {
                leaders.insert(date, (vol, pos));
            }
            Some(best) => {
                if vol > best.0 || (best.0.is_nan() && !vol.is_nan()) {
                    *best = (vol, pos);
                }
            }
        }
    }

    // Latest-to-earliest prefix minimum over candidate positions: once a
    // later date has committed to an older contract, no earlier date may
    // anchor a younger one.
    let mut corrected: Vec<usize> = Vec::with_capacity(leaders.len());
    let mut floor = usize::MAX;
    for &(_, pos) in leaders.values().rev() {
        floor = floor.min(pos);
        corrected.push(floor);
    }

    // One anchor per contract: scanning latest-first, the first candidate
    // carrying each contract survives.
    let mut seen: HashSet<&str> = HashSet::new();
    let mut anchors: Vec<usize> = corrected
        .into_iter()
        .filter(|&pos| seen.insert(contracts[pos].as_str()))
        .collect();
    anchors.reverse();
    anchors
}
