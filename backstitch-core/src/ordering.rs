//! Contract-age ordering: derivation, diagnostics, and canonical sort.
//!
//! The construction pipeline relies on a caller-enforced row order (oldest
//! contract first, dates ascending within a contract). Violations produce
//! wrong rollovers silently, so this module surfaces them as loud, non-fatal
//! diagnostics, and offers a canonical sort for tables assembled from
//! per-contract files in arbitrary order.

use crate::error::ContinuousError;
use crate::frame::{self, DateKey};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A detected violation of the ordering invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingAnomaly {
    pub kind: OrderingAnomalyKind,
    pub contract: String,
    pub row: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingAnomalyKind {
    /// A contract's dates decrease within its block.
    NonMonotonicDates,
    /// A contract's rows appear in more than one block.
    SplitContractBlock,
    /// A block starts on an earlier date than the block before it,
    /// suggesting the younger-positioned contract is actually older.
    ContractAgeInversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for OrderingAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OrderingAnomalyKind::NonMonotonicDates => write!(
                f,
                "contract '{}': dates not monotonically increasing at row {}",
                self.contract, self.row
            ),
            OrderingAnomalyKind::SplitContractBlock => write!(
                f,
                "contract '{}': rows split across non-adjacent blocks at row {}",
                self.contract, self.row
            ),
            OrderingAnomalyKind::ContractAgeInversion => write!(
                f,
                "contract '{}': block starting at row {} opens earlier than the previous block",
                self.contract, self.row
            ),
        }
    }
}

/// Check a raw table against the ordering invariant.
///
/// Returns diagnostics rather than failing: the pipeline may still run on
/// an ill-ordered table, it will just roll in the wrong places, and a loud
/// warning beats silent misbehavior.
pub fn ordering_anomalies(
    df: &DataFrame,
    date_col: &str,
    contract_col: &str,
) -> Result<Vec<OrderingAnomaly>, ContinuousError> {
    frame::require_columns(df, &[date_col, contract_col])?;
    let dates = frame::date_keys(df, date_col)?;
    let contracts = frame::contract_ids(df, contract_col)?;
    Ok(scan_ordering(&dates, &contracts))
}

fn scan_ordering(dates: &[DateKey], contracts: &[String]) -> Vec<OrderingAnomaly> {
    let mut anomalies = Vec::new();
    let mut closed_blocks: HashSet<&str> = HashSet::new();
    let mut block_start_date: Option<&DateKey> = None;
    let mut prev_block_start_date: Option<&DateKey> = None;

    for row in 0..dates.len() {
        let contract = contracts[row].as_str();
        let new_block = row == 0 || contracts[row - 1] != contracts[row];

        if new_block {
            if row > 0 {
                closed_blocks.insert(contracts[row - 1].as_str());
                prev_block_start_date = block_start_date;
            }
            block_start_date = Some(&dates[row]);

            if closed_blocks.contains(contract) {
                anomalies.push(OrderingAnomaly {
                    kind: OrderingAnomalyKind::SplitContractBlock,
                    contract: contract.to_string(),
                    row,
                    severity: Severity::Error,
                });
            }
            if let Some(prev_start) = prev_block_start_date {
                if dates[row] < *prev_start {
                    anomalies.push(OrderingAnomaly {
                        kind: OrderingAnomalyKind::ContractAgeInversion,
                        contract: contract.to_string(),
                        row,
                        severity: Severity::Warning,
                    });
                }
            }
        } else if dates[row] < dates[row - 1] {
            anomalies.push(OrderingAnomaly {
                kind: OrderingAnomalyKind::NonMonotonicDates,
                contract: contract.to_string(),
                row,
                severity: Severity::Warning,
            });
        }
    }

    anomalies
}

/// Explicit contract age ranks: 0 for the oldest contract, counting up.
///
/// Age is the contract's earliest observed date, ties broken by first
/// appearance in the table.
pub fn age_ranks(
    df: &DataFrame,
    date_col: &str,
    contract_col: &str,
) -> Result<HashMap<String, usize>, ContinuousError> {
    frame::require_columns(df, &[date_col, contract_col])?;
    let dates = frame::date_keys(df, date_col)?;
    let contracts = frame::contract_ids(df, contract_col)?;
    Ok(rank_by_age(&dates, &contracts))
}

fn rank_by_age(dates: &[DateKey], contracts: &[String]) -> HashMap<String, usize> {
    let mut earliest: HashMap<&str, (&DateKey, usize)> = HashMap::new();
    for (row, contract) in contracts.iter().enumerate() {
        let entry = earliest
            .entry(contract.as_str())
            .or_insert((&dates[row], row));
        if dates[row] < *entry.0 {
            *entry = (&dates[row], row);
        }
    }

    let mut by_age: Vec<(&str, (&DateKey, usize))> = earliest.into_iter().collect();
    by_age.sort_by(|a, b| a.1.cmp(&b.1));
    by_age
        .into_iter()
        .enumerate()
        .map(|(rank, (contract, _))| (contract.to_string(), rank))
        .collect()
}

/// Stable-sort a raw table into the load-bearing construction order:
/// oldest contract first (by derived age rank), then date ascending.
///
/// Row content is untouched; only order changes.
pub fn sort_for_construction(
    df: &DataFrame,
    date_col: &str,
    contract_col: &str,
) -> Result<DataFrame, ContinuousError> {
    frame::require_columns(df, &[date_col, contract_col])?;
    let dates = frame::date_keys(df, date_col)?;
    let contracts = frame::contract_ids(df, contract_col)?;
    let ranks = rank_by_age(&dates, &contracts);

    let mut perm: Vec<usize> = (0..df.height()).collect();
    perm.sort_by(|&a, &b| {
        ranks[&contracts[a]]
            .cmp(&ranks[&contracts[b]])
            .then_with(|| dates[a].cmp(&dates[b]))
            .then_with(|| a.cmp(&b))
    });

    let idx = IdxCa::from_vec(
        "rows".into(),
        perm.into_iter().map(|p| p as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}
