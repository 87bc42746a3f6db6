//! Back-adjustment over detected rollover anchors.
//!
//! A single reverse-chronological walk: starting from the newest date, the
//! series stays on one contract until an anchor signals the next (older)
//! one, computes the splice ratio on the first date where both contracts
//! report usable data, and compounds it into a running factor applied to
//! every older emission. The newest segment is emitted unmodified.

use crate::detect;
use crate::error::ContinuousError;
use crate::frame::{self, DateKey};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Walk state: emitting a single contract, or mid-rollover waiting for a
/// date where both sides of the splice ratio are available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RollState {
    Stable { current: String },
    Pending { current: String, incoming: String },
}

impl RollState {
    fn current(&self) -> &str {
        match self {
            RollState::Stable { current } | RollState::Pending { current, .. } => current,
        }
    }

    /// Re-point the incoming contract; collapses to `Stable` when the
    /// anchor names the contract already being emitted.
    fn with_incoming(self, incoming: &str) -> Self {
        let current = match self {
            RollState::Stable { current } | RollState::Pending { current, .. } => current,
        };
        if current == incoming {
            RollState::Stable { current }
        } else {
            RollState::Pending {
                current,
                incoming: incoming.to_string(),
            }
        }
    }
}

/// One output row: a position in the raw table and the cumulative factor
/// in force when it was emitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Emission {
    pub position: usize,
    pub factor: f64,
}

/// The reverse walk over extracted columns.
///
/// `basis` is the per-row adjustment factor value (mean of the factor
/// sources). Emissions come back in ascending date order.
pub(crate) fn backward_walk(
    dates: &[DateKey],
    contracts: &[String],
    basis: &[f64],
    anchors: &[usize],
) -> Result<Vec<Emission>, ContinuousError> {
    if dates.is_empty() {
        return Ok(Vec::new());
    }

    // date → contract → position, built once. Duplicate (date, contract)
    // observations collapse to the positionally last one.
    let mut index: BTreeMap<&DateKey, HashMap<&str, usize>> = BTreeMap::new();
    for (pos, date) in dates.iter().enumerate() {
        index
            .entry(date)
            .or_default()
            .insert(contracts[pos].as_str(), pos);
    }
    let anchor_by_date: HashMap<&DateKey, usize> =
        anchors.iter().map(|&pos| (&dates[pos], pos)).collect();

    // The walk opens on the contract of the positionally last row; a
    // same-date anchor immediately re-points it through a normal
    // ratio-applying transition.
    let mut state = RollState::Stable {
        current: contracts[dates.len() - 1].clone(),
    };
    let mut factor = 1.0f64;
    let mut emitted: Vec<Emission> = Vec::new();

    for (date, by_contract) in index.iter().rev() {
        if let Some(&anchor_pos) = anchor_by_date.get(*date) {
            state = state.with_incoming(contracts[anchor_pos].as_str());
        }

        // Transition attempt: needs both contracts quoted on this date with
        // finite bases; otherwise the transition stays pending and is
        // retried on the next older date.
        let mut completed: Option<String> = None;
        if let RollState::Pending { current, incoming } = &state {
            let outgoing_pos = by_contract.get(current.as_str()).copied();
            let incoming_pos = by_contract.get(incoming.as_str()).copied();
            if let (Some(out_pos), Some(in_pos)) = (outgoing_pos, incoming_pos) {
                let out_basis = basis[out_pos];
                let in_basis = basis[in_pos];
                if out_basis.is_finite() && in_basis.is_finite() {
                    if in_basis == 0.0 {
                        return Err(ContinuousError::DegenerateRatio {
                            date: date.to_string(),
                            outgoing: current.clone(),
                            incoming: incoming.clone(),
                        });
                    }
                    factor *= out_basis / in_basis;
                    completed = Some(incoming.clone());
                }
            }
        }
        if let Some(next) = completed {
            state = RollState::Stable { current: next };
        }

        // Emission: the current contract's row for this date, if quoted.
        // Dates where it is absent drop out of the series entirely.
        if let Some(&pos) = by_contract.get(state.current()) {
            emitted.push(Emission { position: pos, factor });
        }
    }

    emitted.reverse();
    Ok(emitted)
}

/// Build the continuous, back-adjusted series from a raw contract table.
///
/// `factor_source_cols` are averaged per row to form the splice-ratio
/// basis; `adjust_target_cols` are multiplied by the cumulative factor (and
/// emitted as `Float64`). The two sets may overlap. All other columns pass
/// through untouched, and the result keeps the input's column set, in
/// ascending date order.
pub fn build_continuous_series(
    df: &DataFrame,
    date_col: &str,
    volume_col: &str,
    contract_col: &str,
    factor_source_cols: &[&str],
    adjust_target_cols: &[&str],
) -> Result<DataFrame, ContinuousError> {
    if factor_source_cols.is_empty() {
        return Err(ContinuousError::EmptyColumnList {
            list: "factor_source_cols",
        });
    }
    if adjust_target_cols.is_empty() {
        return Err(ContinuousError::EmptyColumnList {
            list: "adjust_target_cols",
        });
    }

    let mut required = vec![date_col, volume_col, contract_col];
    required.extend_from_slice(factor_source_cols);
    required.extend_from_slice(adjust_target_cols);
    frame::require_columns(df, &required)?;
    for name in adjust_target_cols {
        frame::ensure_numeric(df, name)?;
    }

    let dates = frame::date_keys(df, date_col)?;
    let volumes = frame::numeric_values(df, volume_col)?;
    let contracts = frame::contract_ids(df, contract_col)?;
    let basis = frame::factor_basis(df, factor_source_cols)?;

    let anchors = detect::anchor_positions(&dates, &volumes, &contracts);
    let emitted = backward_walk(&dates, &contracts, &basis, &anchors)?;

    let idx = IdxCa::from_vec(
        "rows".into(),
        emitted.iter().map(|e| e.position as IdxSize).collect(),
    );
    let mut out = df.take(&idx)?;

    for name in adjust_target_cols {
        let scaled = {
            let cast = out.column(name)?.cast(&DataType::Float64)?;
            let ca = cast.f64()?;
            let values: Vec<Option<f64>> = ca
                .into_iter()
                .zip(&emitted)
                .map(|(v, e)| v.map(|x| x * e.factor))
                .collect();
            Series::new((*name).into(), values)
        };
        out.with_column(scaled)?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(dates: &[i64]) -> Vec<DateKey> {
        dates.iter().map(|&d| DateKey::Int(d)).collect()
    }

    fn names(contracts: &[&str]) -> Vec<String> {
        contracts.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn roll_state_collapses_on_same_contract() {
        let state = RollState::Stable {
            current: "H".into(),
        };
        assert_eq!(
            state.with_incoming("H"),
            RollState::Stable {
                current: "H".into()
            }
        );
    }

    #[test]
    fn roll_state_anchor_overrides_pending_target() {
        let state = RollState::Pending {
            current: "K".into(),
            incoming: "J".into(),
        };
        assert_eq!(
            state.with_incoming("H"),
            RollState::Pending {
                current: "K".into(),
                incoming: "H".into(),
            }
        );
    }

    #[test]
    fn single_contract_walk_keeps_factor_at_one() {
        let dates = keys(&[1, 2, 3]);
        let contracts = names(&["H", "H", "H"]);
        let basis = [5.0, 6.0, 7.0];
        let emitted = backward_walk(&dates, &contracts, &basis, &[0]).unwrap();
        assert_eq!(emitted.len(), 3);
        assert!(emitted.iter().all(|e| e.factor == 1.0));
        assert_eq!(
            emitted.iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn transition_compounds_ratio_behind_roll() {
        // H: pos 0 (d1, basis 10), pos 1 (d2, basis 8)
        // J: pos 2 (d1, basis 5), pos 3 (d2, basis 4), pos 4 (d3, basis 6)
        let dates = keys(&[1, 2, 1, 2, 3]);
        let contracts = names(&["H", "H", "J", "J", "J"]);
        let basis = [10.0, 8.0, 5.0, 4.0, 6.0];
        // anchors: H at d2 (pos 1), J at d3 (pos 4)
        let emitted = backward_walk(&dates, &contracts, &basis, &[1, 4]).unwrap();
        // d3: J raw; d2: transition J→H, ratio 4/8 = 0.5, emit H; d1: emit H
        assert_eq!(
            emitted,
            vec![
                Emission { position: 0, factor: 0.5 },
                Emission { position: 1, factor: 0.5 },
                Emission { position: 4, factor: 1.0 },
            ]
        );
    }

    #[test]
    fn transition_defers_until_both_sides_quote() {
        // The anchor sits on d3 where the outgoing contract J has no row;
        // the roll slides to d2, and d3 drops from the output.
        let dates = keys(&[1, 2, 3, 1, 2, 4]);
        let contracts = names(&["H", "H", "H", "J", "J", "J"]);
        let basis = [10.0, 8.0, 6.0, 5.0, 4.0, 7.0];
        // anchors: H at d3 (pos 2), J at d4 (pos 5)
        let emitted = backward_walk(&dates, &contracts, &basis, &[2, 5]).unwrap();
        assert_eq!(
            emitted,
            vec![
                Emission { position: 0, factor: 0.5 },
                Emission { position: 1, factor: 0.5 },
                Emission { position: 5, factor: 1.0 },
            ]
        );
    }

    #[test]
    fn never_overlapping_contracts_stay_unadjusted() {
        // H and J share no date, so the pending transition never completes:
        // the walk stays on J until J's data ends, then drops d1 because
        // the outgoing contract has no row there either.
        let dates = keys(&[1, 2, 3]);
        let contracts = names(&["H", "J", "J"]);
        let basis = [10.0, 4.0, 6.0];
        // anchors: H at d1 (pos 0), J at d3 (pos 2)
        let emitted = backward_walk(&dates, &contracts, &basis, &[0, 2]).unwrap();
        assert_eq!(
            emitted,
            vec![
                Emission { position: 1, factor: 1.0 },
                Emission { position: 2, factor: 1.0 },
            ]
        );
    }

    #[test]
    fn nan_basis_defers_transition() {
        let dates = keys(&[1, 2, 1, 2, 3]);
        let contracts = names(&["H", "H", "J", "J", "J"]);
        // H's basis on d2 is NaN → ratio not computable there; the roll
        // completes on d1 instead.
        let basis = [10.0, f64::NAN, 5.0, 4.0, 6.0];
        let emitted = backward_walk(&dates, &contracts, &basis, &[1, 4]).unwrap();
        assert_eq!(
            emitted,
            vec![
                Emission { position: 0, factor: 0.5 },
                Emission { position: 3, factor: 1.0 },
                Emission { position: 4, factor: 1.0 },
            ]
        );
    }

    #[test]
    fn zero_incoming_basis_is_degenerate() {
        let dates = keys(&[1, 2, 1, 2, 3]);
        let contracts = names(&["H", "H", "J", "J", "J"]);
        let basis = [10.0, 0.0, 5.0, 4.0, 6.0];
        let err = backward_walk(&dates, &contracts, &basis, &[1, 4]).unwrap_err();
        assert!(matches!(err, ContinuousError::DegenerateRatio { .. }));
    }

    #[test]
    fn empty_field_lists_rejected() {
        let df = df!(
            "Date" => &["2022-03-01"],
            "Contract" => &["H"],
            "Volume" => &[5i64],
            "Close" => &[6.0],
        )
        .unwrap();
        let err =
            build_continuous_series(&df, "Date", "Volume", "Contract", &[], &["Close"]).unwrap_err();
        assert!(matches!(err, ContinuousError::EmptyColumnList { .. }));
        let err =
            build_continuous_series(&df, "Date", "Volume", "Contract", &["Close"], &[]).unwrap_err();
        assert!(matches!(err, ContinuousError::EmptyColumnList { .. }));
    }

    #[test]
    fn duplicate_date_contract_rows_collapse_to_last() {
        let df = df!(
            "Date" => &["2022-03-01", "2022-03-01"],
            "Contract" => &["H", "H"],
            "Volume" => &[5i64, 9],
            "Close" => &[6.0, 7.0],
        )
        .unwrap();
        let out =
            build_continuous_series(&df, "Date", "Volume", "Contract", &["Close"], &["Close"])
                .unwrap();
        assert_eq!(out.height(), 1);
        let close = out.column("Close").unwrap().f64().unwrap();
        assert_eq!(close.get(0), Some(7.0));
    }
}
