//! Behavioral assumptions rule engine.
//!
//! Assigns runoff, stability and elasticity parameters to instruments:
//! - **Counterparty overrides** are consulted first, by exact name
//! - **Rules** are evaluated in descending priority; the first whose
//!   conditions all hold wins
//! - **Class defaults** cover retail/corporate deposits and current accounts
//!   when nothing else matched

pub mod manager;
pub mod params;
pub mod rules;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

pub use manager::{AssumptionSource, AssumptionsConfig, AssumptionsManager, ResolvedAssumptions};
pub use params::{BehavioralParams, CounterpartyAssumption, ElasticityOverlay, LiquidityScenario, RunoffTable};
pub use rules::{AssumptionRule, AssumptionRuleType, AttributeValue, Condition, ConditionOperator, Operand};

use crate::buckets::BucketSet;
use crate::instruments::{validate_instruments, Instrument};
use crate::types::{with_metadata, ComputationOutput};
use crate::AlmResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveAssumptionsInput {
    pub calculation_date: NaiveDate,
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub assumptions: AssumptionsConfig,
    #[serde(default = "BucketSet::liquidity_default")]
    pub buckets: BucketSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentAssignment {
    pub instrument_id: String,
    pub source: AssumptionSource,
    pub params: BehavioralParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveAssumptionsOutput {
    pub assignments: Vec<InstrumentAssignment>,
    /// Number of instruments per rule id / counterparty / default class.
    pub hits: BTreeMap<String, usize>,
    pub unassigned: usize,
}

/// Resolve the parameters every instrument would receive, for auditing a
/// rule set.
pub fn resolve_assumptions(
    input: &ResolveAssumptionsInput,
) -> AlmResult<ComputationOutput<ResolveAssumptionsOutput>> {
    let start = Instant::now();
    input.buckets.validate()?;
    validate_instruments(&input.instruments)?;
    let manager = AssumptionsManager::from_config(&input.assumptions)?;

    let mut assignments = Vec::with_capacity(input.instruments.len());
    let mut hits: BTreeMap<String, usize> = BTreeMap::new();
    let mut unassigned = 0;

    for inst in &input.instruments {
        let attrs = inst.attributes(input.calculation_date, &input.buckets);
        let resolved = manager.resolve(&attrs, &input.buckets);
        let key = match &resolved.source {
            AssumptionSource::Counterparty { name } => Some(format!("counterparty:{name}")),
            AssumptionSource::Rule { rule_id } => Some(format!("rule:{rule_id}")),
            AssumptionSource::ClassDefault { class } => Some(format!("default:{class}")),
            AssumptionSource::None => None,
        };
        match key {
            Some(k) => *hits.entry(k).or_insert(0) += 1,
            None => unassigned += 1,
        }
        assignments.push(InstrumentAssignment {
            instrument_id: inst.id.clone(),
            source: resolved.source,
            params: resolved.params,
        });
    }

    info!(
        instruments = input.instruments.len(),
        rules = manager.rules().len(),
        unassigned,
        "Resolved behavioral assumptions"
    );

    let warnings = if unassigned > 0 {
        vec![format!(
            "{unassigned} instrument(s) matched no rule and use contractual behaviour"
        )]
    } else {
        Vec::new()
    };

    Ok(with_metadata(
        "Priority-ordered behavioral assumption rules",
        &json!({
            "calculation_date": input.calculation_date.to_string(),
            "rules": manager.rules().len(),
            "counterparty_overrides": manager.counterparty_assumptions().len(),
            "use_class_defaults": input.assumptions.use_class_defaults,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        ResolveAssumptionsOutput {
            assignments,
            hits,
            unassigned,
        },
    ))
}
