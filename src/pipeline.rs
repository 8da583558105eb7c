// The stages of an imputation run.
//
// Each stage reads its snapshots, prepares the data, hands it to its method
// through the invoker, writes the result and fires a checkpoint. Stages
// share nothing in memory; everything passes through the store.
use crate::atypicals::add_atypical_columns;
use crate::columns::FACTOR_PREFIX;
use crate::config::PipelineConfig;
use crate::constants::{
    APPLY_METHOD, APPLY_STAGE, ATYPICALS_STAGE, FACTORS_METHOD, FACTORS_STAGE, MEANS_METHOD,
    MEANS_STAGE, MOVEMENT_METHOD, MOVEMENT_STAGE, NON_RESPONDER_CODE, RESPONDER_CODE,
};
use crate::error::Result;
use crate::methods::{MethodRequest, StageInvoker};
use crate::regionless::fill_missing_factors;
use crate::storage::TableStore;
use crate::table::Table;
use crate::types::{ApplyReport, StageReport};
use serde_json::Value;
use tracing::{info, warn};

/// Fire-and-forget completion signal.
pub trait Notifier {
    fn notify(&self, checkpoint: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, checkpoint: &str) {
        info!(checkpoint, "checkpoint reached");
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub apply: ApplyReport,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    store: &'a dyn TableStore,
    invoker: &'a dyn StageInvoker,
    notifier: &'a dyn Notifier,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a dyn TableStore,
        invoker: &'a dyn StageInvoker,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            store,
            invoker,
            notifier,
        }
    }

    fn invoke(&self, method: &str, stage: &'static str, request: MethodRequest) -> Result<Table> {
        let response = self.invoker.invoke_next_stage(method, &request)?;
        info!("Successfully invoked method {}", method);
        response.into_table(stage)
    }

    fn finish(&self, stage: &'static str, input_rows: usize, key: &str, table: &Table) -> Result<StageReport> {
        self.store.write_table(key, table)?;
        info!(rows = table.len(), key, "Successfully saved {} output", stage);
        self.notifier.notify(stage);
        Ok(StageReport {
            stage: stage.to_string(),
            input_rows,
            output_rows: table.len(),
            output_key: key.to_string(),
        })
    }

    /// Movement between the current and previous snapshots.
    pub fn movement(&self) -> Result<StageReport> {
        let c = self.config;
        info!("Starting {}", MOVEMENT_STAGE);
        let current = self.store.read_table(&c.snapshots.current_data)?;
        let previous = self.store.read_table(&c.snapshots.previous_data)?;
        let combined = current.concat(previous);
        let input_rows = combined.len();
        info!(rows = input_rows, "Successfully retrieved data");

        let output = self.invoke(
            MOVEMENT_METHOD,
            MOVEMENT_STAGE,
            MethodRequest::Movement {
                data: combined,
                questions: c.naming.questions(),
                reference_column: c.reference_column.clone(),
                period_column: c.period_column.clone(),
                current_period: c.current_period.clone(),
                previous_period: c.previous_period.clone(),
            },
        )?;
        self.finish(MOVEMENT_STAGE, input_rows, &c.snapshots.movement, &output)
    }

    /// Per-cell means of the current period's responder movements.
    pub fn means(&self) -> Result<StageReport> {
        let c = self.config;
        info!("Starting {}", MEANS_STAGE);
        let movements = self.store.read_table(&c.snapshots.movement)?;
        let input_rows = movements.len();
        movements.require_columns(&[&c.period_column, &c.response_type_column], MEANS_STAGE)?;
        let responders = movements
            .filter_eq(&c.period_column, &c.current_period)
            .filter_eq(&c.response_type_column, &Value::from(RESPONDER_CODE));

        let mut carry = vec![c.period_column.clone()];
        if !c.distinct_values.contains(&c.factors.land_or_marine_column) {
            carry.push(c.factors.land_or_marine_column.clone());
        }
        let output = self.invoke(
            MEANS_METHOD,
            MEANS_STAGE,
            MethodRequest::Means {
                data: responders,
                questions: c.naming.questions(),
                distinct_values: c.distinct_values.clone(),
                carry,
            },
        )?;
        self.finish(MEANS_STAGE, input_rows, &c.snapshots.means, &output)
    }

    /// Banded factors per cell, reduced to the factor columns and the cell
    /// identity.
    pub fn factors(&self) -> Result<StageReport> {
        let c = self.config;
        info!("Starting {}", FACTORS_STAGE);
        let means = self.store.read_table(&c.snapshots.means)?;
        let input_rows = means.len();
        let prepared = c
            .naming
            .factors()
            .iter()
            .fold(means, |t, column| t.with_column(column, Value::from(0)));

        let output = self.invoke(
            FACTORS_METHOD,
            FACTORS_STAGE,
            MethodRequest::Factors {
                data: prepared,
                questions: c.naming.questions(),
                factors: c.factors.clone(),
            },
        )?;

        let mut keep = c.distinct_values.clone();
        if !keep.contains(&c.period_column) {
            keep.push(c.period_column.clone());
        }
        let columns = c.naming.produce_columns(FACTOR_PREFIX, &keep);
        output.require_columns(&columns, FACTORS_STAGE)?;
        let factors = output.select(&columns).dedup()?;
        self.finish(FACTORS_STAGE, input_rows, &c.snapshots.factors, &factors)
    }

    /// Impute the current period's non-responders and merge them back with
    /// the responders. Non-responders without a previous-period return or
    /// without any factor are left out; the report counts them.
    pub fn apply(&self) -> Result<(StageReport, ApplyReport)> {
        let c = self.config;
        info!("Starting {}", APPLY_STAGE);
        let factors = self.store.read_table(&c.snapshots.factors)?;
        let input = self.store.read_table(&c.snapshots.current_data)?;
        let previous = self.store.read_table(&c.snapshots.previous_data)?;
        info!("Successfully retrieved factors, current and previous period data");

        let status = &c.response_type_column;
        input.require_columns(&[status, &c.reference_column, &c.period_column], APPLY_STAGE)?;
        previous.require_columns(&[status, &c.reference_column], APPLY_STAGE)?;
        let input = input.filter_eq(&c.period_column, &c.current_period);
        let non_responders = input.filter_eq(status, &Value::from(NON_RESPONDER_CODE));
        let responders = input.filter_eq(status, &Value::from(RESPONDER_CODE));

        let mut previous_columns = c.naming.questions();
        previous_columns.push(c.reference_column.clone());
        let previous = previous.filter_eq(status, &Value::from(RESPONDER_CODE));
        previous.require_columns(&previous_columns, APPLY_STAGE)?;
        let previous = previous
            .select(&previous_columns)
            .rename_columns(&c.naming.previous_renames());
        info!("Successfully renamed previous period data");

        let with_previous = non_responders.inner_join(&previous, &[&c.reference_column])?;
        info!("Successfully merged previous period data with non-responders");

        let fallback = fill_missing_factors(&with_previous.joined, &factors, &c.regionless, &c.naming)?;

        let imputed = self.invoke(
            APPLY_METHOD,
            APPLY_STAGE,
            MethodRequest::Apply {
                data: fallback.rows,
                questions: c.naming.questions(),
                sum_columns: c.sum_columns.clone(),
            },
        )?;

        let mut drop = c.naming.factors();
        drop.extend(c.naming.previous());
        let output = responders.concat(imputed).drop_columns(&drop);
        info!("Successfully joined imputed data with responder data");

        let report = ApplyReport {
            non_responders: non_responders.len(),
            without_previous: with_previous.unmatched.len(),
            matches: fallback.counts,
            output_rows: output.len(),
        };
        if report.without_previous > 0 {
            warn!(
                rows = report.without_previous,
                "non-responders with no previous period return are left out"
            );
        }
        let stage = self.finish(APPLY_STAGE, input.len(), &c.snapshots.imputed, &output)?;
        Ok((stage, report))
    }

    /// Zeroed atypical flags on the imputed snapshot.
    pub fn atypicals(&self) -> Result<StageReport> {
        let c = self.config;
        info!("Starting {}", ATYPICALS_STAGE);
        let data = self.store.read_table(&c.snapshots.imputed)?;
        let input_rows = data.len();
        let output = add_atypical_columns(data, &c.naming);
        info!("Atypicals columns successfully added");
        self.finish(ATYPICALS_STAGE, input_rows, &c.snapshots.atypicals, &output)
    }

    /// Every stage in order, stopping at the first failure.
    pub fn run(&self) -> Result<RunReport> {
        let mut stages = vec![self.movement()?, self.means()?, self.factors()?];
        let (apply_stage, apply) = self.apply()?;
        stages.push(apply_stage);
        stages.push(self.atypicals()?);
        Ok(RunReport { stages, apply })
    }
}
