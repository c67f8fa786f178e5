//! Validation Orchestrator.
//!
//! Runs the structure check and then every bound field validator in family
//! order (bank details, dates, opt-ins, Eircode, district), concatenating the
//! findings and stamping each cell finding with the value it holds now.

use log::{debug, info, warn};

use crate::{
    clean::CleanedSnapshot,
    config::ValidatorConfig,
    data::Dataset,
    district::{DistrictLookup, DistrictSet},
    error::{LookupUnavailable, ValidationError},
    schema::{FieldRule, SchemaDescriptor, ValidatorFamily},
    validators::{RowScope, RuleContext, check_rule},
};

pub struct Orchestrator<'a> {
    schema: &'a SchemaDescriptor,
    config: &'a ValidatorConfig,
    districts: &'a dyn DistrictLookup,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        schema: &'a SchemaDescriptor,
        config: &'a ValidatorConfig,
        districts: &'a dyn DistrictLookup,
    ) -> Self {
        Self {
            schema,
            config,
            districts,
        }
    }

    /// Full report over every row of `snapshot`.
    pub fn validate(&self, snapshot: &CleanedSnapshot) -> Vec<ValidationError> {
        let dataset = snapshot.cleaned();
        let mut errors = self.schema.check_structure(dataset);
        let structure_count = errors.len();

        let needs_districts = self
            .schema
            .columns_in_family(ValidatorFamily::District)
            .any(|binding| dataset.has_column(&binding.column));
        let districts = needs_districts.then(|| self.fetch_districts());
        let ctx = RuleContext {
            opt_in: &self.config.opt_in,
            districts: districts.as_ref(),
        };

        for family in ValidatorFamily::ORDER {
            for binding in self.schema.columns_in_family(family) {
                if !dataset.has_column(&binding.column) {
                    continue;
                }
                let found = check_rule(
                    binding.rule,
                    snapshot,
                    &binding.column,
                    &RowScope::All,
                    &ctx,
                );
                debug!(
                    "{} check on '{}' produced {} finding(s)",
                    binding.rule.label(),
                    binding.column,
                    found.len()
                );
                errors.extend(found);
            }
        }

        enrich_current_values(&mut errors, dataset);
        info!(
            "Validated {} row(s): {} structure and {} field/system finding(s)",
            dataset.row_count(),
            structure_count,
            errors.len() - structure_count
        );
        errors
    }

    /// Re-checks only the listed cells (0-based row, column name), each with
    /// the validator family bound to its column.
    pub fn revalidate_cells(
        &self,
        snapshot: &CleanedSnapshot,
        cells: &[(usize, String)],
    ) -> Vec<ValidationError> {
        let bound = cells
            .iter()
            .filter_map(|(row, field)| {
                self.schema
                    .rule_for(field)
                    .map(|rule| (*row, field.as_str(), rule))
            })
            .collect::<Vec<_>>();
        let districts = bound
            .iter()
            .any(|(_, _, rule)| *rule == FieldRule::District)
            .then(|| self.fetch_districts());
        let ctx = RuleContext {
            opt_in: &self.config.opt_in,
            districts: districts.as_ref(),
        };

        let mut errors = Vec::new();
        for family in ValidatorFamily::ORDER {
            for (row, field, rule) in bound.iter().filter(|(_, _, r)| r.family() == family) {
                errors.extend(check_rule(
                    *rule,
                    snapshot,
                    field,
                    &RowScope::single(*row),
                    &ctx,
                ));
            }
        }
        // A failed lookup contributes one System finding per batch.
        errors.dedup_by(|a, b| a.row.is_none() && a == b);
        enrich_current_values(&mut errors, snapshot.cleaned());
        errors
    }

    fn fetch_districts(&self) -> Result<DistrictSet, LookupUnavailable> {
        let result = self.districts.fetch_valid_districts();
        match &result {
            Ok(set) => debug!("District lookup returned {} name(s)", set.len()),
            Err(err) => warn!("District validation skipped: {err}"),
        }
        result
    }
}

/// Fills `current_value` on every row-scoped finding. Rows or fields that no
/// longer resolve are marked unavailable rather than failing.
pub fn enrich_current_values(errors: &mut [ValidationError], dataset: &Dataset) {
    for error in errors.iter_mut() {
        if let (Some(row), Some(field)) = (error.row, error.field.as_deref()) {
            error.current_value = Some(dataset.current_value(row, field));
        }
    }
}
