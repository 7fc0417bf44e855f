use std::{
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    expr::{CalculatedField, Expression},
    filter::FilterState,
    projection::{Projector, TxIdFallback},
    schema::{SchemaMapping, SemanticRole},
};

pub const CURRENT_CONFIG_VERSION: &str = "1.0";

/// Saved dashboard settings: mapping corrections, calculated fields, filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_version: Option<String>,
    /// Roles listed here override the inferred mapping; unlisted roles keep it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<SchemaMapping>,
    /// Roles to unmap after overrides, for keyword matches that picked the wrong column.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clear_roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calculated_fields: Vec<CalculatedField>,
    pub filters: FilterState,
    pub tx_id_fallback: TxIdFallback,
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: DashboardConfig =
            serde_yaml::from_reader(reader).context("Parsing dashboard config YAML")?;
        config.validate()?;
        debug!(
            "Loaded config with {} calculated field(s) from {path:?}",
            config.calculated_fields.len()
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml_string()?;
        std::fs::write(path, yaml).with_context(|| format!("Writing config file {path:?}"))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        let mut config = self.clone();
        if config.config_version.is_none() {
            config.config_version = Some(CURRENT_CONFIG_VERSION.to_string());
        }
        serde_yaml::to_string(&config).context("Serializing dashboard config to YAML")
    }

    /// Rejects unknown roles and calculated fields whose expressions do not parse.
    pub fn validate(&self) -> Result<()> {
        for role in &self.clear_roles {
            if SemanticRole::parse(role).is_none() {
                return Err(anyhow!("Unknown semantic role '{role}' in clearRoles"));
            }
        }
        for field in &self.calculated_fields {
            if field.name.trim().is_empty() {
                return Err(anyhow!("Calculated field '{}' has an empty name", field.id));
            }
            Expression::parse(&field.expression).with_context(|| {
                format!(
                    "Calculated field '{}' has an invalid expression '{}'",
                    field.name, field.expression
                )
            })?;
        }
        Ok(())
    }

    pub fn resolve_mapping(&self, inferred: &SchemaMapping) -> SchemaMapping {
        let mut mapping = inferred.clone();
        if let Some(overrides) = &self.mapping {
            mapping.merge(overrides);
        }
        for role in self.clear_roles.iter().filter_map(|r| SemanticRole::parse(r)) {
            mapping.clear(role);
        }
        mapping
    }

    /// Configured fields followed by `extra_fields`; the first field of each name wins.
    pub fn all_fields(&self, extra_fields: &[CalculatedField]) -> Vec<CalculatedField> {
        self.calculated_fields
            .iter()
            .chain(extra_fields)
            .unique_by(|field| field.name.clone())
            .cloned()
            .collect()
    }

    pub fn projector(&self, mapping: SchemaMapping, extra_fields: &[CalculatedField]) -> Projector {
        let fields = self.all_fields(extra_fields);
        Projector::new(mapping)
            .with_calculated_fields(&fields)
            .with_tx_fallback(self.tx_id_fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_with_overrides_and_filters() {
        let yaml = r#"
mapping:
  category: Segment
calculatedFields:
  - id: calc_1
    name: Net
    expression: "[Revenue] - [Cost]"
    type: numeric
filters:
  years: [2023]
  cities: ALL
txIdFallback: random
"#;
        let config: DashboardConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.tx_id_fallback, TxIdFallback::Random);
        let inferred = SchemaMapping {
            category: Some("CATEGORY".into()),
            city: Some("CITY".into()),
            ..SchemaMapping::default()
        };
        let mapping = config.resolve_mapping(&inferred);
        assert_eq!(mapping.category.as_deref(), Some("Segment"));
        assert_eq!(mapping.city.as_deref(), Some("CITY"));
        assert!(config.filters.years.allows(&2023));
        assert!(!config.filters.years.allows(&2024));
    }

    #[test]
    fn clear_roles_unmap_after_overrides() {
        let config: DashboardConfig = serde_yaml::from_str("clearRoles: [profit]\n").unwrap();
        config.validate().unwrap();
        let inferred = SchemaMapping {
            profit: Some("PROFIT MARGIN (%)".into()),
            margin: Some("PROFIT MARGIN (%)".into()),
            ..SchemaMapping::default()
        };
        let mapping = config.resolve_mapping(&inferred);
        assert_eq!(mapping.profit, None);
        assert_eq!(mapping.margin.as_deref(), Some("PROFIT MARGIN (%)"));

        let bad: DashboardConfig = serde_yaml::from_str("clearRoles: [nonsense]\n").unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn duplicate_field_names_keep_the_configured_one() {
        let config = DashboardConfig {
            calculated_fields: vec![CalculatedField::new("Net", "[Revenue] - [Cost]")],
            ..DashboardConfig::default()
        };
        let extra = [
            CalculatedField::new("Net", "[Revenue]"),
            CalculatedField::new("Double", "[Revenue] * 2"),
        ];
        let fields = config.all_fields(&extra);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].expression, "[Revenue] - [Cost]");
        assert_eq!(fields[1].name, "Double");
    }

    #[test]
    fn invalid_expression_fails_validation() {
        let config = DashboardConfig {
            calculated_fields: vec![CalculatedField::new("Bad", "[A] +")],
            ..DashboardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
