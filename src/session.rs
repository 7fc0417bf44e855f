use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    cli::InputArgs,
    config::DashboardConfig,
    expr::{CalculatedField, parse_calculated_fields},
    io_utils::{self, LoadOptions},
    projection::CanonicalRow,
    repository::{
        CalculatedFieldRepository, DatasetId, FileStorage, RecentDatasets, RecordId, Storage,
        TemplateRepository,
    },
    schema::Dataset,
};

/// A loaded dataset with its resolved mapping and projected rows.
pub struct Session {
    pub dataset: Dataset,
    pub dataset_id: DatasetId,
    pub config: DashboardConfig,
    pub fields: Vec<CalculatedField>,
    pub rows: Vec<CanonicalRow>,
    store: Option<FileStorage>,
}

impl Session {
    pub fn open(args: &InputArgs) -> Result<Self> {
        let options = LoadOptions {
            delimiter: args.delimiter,
            encoding: args.input_encoding.clone(),
        };
        let raw_rows = io_utils::load_rows(&args.input, &options)?;
        let dataset_id = DatasetId::fingerprint(&raw_rows);
        let dataset = Dataset::from_rows(io_utils::dataset_name(&args.input), raw_rows);

        let mut config = match &args.config {
            Some(path) => DashboardConfig::load(path)
                .with_context(|| format!("Loading dashboard config from {path:?}"))?,
            None => DashboardConfig::default(),
        };
        if let Some(fallback) = args.tx_fallback {
            config.tx_id_fallback = fallback.into();
        }
        let store = args.store.as_ref().map(FileStorage::new);
        let mut base_mapping = dataset.mapping.clone();
        if let Some(template_id) = &args.template {
            let storage = store
                .as_ref()
                .context("--template requires --store <DIR>")?;
            let template = TemplateRepository::new(storage)
                .get(&RecordId::new(template_id.as_str()))?
                .with_context(|| format!("Template '{template_id}' not found"))?;
            info!("Applying template '{}'", template.name);
            // Templates are locked: their mapping replaces the inferred one outright.
            base_mapping = template.mapping;
            config.filters = template.filters;
            config.calculated_fields.extend(template.calculated_fields);
        }
        let mapping = config.resolve_mapping(&base_mapping);
        let dataset = dataset.with_mapping(mapping);
        info!(
            "Dataset '{}' ({}) detected as {}",
            dataset.name, dataset_id, dataset.mode
        );

        let mut extra_fields = Vec::new();
        if let Some(storage) = &store {
            RecentDatasets::new(storage).touch(&dataset_id, &dataset.name)?;
            extra_fields.extend(CalculatedFieldRepository::new(storage).list(&dataset_id)?);
        }
        extra_fields.extend(parse_calculated_fields(&args.calc)?);

        let projector = config.projector(dataset.mapping.clone(), &extra_fields);
        let rows = projector.project_all(&dataset.rows);
        let fields = config.all_fields(&extra_fields);
        debug!(
            "Projected {} row(s) with {} calculated field(s)",
            rows.len(),
            fields.len()
        );

        Ok(Self {
            dataset,
            dataset_id,
            config,
            fields,
            rows,
            store,
        })
    }

    pub fn storage(&self) -> Option<&dyn Storage> {
        self.store.as_ref().map(|s| s as &dyn Storage)
    }

    /// The store, or an error naming the flag that enables it.
    pub fn require_storage(&self, purpose: &str) -> Result<&dyn Storage> {
        self.storage()
            .with_context(|| format!("{purpose} requires --store <DIR>"))
    }
}
