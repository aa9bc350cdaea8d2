//! Template source validation.
use std::collections::BTreeMap;
use std::path::Path;

use super::index::TemplateIndex;

/// A validation warning detected while inspecting a template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Category the warning belongs to.
    pub category: String,
    /// The specific item that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

/// Trait for template source validators.
pub trait SourceValidator {
    /// Validate the source and return any warnings found.
    fn validate(&self, index: &TemplateIndex, source_root: &Path) -> Vec<ValidationWarning>;

    /// Human-readable name for this validator.
    fn name(&self) -> &'static str;
}

/// Reports categories whose source directory is missing or unreadable.
#[derive(Debug)]
pub struct LayoutValidator;

impl SourceValidator for LayoutValidator {
    fn validate(&self, index: &TemplateIndex, source_root: &Path) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for category in &index.categories {
            let dir = category.source_path(source_root);
            if !dir.is_dir() {
                warnings.push(ValidationWarning::new(
                    &category.name,
                    category.source_dir.clone(),
                    format!("source directory does not exist: {}", dir.display()),
                ));
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "layout"
    }
}

/// Reports templates that render to a dynamic name, and distinct templates
/// that render to the same project name.
#[derive(Debug)]
pub struct NamingValidator;

impl SourceValidator for NamingValidator {
    fn validate(&self, index: &TemplateIndex, source_root: &Path) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for category in &index.categories {
            let entries = match category.template_entries(source_root) {
                Ok(entries) => entries,
                Err(e) => {
                    warnings.push(ValidationWarning::new(
                        &category.name,
                        category.source_dir.clone(),
                        format!("cannot read source directory: {e}"),
                    ));
                    continue;
                }
            };

            let mut seen: BTreeMap<&str, &Path> = BTreeMap::new();
            for entry in &entries {
                if index.is_dynamic(&entry.project_name) {
                    warnings.push(ValidationWarning::new(
                        &category.name,
                        entry.project_name.clone(),
                        "renders to a dynamically generated name and will never be synced",
                    ));
                }
                if let Some(first) = seen.insert(&entry.project_name, &entry.source) {
                    warnings.push(ValidationWarning::new(
                        &category.name,
                        entry.project_name.clone(),
                        format!(
                            "rendered by both {} and {}",
                            first.display(),
                            entry.source.display()
                        ),
                    ));
                }
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "naming"
    }
}

/// Run every validator over `source_root`.
#[must_use]
pub fn validate_source(index: &TemplateIndex, source_root: &Path) -> Vec<ValidationWarning> {
    let validators: [&dyn SourceValidator; 2] = [&LayoutValidator, &NamingValidator];
    validators
        .iter()
        .flat_map(|v| {
            tracing::debug!("running {} validator", v.name());
            v.validate(index, source_root)
        })
        .collect()
}
