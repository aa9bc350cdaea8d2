//! Template source index: artifact categories, naming conventions and the
//! dynamic-file exclusion list.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::toml_loader;
use crate::error::ConfigError;

/// File name of the optional index override inside a template source.
pub const INDEX_FILE: &str = "index.toml";

/// Project-facing names generated by other subsystems.
///
/// Never classified as template-sourced or custom, never linked or copied.
pub const DYNAMIC_FILES: &[&str] = &["INDEX.md", "README.md"];

/// One class of synced artifact (commands, hooks, agents, skills, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category name; also the subdirectory name inside the compiled cache.
    pub name: String,
    /// Directory holding the templates, relative to the source root.
    pub source_dir: String,
    /// Directory receiving the rendered files, relative to the project root.
    pub project_dir: String,
    /// Suffix identifying template files (e.g. `.md.tmpl`).
    #[serde(default)]
    pub template_suffix: String,
    /// Suffix replacing `template_suffix` in the project-facing name.
    #[serde(default)]
    pub project_suffix: String,
    /// Whether directories are composite bundles (skills).
    #[serde(default)]
    pub bundles: bool,
}

/// A template found in a category's source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// Absolute path of the template file or bundle directory.
    pub source: PathBuf,
    /// Name of the rendered entry in the project tree.
    pub project_name: String,
    /// Whether the entry is a bundle directory.
    pub is_bundle: bool,
}

impl Category {
    fn file(name: &str, project_dir: &str, template_suffix: &str, project_suffix: &str) -> Self {
        Self {
            name: name.to_string(),
            source_dir: name.to_string(),
            project_dir: project_dir.to_string(),
            template_suffix: template_suffix.to_string(),
            project_suffix: project_suffix.to_string(),
            bundles: false,
        }
    }

    /// Map a source entry name to its project-facing name.
    ///
    /// Returns `None` when the entry is not a template of this category:
    /// hidden entries, files without the template suffix, and directories in
    /// non-bundle categories.
    #[must_use]
    pub fn project_name(&self, template_name: &str, is_dir: bool) -> Option<String> {
        if template_name.starts_with('.') {
            return None;
        }
        if is_dir {
            return self.bundles.then(|| template_name.to_string());
        }
        template_name
            .strip_suffix(self.template_suffix.as_str())
            .filter(|stem| !stem.is_empty())
            .map(|stem| format!("{stem}{}", self.project_suffix))
    }

    /// Template directory of this category under `source_root`.
    #[must_use]
    pub fn source_path(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.source_dir)
    }

    /// Managed directory of this category under `project_root`.
    #[must_use]
    pub fn project_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.project_dir)
    }

    /// Enumerate the templates of this category, sorted by project name.
    ///
    /// A missing source directory yields no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the source directory exists but cannot be read.
    pub fn template_entries(&self, source_root: &Path) -> std::io::Result<Vec<TemplateEntry>> {
        let dir = self.source_path(source_root);
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for entry in read {
            let entry = entry?;
            let path = entry.path();
            let is_dir = path.is_dir();
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(project_name) = self.project_name(&name, is_dir) {
                entries.push(TemplateEntry {
                    source: path,
                    project_name,
                    is_bundle: is_dir,
                });
            }
        }
        entries.sort_by(|a, b| a.project_name.cmp(&b.project_name));
        Ok(entries)
    }
}

/// Static description of every category plus the dynamic exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateIndex {
    /// Categories in processing order.
    pub categories: Vec<Category>,
    /// Dynamically generated project names.
    pub dynamic: BTreeSet<String>,
}

/// On-disk shape of `index.toml`.
#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    #[serde(default)]
    categories: Option<Vec<Category>>,
    #[serde(default)]
    dynamic: Option<Vec<String>>,
}

impl TemplateIndex {
    /// The built-in category table.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            categories: vec![
                Category::file("commands", ".claude/commands", ".md.tmpl", ".md"),
                Category::file("hooks", ".claude/hooks", ".sh.tmpl", ".sh"),
                Category::file("agents", ".claude/agents", ".md.tmpl", ".md"),
                Category {
                    name: "skills".to_string(),
                    source_dir: "skills".to_string(),
                    project_dir: ".claude/skills".to_string(),
                    template_suffix: String::new(),
                    project_suffix: String::new(),
                    bundles: true,
                },
                Category::file("scripts", ".claude/scripts", ".py.tmpl", ".py"),
            ],
            dynamic: DYNAMIC_FILES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Load the index for `source_root`, applying `index.toml` overrides on
    /// top of the built-in table.
    ///
    /// # Errors
    ///
    /// Returns an error if `index.toml` exists but cannot be read or parsed.
    pub fn load(source_root: &Path) -> Result<Self, ConfigError> {
        let file: IndexFile = toml_loader::load_config(&source_root.join(INDEX_FILE))?;
        let mut index = Self::builtin();
        if let Some(categories) = file.categories {
            index.categories = categories;
        }
        if let Some(dynamic) = file.dynamic {
            index.dynamic = dynamic.into_iter().collect();
        }
        Ok(index)
    }

    /// Whether `name` is a dynamically generated project name.
    #[must_use]
    pub fn is_dynamic(&self, name: &str) -> bool {
        self.dynamic.contains(name)
    }

    /// Look up a category by name.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Project names a category's templates would produce, plus the dynamic
    /// names.  Anything else found in the project directory is custom.
    ///
    /// # Errors
    ///
    /// Returns an error if the category source directory cannot be read.
    pub fn known_names(
        &self,
        category: &Category,
        source_root: &Path,
    ) -> std::io::Result<BTreeSet<String>> {
        let mut names: BTreeSet<String> = category
            .template_entries(source_root)?
            .into_iter()
            .map(|e| e.project_name)
            .collect();
        names.extend(self.dynamic.iter().cloned());
        Ok(names)
    }
}
