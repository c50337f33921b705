use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::substitute::{self, CompiledRule};

/// Port the lookup server binds when the settings file does not name one.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Markdown,
    Text,
    Raw,
    Iframe,
}

impl SaveFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            SaveFormat::Markdown => "md",
            SaveFormat::Text => "txt",
            SaveFormat::Raw | SaveFormat::Iframe => "html",
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFormat::Markdown => write!(f, "markdown"),
            SaveFormat::Text => write!(f, "text"),
            SaveFormat::Raw => write!(f, "raw"),
            SaveFormat::Iframe => write!(f, "iframe"),
        }
    }
}

/// What to do when a word file already exists at the save target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    Append,
    Overwrite,
    Ignore,
}

/// One regex replacement applied after templating. Rules run in list order,
/// each over the previous rule's output. `\n` in `substitute` stands for a
/// literal newline; `$1`-style references pass through to the regex engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstituteRule {
    pub rule: String,
    pub substitute: String,
}

/// A named set of dictionaries plus the output preferences applied to every
/// lookup against it. Identity is `name`, unique across the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DictGroup {
    pub name: String,
    /// Configured dictionary files or folders, in lookup order.
    pub dict_paths: Vec<String>,
    /// Directory word files are saved into.
    pub file_save_path: String,
    pub save_format: SaveFormat,
    /// Per-format template overrides; a blank entry falls back to the
    /// built-in default for that format.
    pub save_templates: BTreeMap<SaveFormat, String>,
    pub show_notice: bool,
    pub rules: Vec<SubstituteRule>,
    /// Host-editor key bindings, carried opaquely for the embedding editor.
    pub hotkeys: BTreeMap<String, String>,
}

impl Default for DictGroup {
    fn default() -> Self {
        Self {
            name: String::new(),
            dict_paths: Vec::new(),
            file_save_path: String::new(),
            save_format: SaveFormat::default(),
            save_templates: BTreeMap::new(),
            show_notice: false,
            rules: Vec::new(),
            hotkeys: BTreeMap::new(),
        }
    }
}

impl DictGroup {
    /// Template used for `format`: the group's own entry unless it is blank,
    /// the built-in default otherwise.
    pub fn template_for(&self, format: SaveFormat) -> &str {
        match self.save_templates.get(&format) {
            Some(template) if !template.trim().is_empty() => template,
            _ => default_template(format),
        }
    }

    pub fn compiled_rules(&self) -> Result<Vec<CompiledRule>, ConfigError> {
        substitute::compile_rules(&self.rules).map_err(|(index, source)| {
            ConfigError::InvalidRule {
                group: self.name.clone(),
                index,
                source,
            }
        })
    }
}

/// The persisted settings shape. Every field is additive: older settings
/// files missing a field load with its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub groups: Vec<DictGroup>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            groups: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn group(&self, name: &str) -> Option<&DictGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// Edit-time validation: group names must be unique and non-empty, and
    /// every substitution rule must be a valid regular expression. The
    /// lookup path assumes all of this has already been checked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, group) in self.groups.iter().enumerate() {
            if group.name.trim().is_empty() {
                return Err(ConfigError::EmptyGroupName { index });
            }
            if !seen.insert(group.name.as_str()) {
                return Err(ConfigError::DuplicateGroupName {
                    name: group.name.clone(),
                });
            }
            group.compiled_rules()?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("group #{index} has an empty name")]
    EmptyGroupName { index: usize },
    #[error("duplicate group name {name:?}")]
    DuplicateGroupName { name: String },
    #[error("group {group:?}: rule #{index} is not a valid regular expression")]
    InvalidRule {
        group: String,
        index: usize,
        #[source]
        source: regex::Error,
    },
}

pub fn default_template(format: SaveFormat) -> &'static str {
    match format {
        SaveFormat::Markdown => DEFAULT_MARKDOWN_TEMPLATE,
        SaveFormat::Text => DEFAULT_TEXT_TEMPLATE,
        SaveFormat::Raw => DEFAULT_RAW_TEMPLATE,
        SaveFormat::Iframe => DEFAULT_IFRAME_TEMPLATE,
    }
}

pub const DEFAULT_MARKDOWN_TEMPLATE: &str = r#"# {{word}}

{{date}}

{{#for}}## {{basename}}

{{result}}

---

{{/for}}"#;

pub const DEFAULT_TEXT_TEMPLATE: &str = r#"{{word}} ({{date}})

{{#for}}--- {{basename}} ---

{{result}}

{{/for}}"#;

pub const DEFAULT_RAW_TEMPLATE: &str = r#"<h1>{{word}}</h1>
<p>{{date}}</p>
<hr>
{{#for}}<h2>{{basename}}</h2>
{{result}}
<hr>
{{/for}}"#;

pub const DEFAULT_IFRAME_TEMPLATE: &str = r#"<h1>{{word}}</h1>
{{#for}}<h2>{{basename}}</h2>
{{result}}
{{/for}}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_settings_load_with_defaults() {
        // A settings file written before port/templates/hotkeys/rules existed.
        let raw = r#"{
            "groups": [
                { "name": "en", "dictPaths": ["/dicts/en"], "saveFormat": "text" }
            ]
        }"#;
        let settings: Settings = serde_json::from_str(raw).expect("legacy settings parse");
        assert_eq!(settings.port, DEFAULT_PORT);
        let group = settings.group("en").expect("group present");
        assert_eq!(group.save_format, SaveFormat::Text);
        assert!(group.rules.is_empty());
        assert!(group.save_templates.is_empty());
        assert!(group.hotkeys.is_empty());
        assert!(!group.show_notice);
        settings.validate().expect("legacy settings are valid");
    }

    #[test]
    fn blank_template_falls_back_to_default() {
        let mut group = DictGroup {
            name: "g".to_string(),
            ..DictGroup::default()
        };
        group
            .save_templates
            .insert(SaveFormat::Markdown, "   \n".to_string());
        assert_eq!(
            group.template_for(SaveFormat::Markdown),
            DEFAULT_MARKDOWN_TEMPLATE
        );

        group
            .save_templates
            .insert(SaveFormat::Markdown, "custom {{word}}".to_string());
        assert_eq!(group.template_for(SaveFormat::Markdown), "custom {{word}}");
    }

    #[test]
    fn duplicate_group_names_are_rejected() {
        let settings = Settings {
            port: DEFAULT_PORT,
            groups: vec![
                DictGroup {
                    name: "same".to_string(),
                    ..DictGroup::default()
                },
                DictGroup {
                    name: "same".to_string(),
                    ..DictGroup::default()
                },
            ],
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DuplicateGroupName { .. })
        ));
    }

    #[test]
    fn empty_group_name_is_rejected() {
        let settings = Settings {
            port: DEFAULT_PORT,
            groups: vec![DictGroup::default()],
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::EmptyGroupName { index: 0 })
        ));
    }

    #[test]
    fn invalid_rule_regex_is_rejected_with_position() {
        let settings = Settings {
            port: DEFAULT_PORT,
            groups: vec![DictGroup {
                name: "g".to_string(),
                rules: vec![
                    SubstituteRule {
                        rule: "ok".to_string(),
                        substitute: "fine".to_string(),
                    },
                    SubstituteRule {
                        rule: "(unclosed".to_string(),
                        substitute: "x".to_string(),
                    },
                ],
                ..DictGroup::default()
            }],
        };
        match settings.validate() {
            Err(ConfigError::InvalidRule { group, index, .. }) => {
                assert_eq!(group, "g");
                assert_eq!(index, 1);
            }
            other => panic!("expected InvalidRule, got {other:?}"),
        }
    }

    #[test]
    fn save_format_round_trips_through_serde() {
        for format in [
            SaveFormat::Markdown,
            SaveFormat::Text,
            SaveFormat::Raw,
            SaveFormat::Iframe,
        ] {
            let encoded = serde_json::to_string(&format).expect("encode");
            let decoded: SaveFormat = serde_json::from_str(&encoded).expect("decode");
            assert_eq!(decoded, format);
        }
        assert_eq!(
            serde_json::to_string(&SaveFormat::Iframe).expect("encode"),
            "\"iframe\""
        );
    }
}
