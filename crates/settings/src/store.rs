use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::defaults;
use crate::document::Settings;
use crate::json;
use crate::migrate::{self, LegacyPdfFields};
use crate::storage;

/// 差異存檔時允許寫入的頂層區段。 / Top-level sections a diff-only save may record.
pub const DIFF_SECTIONS: [&str; 7] = [
    "pdfOptions",
    "sentenceBoundaryMode",
    "punctuation",
    "convertFilename",
    "dictionary",
    "locale",
    "charCheck",
];

/// Descriptive fields that never reach the user-override file.
const ANNOTATION_FIELDS: [(&str, &str); 1] = [("sentenceBoundaryMode", "info")];

const DEFAULT_FILE_NAME: &str = "settings.json";
const USER_FILE_NAME: &str = "user_settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("settings {path} is not valid {encoding} text")]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings {path} does not match the expected schema: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize settings {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 預設檔與使用者覆寫檔的位置。 / Locations of the shipped default and user-override documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsPaths {
    pub defaults: PathBuf,
    pub user: PathBuf,
}

impl SettingsPaths {
    pub fn new(defaults: impl Into<PathBuf>, user: impl Into<PathBuf>) -> Self {
        Self {
            defaults: defaults.into(),
            user: user.into(),
        }
    }

    /// `settings.json` and `user_settings.json` side by side in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(DEFAULT_FILE_NAME), dir.join(USER_FILE_NAME))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Also write the legacy flat PDF fields on full saves.
    pub mirror_legacy_fields: bool,
    pub diff_sections: Vec<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mirror_legacy_fields: false,
            diff_sections: DIFF_SECTIONS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// 單一設定層的載入結果。 / How one layer fared during load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LayerStatus {
    Loaded,
    #[default]
    Missing,
    Corrupt(String),
}

impl LayerStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LayerStatus::Loaded)
    }
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerStatus::Loaded => write!(f, "loaded"),
            LayerStatus::Missing => write!(f, "missing"),
            LayerStatus::Corrupt(reason) => write!(f, "corrupt ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub defaults: LayerStatus,
    pub user: LayerStatus,
    /// The canonical document was written over a missing/corrupt default file.
    pub defaults_regenerated: bool,
}

struct Layers {
    defaults_document: Value,
    defaults: Settings,
    current: Settings,
    report: LoadReport,
}

/// 設定的唯一擁有者：載入、正規化、追蹤變更與存檔。 / Single owner of the active settings document.
#[derive(Debug)]
pub struct SettingsStore {
    paths: SettingsPaths,
    options: StoreOptions,
    defaults_document: Value,
    defaults: Settings,
    current: Settings,
    baseline: String,
    report: LoadReport,
}

impl SettingsStore {
    /// 合併預設檔與使用者覆寫檔。任何讀取錯誤都會退回下一層。 / Loads and merges both layers; never fails.
    pub fn load(paths: SettingsPaths) -> Self {
        Self::load_with(paths, StoreOptions::default())
    }

    pub fn load_with(paths: SettingsPaths, options: StoreOptions) -> Self {
        let layers = load_layers(&paths, true);
        let baseline = snapshot(&layers.current);
        Self {
            paths,
            options,
            defaults_document: layers.defaults_document,
            defaults: layers.defaults,
            current: layers.current,
            baseline,
            report: layers.report,
        }
    }

    /// 重新讀取磁碟狀態並捨棄未儲存的修改；不會寫入任何檔案。 / Re-reads both layers without writing.
    pub fn reload(&mut self) -> &LoadReport {
        let layers = load_layers(&self.paths, false);
        self.defaults_document = layers.defaults_document;
        self.defaults = layers.defaults;
        self.current = layers.current;
        self.report = layers.report;
        self.baseline = snapshot(&self.current);
        &self.report
    }

    pub fn paths(&self) -> &SettingsPaths {
        &self.paths
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    pub fn settings(&self) -> &Settings {
        &self.current
    }

    /// Direct access for UI bindings. Values are not clamped until the next
    /// [`SettingsStore::update`], save or reload.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.current
    }

    /// 正規化後的預設文件。 / The normalized shipped defaults.
    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    pub fn update<F>(&mut self, op: F)
    where
        F: FnOnce(&mut Settings),
    {
        op(&mut self.current);
        migrate::normalize(&mut self.current, &LegacyPdfFields::default());
    }

    pub fn replace(&mut self, settings: Settings) {
        self.current = settings;
        migrate::normalize(&mut self.current, &LegacyPdfFields::default());
    }

    pub fn reset_to_defaults(&mut self) {
        self.current = self.defaults.clone();
    }

    /// 與上次儲存的快照比較。 / Compares a fresh canonical snapshot with the saved baseline.
    pub fn is_dirty(&self) -> bool {
        snapshot(&self.current) != self.baseline
    }

    /// 將完整文件寫入使用者覆寫檔。 / Writes the whole document to the user-override path.
    pub fn save(&mut self) -> Result<(), SettingsError> {
        migrate::normalize(&mut self.current, &LegacyPdfFields::default());
        let mut document = to_document(&self.current, &self.paths.user)?;
        if self.options.mirror_legacy_fields {
            migrate::mirror_legacy_fields(&mut document, &self.current.pdf_options).map_err(
                |source| SettingsError::Serialize {
                    path: self.paths.user.clone(),
                    source,
                },
            )?;
        }
        storage::write_document(&self.paths.user, &document)?;
        self.baseline = snapshot(&self.current);
        info!(path = %self.paths.user.display(), "Saved full settings");
        Ok(())
    }

    /// 只寫入與預設值不同的允許區段，並回傳寫入的差異。 / Writes the allow-listed diff against the defaults.
    pub fn save_diff(&mut self) -> Result<Map<String, Value>, SettingsError> {
        migrate::normalize(&mut self.current, &LegacyPdfFields::default());
        let delta = self.diff()?;
        storage::write_document(&self.paths.user, &Value::Object(delta.clone()))?;

        // Baseline is what a reload of the file just written would produce, so
        // edits outside the allow-list still count as unsaved.
        let mut persisted = self.defaults_document.clone();
        json::merge(&mut persisted, Value::Object(delta.clone()));
        self.baseline = match migrate::upgrade(persisted) {
            Ok(settings) => snapshot(&settings),
            Err(err) => {
                warn!("Persisted diff does not round-trip: {err}");
                String::new()
            }
        };
        info!(
            path = %self.paths.user.display(),
            sections = delta.len(),
            "Saved settings diff"
        );
        Ok(delta)
    }

    /// 計算允許區段相對於預設值的差異（不寫檔）。 / Computes the allow-listed diff without writing.
    pub fn diff(&self) -> Result<Map<String, Value>, SettingsError> {
        let defaults = to_document(&self.defaults, &self.paths.defaults)?;
        let mut current = to_document(&self.current, &self.paths.user)?;
        for (object, field) in ANNOTATION_FIELDS {
            json::strip_field(&mut current, object, field);
        }
        Ok(json::diff_sections(
            &defaults,
            &current,
            &self.options.diff_sections,
        ))
    }

    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let document = to_document(&self.current, path)?;
        storage::write_document(path, &document)?;
        info!(path = %path.display(), "Exported settings");
        Ok(())
    }

    /// 讀取任一格式的設定並套用於預設值之上；錯誤會回傳。 / Merges a document over the defaults as the new active settings.
    pub fn import_from(&mut self, source: impl AsRef<Path>) -> Result<(), SettingsError> {
        let source = source.as_ref();
        let overlay = storage::read_document(source)?.ok_or_else(|| SettingsError::Read {
            path: source.to_path_buf(),
            source: io::Error::from(io::ErrorKind::NotFound),
        })?;
        let mut merged = self.defaults_document.clone();
        json::merge(&mut merged, overlay);
        self.current = migrate::upgrade(merged).map_err(|err| SettingsError::Deserialize {
            path: source.to_path_buf(),
            source: err,
        })?;
        info!(path = %source.display(), "Imported settings");
        Ok(())
    }
}

fn load_layers(paths: &SettingsPaths, heal: bool) -> Layers {
    let mut report = LoadReport::default();

    let (defaults_document, defaults) = match read_layer(&paths.defaults) {
        Ok(layer) => {
            report.defaults = LayerStatus::Loaded;
            layer
        }
        Err(status) => {
            log_fallback("default", &paths.defaults, &status);
            report.defaults = status;
            let canonical = defaults::canonical_settings();
            let document = serde_json::to_value(&canonical).unwrap_or(Value::Null);
            if heal {
                match storage::write_document(&paths.defaults, &document) {
                    Ok(_) => {
                        report.defaults_regenerated = true;
                        info!(path = %paths.defaults.display(), "Regenerated default settings");
                    }
                    Err(err) => warn!("Could not restore default settings: {err}"),
                }
            }
            (document, canonical)
        }
    };

    let current = match storage::read_document(&paths.user) {
        Ok(Some(overlay)) if overlay.is_object() => {
            let mut merged = defaults_document.clone();
            json::merge(&mut merged, overlay);
            match migrate::upgrade(merged) {
                Ok(settings) => {
                    report.user = LayerStatus::Loaded;
                    settings
                }
                Err(source) => {
                    let err = SettingsError::Deserialize {
                        path: paths.user.clone(),
                        source,
                    };
                    report.user = LayerStatus::Corrupt(err.to_string());
                    defaults.clone()
                }
            }
        }
        Ok(Some(_)) => {
            report.user = LayerStatus::Corrupt("expected a JSON object".to_string());
            defaults.clone()
        }
        Ok(None) => {
            report.user = LayerStatus::Missing;
            defaults.clone()
        }
        Err(err) => {
            report.user = LayerStatus::Corrupt(err.to_string());
            defaults.clone()
        }
    };
    if !report.user.is_loaded() {
        log_fallback("user", &paths.user, &report.user);
    }

    Layers {
        defaults_document,
        defaults,
        current,
        report,
    }
}

fn read_layer(path: &Path) -> Result<(Value, Settings), LayerStatus> {
    let document = match storage::read_document(path) {
        Ok(Some(document)) => document,
        Ok(None) => return Err(LayerStatus::Missing),
        Err(err) => return Err(LayerStatus::Corrupt(err.to_string())),
    };
    match migrate::upgrade(document.clone()) {
        Ok(settings) => Ok((document, settings)),
        Err(source) => {
            let err = SettingsError::Deserialize {
                path: path.to_path_buf(),
                source,
            };
            Err(LayerStatus::Corrupt(err.to_string()))
        }
    }
}

fn log_fallback(layer: &str, path: &Path, status: &LayerStatus) {
    match status {
        LayerStatus::Corrupt(reason) => {
            warn!(layer, path = %path.display(), "Ignoring unreadable settings: {reason}")
        }
        LayerStatus::Missing => debug!(layer, path = %path.display(), "Settings file absent"),
        LayerStatus::Loaded => {}
    }
}

fn to_document(settings: &Settings, path: &Path) -> Result<Value, SettingsError> {
    serde_json::to_value(settings).map_err(|source| SettingsError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

/// Canonical serialization: struct field order is fixed and maps are sorted.
fn snapshot(settings: &Settings) -> String {
    serde_json::to_string_pretty(settings).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn corrupt_default_layer_is_regenerated_on_load() {
        let dir = tempdir().expect("tempdir");
        let paths = SettingsPaths::in_dir(dir.path());
        fs::write(&paths.defaults, "not json").expect("write fixture");

        let store = SettingsStore::load(paths.clone());
        assert!(matches!(store.load_report().defaults, LayerStatus::Corrupt(_)));
        assert!(store.load_report().defaults_regenerated);
        assert_eq!(store.settings(), &Settings::default());

        let healed: Value =
            serde_json::from_str(&fs::read_to_string(&paths.defaults).expect("read defaults"))
                .expect("parse defaults");
        assert_eq!(healed["pdfOptions"]["pdfEngine"], 2);
    }

    #[test]
    fn reload_never_writes() {
        let dir = tempdir().expect("tempdir");
        let paths = SettingsPaths::in_dir(dir.path());
        let mut store = SettingsStore::load(paths.clone());
        fs::remove_file(&paths.defaults).expect("remove defaults");

        let report = store.reload().clone();
        assert_eq!(report.defaults, LayerStatus::Missing);
        assert!(!report.defaults_regenerated);
        assert!(!paths.defaults.exists());
        assert!(!paths.user.exists());
    }

    #[test]
    fn non_object_user_layer_is_corrupt() {
        let dir = tempdir().expect("tempdir");
        let paths = SettingsPaths::in_dir(dir.path());
        fs::write(&paths.user, "[1, 2]").expect("write fixture");

        let store = SettingsStore::load(paths);
        assert!(matches!(store.load_report().user, LayerStatus::Corrupt(_)));
        assert!(!store.is_dirty());
    }

    #[test]
    fn diff_never_contains_annotations() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::load(SettingsPaths::in_dir(dir.path()));
        store.update(|settings| {
            settings.sentence_boundary_mode.info = Some("edited note".into());
            settings.sentence_boundary_mode.value = 3;
        });

        let delta = store.diff().expect("diff");
        assert_eq!(
            Value::Object(delta),
            serde_json::json!({ "sentenceBoundaryMode": { "value": 3 } })
        );
    }

    #[test]
    fn update_normalizes_values() {
        let dir = tempdir().expect("tempdir");
        let mut store = SettingsStore::load(SettingsPaths::in_dir(dir.path()));
        store.update(|settings| {
            settings.pdf_options.short_heading_settings.max_len = 1;
            settings.pdf_options.pdf_engine = 0;
        });
        let options = &store.settings().pdf_options;
        assert_eq!(options.short_heading_settings.max_len, 3);
        assert_eq!(options.pdf_engine, 1);
    }
}
