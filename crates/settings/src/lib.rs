pub mod defaults;
pub mod document;
pub mod json;
pub mod migrate;
mod storage;
pub mod store;

pub use defaults::canonical_settings;
pub use document::{
    BoundaryStrictness, FileKind, LanguageProfile, PdfEngine, PdfOptions, SentenceBoundaryMode,
    Settings, ShortHeadingSettings, MAX_HEADING_LEN, MIN_HEADING_LEN, PDF_ENGINE_UNSET,
};
pub use migrate::LegacyPdfFields;
pub use store::{
    LayerStatus, LoadReport, SettingsError, SettingsPaths, SettingsStore, StoreOptions,
    DIFF_SECTIONS,
};
