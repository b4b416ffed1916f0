//! Upgrade from the legacy flat document shape.
//!
//! Older documents kept the PDF options as top-level fields. They are read
//! here, once, while a document is deserialized; the in-memory [`Settings`]
//! only knows the nested `pdfOptions` block.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::document::{flag, PdfEngine, PdfOptions, Settings, ShortHeadingSettings};

const LEGACY_KEYS: [&str; 5] = [
    "addPdfPageHeader",
    "compactPdfText",
    "autoReflowPdfText",
    "pdfEngine",
    "shortHeadingSettings",
];

/// 舊版頂層 PDF 欄位。 / Legacy top-level PDF fields.
///
/// Converting from [`PdfOptions`] produces the mirrored view older readers
/// expect; the conversion only ever runs nested → legacy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPdfFields {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag::option")]
    pub add_pdf_page_header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag::option")]
    pub compact_pdf_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag::option")]
    pub auto_reflow_pdf_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_engine: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_heading_settings: Option<ShortHeadingSettings>,
}

impl LegacyPdfFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&PdfOptions> for LegacyPdfFields {
    fn from(options: &PdfOptions) -> Self {
        Self {
            add_pdf_page_header: Some(options.add_pdf_page_header),
            compact_pdf_text: Some(options.compact_pdf_text),
            auto_reflow_pdf_text: Some(options.auto_reflow_pdf_text),
            pdf_engine: Some(options.pdf_engine),
            short_heading_settings: Some(options.short_heading_settings.clone()),
        }
    }
}

/// Deserializes a document of either shape into normalized [`Settings`].
pub fn upgrade(mut document: Value) -> Result<Settings, serde_json::Error> {
    let legacy = take_legacy_fields(&mut document)?;
    let mut settings: Settings = serde_json::from_value(document)?;
    normalize(&mut settings, &legacy);
    Ok(settings)
}

/// Moves the legacy keys out of a top-level object. Non-objects are left for
/// the caller's deserialization to reject.
pub fn take_legacy_fields(document: &mut Value) -> Result<LegacyPdfFields, serde_json::Error> {
    let Value::Object(map) = document else {
        return Ok(LegacyPdfFields::default());
    };
    let mut legacy = Map::new();
    for key in LEGACY_KEYS {
        if let Some(value) = map.remove(key) {
            legacy.insert(key.to_string(), value);
        }
    }
    if legacy.is_empty() {
        return Ok(LegacyPdfFields::default());
    }
    serde_json::from_value(Value::Object(legacy))
}

/// Ensures the nested PDF block is configured, migrating legacy values when
/// the engine selector is still at the sentinel, then clamps bounded fields.
pub fn normalize(settings: &mut Settings, legacy: &LegacyPdfFields) {
    let options = &mut settings.pdf_options;
    if !options.is_configured() {
        debug!(legacy = !legacy.is_empty(), "Migrating legacy PDF options");
        if let Some(value) = legacy.add_pdf_page_header {
            options.add_pdf_page_header = value;
        }
        if let Some(value) = legacy.compact_pdf_text {
            options.compact_pdf_text = value;
        }
        if let Some(value) = legacy.auto_reflow_pdf_text {
            options.auto_reflow_pdf_text = value;
        }
        if let Some(heading) = &legacy.short_heading_settings {
            options.short_heading_settings = heading.clone();
        }
        let selector = legacy.pdf_engine.unwrap_or_default();
        options.pdf_engine = PdfEngine::from_selector(selector) as i32;
    }
    settings.sanitize();

    if let Err(err) = settings
        .pdf_options
        .short_heading_settings
        .title_heading_regex()
    {
        warn!("Custom title heading regex does not compile: {err}");
    }
}

/// Writes the legacy mirror of `options` into a serialized top-level object.
pub fn mirror_legacy_fields(
    document: &mut Value,
    options: &PdfOptions,
) -> Result<(), serde_json::Error> {
    let legacy = serde_json::to_value(LegacyPdfFields::from(options))?;
    if let (Value::Object(map), Value::Object(fields)) = (document, legacy) {
        map.extend(fields);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PDF_ENGINE_UNSET;
    use serde_json::json;

    #[test]
    fn sentinel_engine_pulls_in_legacy_values() {
        let settings = upgrade(json!({
            "addPdfPageHeader": 1,
            "pdfEngine": 0,
            "pdfOptions": { "pdfEngine": 0 }
        }))
        .expect("upgrade");

        let options = &settings.pdf_options;
        assert_eq!(options.pdf_engine, 1);
        assert!(options.add_pdf_page_header);

        let legacy = LegacyPdfFields::from(options);
        assert_eq!(legacy.pdf_engine, Some(1));
        assert_eq!(legacy.add_pdf_page_header, Some(true));
    }

    #[test]
    fn missing_nested_block_is_created_from_legacy() {
        let settings = upgrade(json!({
            "compactPdfText": true,
            "pdfEngine": 2,
            "shortHeadingSettings": { "maxLen": 100, "allCjk": 0 }
        }))
        .expect("upgrade");

        let options = &settings.pdf_options;
        assert_eq!(options.pdf_engine, 2);
        assert!(options.compact_pdf_text);
        assert_eq!(options.short_heading_settings.max_len, 30);
        assert!(!options.short_heading_settings.all_cjk);
    }

    #[test]
    fn configured_nested_block_ignores_legacy() {
        let settings = upgrade(json!({
            "addPdfPageHeader": 1,
            "pdfEngine": 1,
            "pdfOptions": { "pdfEngine": 2, "addPdfPageHeader": 0 }
        }))
        .expect("upgrade");
        assert_eq!(settings.pdf_options.pdf_engine, 2);
        assert!(!settings.pdf_options.add_pdf_page_header);
    }

    #[test]
    fn normalized_engine_never_stays_at_sentinel() {
        let mut settings = Settings::default();
        settings.pdf_options.pdf_engine = PDF_ENGINE_UNSET;
        normalize(&mut settings, &LegacyPdfFields::default());
        assert_ne!(settings.pdf_options.pdf_engine, PDF_ENGINE_UNSET);
    }

    #[test]
    fn mirror_writes_flat_fields_matching_nested() {
        let settings = Settings::default();
        let mut document = serde_json::to_value(&settings).expect("serialize");
        mirror_legacy_fields(&mut document, &settings.pdf_options).expect("mirror legacy fields");
        assert_eq!(document["pdfEngine"], document["pdfOptions"]["pdfEngine"]);
        assert_eq!(
            document["shortHeadingSettings"],
            document["pdfOptions"]["shortHeadingSettings"]
        );
        assert_eq!(
            document["autoReflowPdfText"],
            document["pdfOptions"]["autoReflowPdfText"]
        );
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(upgrade(json!([1, 2, 3])).is_err());
        assert!(upgrade(json!("settings")).is_err());
    }
}
