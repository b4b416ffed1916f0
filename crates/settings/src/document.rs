use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::defaults;

/// 引擎選擇尚未由任何設定層指定。 / Engine selector value meaning "not configured yet".
pub const PDF_ENGINE_UNSET: i32 = 0;
pub const MIN_HEADING_LEN: i32 = 3;
pub const MAX_HEADING_LEN: i32 = 30;

/// 完整設定文件（目前版本的結構）。 / The settings document in its current schema.
///
/// Legacy flat PDF fields are not part of this type: they are accepted at the
/// deserialization boundary by [`crate::migrate::upgrade`] and re-emitted only
/// through [`crate::LegacyPdfFields`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "defaults::default_languages")]
    pub languages: Vec<LanguageProfile>,
    #[serde(default = "defaults::default_char_check")]
    pub char_check: u32,
    #[serde(default = "defaults::default_punctuation_chars", alias = "punctuations")]
    pub punctuation_chars: BTreeMap<String, String>,
    #[serde(default = "defaults::default_text_file_types")]
    pub text_file_types: Vec<String>,
    #[serde(default = "defaults::default_office_file_types")]
    pub office_file_types: Vec<String>,
    #[serde(default)]
    pub pdf_options: PdfOptions,
    #[serde(default)]
    pub sentence_boundary_mode: SentenceBoundaryMode,
    #[serde(default = "defaults::default_punctuation", with = "flag")]
    pub punctuation: bool,
    #[serde(default, with = "flag")]
    pub convert_filename: bool,
    #[serde(default = "defaults::default_dictionary")]
    pub dictionary: String,
    #[serde(default = "defaults::default_locale")]
    pub locale: u32,
}

impl Default for Settings {
    fn default() -> Self {
        defaults::canonical_settings()
    }
}

impl Settings {
    /// 將數值限制在合法範圍內；不會拒絕任何輸入。 / Clamps bounded fields, never rejects.
    pub fn sanitize(&mut self) {
        self.pdf_options.sanitize();
        self.sentence_boundary_mode.sanitize();
        self.punctuation_chars.retain(|key, value| {
            let valid = is_single_char(key) && is_single_char(value);
            if !valid {
                warn!(key = %key, value = %value, "Dropping malformed punctuation mapping");
            }
            valid
        });
    }

    /// 目前語系對應的語言設定檔。 / Language profile selected by `locale`.
    pub fn active_language(&self) -> Option<&LanguageProfile> {
        self.languages
            .iter()
            .find(|profile| profile.id == self.locale)
    }

    /// 依副檔名判斷檔案類型。 / Classifies a file extension against the recognized lists.
    pub fn classify_extension(&self, extension: &str) -> Option<FileKind> {
        let needle = normalize_extension(extension);
        let matches = |list: &[String]| list.iter().any(|ext| normalize_extension(ext) == needle);
        if matches(&self.text_file_types) {
            Some(FileKind::Text)
        } else if matches(&self.office_file_types) {
            Some(FileKind::Office)
        } else {
            None
        }
    }

    pub fn map_punctuation(&self, ch: char) -> char {
        let mut buf = [0u8; 4];
        let key: &str = ch.encode_utf8(&mut buf);
        self.punctuation_chars
            .get(key)
            .and_then(|mapped| mapped.chars().next())
            .unwrap_or(ch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Office,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProfile {
    pub id: u32,
    pub code: String,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_options: Option<Vec<String>>,
}

impl LanguageProfile {
    pub fn new(id: u32, code: impl Into<String>, names: &[&str]) -> Self {
        Self {
            id,
            code: code.into(),
            name: names.iter().map(|name| name.to_string()).collect(),
            content_labels: None,
            custom_options: None,
        }
    }

    /// 主要顯示名稱。 / Primary display name, falling back to the code.
    pub fn display_name(&self) -> &str {
        self.name.first().map(String::as_str).unwrap_or(&self.code)
    }
}

/// PDF 擷取選項。 / PDF extraction options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    #[serde(default, with = "flag")]
    pub add_pdf_page_header: bool,
    #[serde(default, with = "flag")]
    pub compact_pdf_text: bool,
    #[serde(default, with = "flag")]
    pub auto_reflow_pdf_text: bool,
    #[serde(default)]
    pub pdf_engine: i32,
    #[serde(default)]
    pub short_heading_settings: ShortHeadingSettings,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            add_pdf_page_header: false,
            compact_pdf_text: false,
            auto_reflow_pdf_text: false,
            pdf_engine: PDF_ENGINE_UNSET,
            short_heading_settings: ShortHeadingSettings::default(),
        }
    }
}

impl PdfOptions {
    pub fn is_configured(&self) -> bool {
        self.pdf_engine != PDF_ENGINE_UNSET
    }

    /// 目前選用的引擎；未設定時回傳預設引擎。 / Selected engine, defaulting when unset.
    pub fn engine(&self) -> PdfEngine {
        PdfEngine::from_selector(self.pdf_engine)
    }

    fn sanitize(&mut self) {
        if self.is_configured() {
            self.pdf_engine = self.engine() as i32;
        }
        self.short_heading_settings.sanitize();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfEngine {
    Native = 1,
    Pdfium = 2,
}

impl PdfEngine {
    /// Values below the range (including the unset sentinel) map to `Native`,
    /// values above it to `Pdfium`.
    pub fn from_selector(selector: i32) -> Self {
        if selector >= PdfEngine::Pdfium as i32 {
            PdfEngine::Pdfium
        } else {
            PdfEngine::Native
        }
    }
}

/// 短標題偵測設定。 / Short heading detection rules for reflowed PDF text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortHeadingSettings {
    #[serde(default = "defaults::default_max_heading_len")]
    pub max_len: i32,
    #[serde(default = "defaults::default_true", with = "flag")]
    pub all_cjk: bool,
    #[serde(default = "defaults::default_true", with = "flag")]
    pub all_ascii: bool,
    #[serde(default = "defaults::default_true", with = "flag")]
    pub all_ascii_digits: bool,
    #[serde(default, with = "flag")]
    pub mixed_cjk_ascii: bool,
    // Written as null when cleared so it overrides a pattern in the defaults.
    #[serde(default)]
    pub custom_title_heading_regex: Option<String>,
}

impl Default for ShortHeadingSettings {
    fn default() -> Self {
        Self {
            max_len: defaults::default_max_heading_len(),
            all_cjk: true,
            all_ascii: true,
            all_ascii_digits: true,
            mixed_cjk_ascii: false,
            custom_title_heading_regex: None,
        }
    }
}

impl ShortHeadingSettings {
    pub fn sanitize(&mut self) {
        self.max_len = self.max_len.clamp(MIN_HEADING_LEN, MAX_HEADING_LEN);
    }

    /// 編譯自訂標題樣式；空白樣式視為未設定。 / Compiles the custom title pattern, if any.
    pub fn title_heading_regex(&self) -> Result<Option<Regex>, regex::Error> {
        match self.custom_title_heading_regex.as_deref().map(str::trim) {
            Some(pattern) if !pattern.is_empty() => Regex::new(pattern).map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceBoundaryMode {
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default = "defaults::default_boundary_value")]
    pub value: i32,
}

impl Default for SentenceBoundaryMode {
    fn default() -> Self {
        Self {
            info: None,
            value: defaults::default_boundary_value(),
        }
    }
}

impl SentenceBoundaryMode {
    pub fn strictness(&self) -> BoundaryStrictness {
        match self.value {
            i32::MIN..=1 => BoundaryStrictness::Loose,
            2 => BoundaryStrictness::Balanced,
            _ => BoundaryStrictness::Strict,
        }
    }

    fn sanitize(&mut self) {
        self.value = self.strictness() as i32;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStrictness {
    Loose = 1,
    Balanced = 2,
    Strict = 3,
}

fn is_single_char(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some() && chars.next().is_none()
}

fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

/// 0/1 整數旗標；讀取時亦接受布林值。 / Integer 0/1 flags that also accept JSON booleans.
pub(crate) mod flag {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a 0/1 flag or a boolean")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<bool, E> {
            Ok(value != 0.0)
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(flag) => serializer.serialize_some(&u8::from(*flag)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] bool);

            let wrapped = Option::<Wrapped>::deserialize(deserializer)?;
            Ok(wrapped.map(|Wrapped(flag)| flag))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_accept_integers_and_booleans() {
        let options: PdfOptions = serde_json::from_value(json!({
            "addPdfPageHeader": 1,
            "compactPdfText": true,
            "autoReflowPdfText": 0,
            "pdfEngine": 2
        }))
        .expect("pdf options");
        assert!(options.add_pdf_page_header);
        assert!(options.compact_pdf_text);
        assert!(!options.auto_reflow_pdf_text);

        let written = serde_json::to_value(&options).expect("serialize");
        assert_eq!(written["compactPdfText"], json!(1));
        assert_eq!(written["autoReflowPdfText"], json!(0));
    }

    #[test]
    fn max_len_is_clamped_not_rejected() {
        for (raw, expected) in [(1, 3), (100, 30), (3, 3), (12, 12), (30, 30), (-4, 3)] {
            let mut heading = ShortHeadingSettings {
                max_len: raw,
                ..ShortHeadingSettings::default()
            };
            heading.sanitize();
            assert_eq!(heading.max_len, expected, "maxLen {raw}");
        }
    }

    #[test]
    fn configured_engine_is_clamped_and_sentinel_preserved() {
        let mut options = PdfOptions {
            pdf_engine: 7,
            ..PdfOptions::default()
        };
        options.sanitize();
        assert_eq!(options.pdf_engine, 2);

        let mut unset = PdfOptions::default();
        unset.sanitize();
        assert_eq!(unset.pdf_engine, PDF_ENGINE_UNSET);
        assert_eq!(unset.engine(), PdfEngine::Native);
    }

    #[test]
    fn boundary_mode_falls_into_range() {
        let mut mode = SentenceBoundaryMode {
            info: None,
            value: 9,
        };
        mode.sanitize();
        assert_eq!(mode.value, 3);
        mode.value = 0;
        mode.sanitize();
        assert_eq!(mode.strictness(), BoundaryStrictness::Loose);
    }

    #[test]
    fn punctuation_alias_and_malformed_entries() {
        let mut settings: Settings = serde_json::from_value(json!({
            "punctuations": { "“": "「", "ab": "x", "”": "」" }
        }))
        .expect("settings");
        settings.sanitize();
        assert_eq!(settings.punctuation_chars.len(), 2);
        assert_eq!(settings.map_punctuation('“'), '「');
        assert_eq!(settings.map_punctuation('。'), '。');
    }

    #[test]
    fn classify_extension_ignores_case_and_dot() {
        let settings = Settings::default();
        assert_eq!(settings.classify_extension("TXT"), Some(FileKind::Text));
        assert_eq!(settings.classify_extension(".docx"), Some(FileKind::Office));
        assert_eq!(settings.classify_extension("exe"), None);
    }

    #[test]
    fn custom_title_regex_compiles_on_demand() {
        let mut heading = ShortHeadingSettings::default();
        assert!(heading.title_heading_regex().expect("valid pattern").is_none());
        heading.custom_title_heading_regex = Some(r"^第[一二三四五六七八九十]+章".into());
        let regex = heading.title_heading_regex().expect("valid pattern").expect("pattern set");
        assert!(regex.is_match("第三章 開始"));
        heading.custom_title_heading_regex = Some("(".into());
        assert!(heading.title_heading_regex().is_err());
    }
}
