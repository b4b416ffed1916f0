//! Hard-coded canonical settings document.
//!
//! This is the last fallback tier: it is what gets written to the default
//! settings path when that file is missing or unreadable, and it supplies the
//! value for any field a document leaves out.

use std::collections::BTreeMap;

use crate::document::{
    LanguageProfile, PdfOptions, SentenceBoundaryMode, Settings, ShortHeadingSettings,
};

pub(crate) const BOUNDARY_MODE_INFO: &str =
    "Sentence boundary strictness: 1 = loose, 2 = balanced, 3 = strict";

pub fn canonical_settings() -> Settings {
    Settings {
        languages: default_languages(),
        char_check: default_char_check(),
        punctuation_chars: default_punctuation_chars(),
        text_file_types: default_text_file_types(),
        office_file_types: default_office_file_types(),
        pdf_options: PdfOptions {
            add_pdf_page_header: false,
            compact_pdf_text: false,
            auto_reflow_pdf_text: true,
            pdf_engine: 2,
            short_heading_settings: ShortHeadingSettings::default(),
        },
        sentence_boundary_mode: SentenceBoundaryMode {
            info: Some(BOUNDARY_MODE_INFO.to_string()),
            value: default_boundary_value(),
        },
        punctuation: default_punctuation(),
        convert_filename: false,
        dictionary: default_dictionary(),
        locale: default_locale(),
    }
}

pub(crate) fn default_languages() -> Vec<LanguageProfile> {
    let mut english = LanguageProfile::new(1, "en", &["English", "英文"]);
    english.content_labels = Some(labels(&["Source", "Destination", "Convert"]));
    english.custom_options = Some(labels(&["Punctuation", "Convert filename"]));

    let mut simplified = LanguageProfile::new(2, "zhs", &["简体中文", "Simplified Chinese"]);
    simplified.content_labels = Some(labels(&["来源", "目标", "转换"]));
    simplified.custom_options = Some(labels(&["标点", "转换文件名"]));

    let mut traditional = LanguageProfile::new(3, "zht", &["繁體中文", "Traditional Chinese"]);
    traditional.content_labels = Some(labels(&["來源", "目標", "轉換"]));
    traditional.custom_options = Some(labels(&["標點", "轉換檔名"]));

    vec![english, simplified, traditional]
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub(crate) fn default_char_check() -> u32 {
    50
}

pub(crate) fn default_punctuation_chars() -> BTreeMap<String, String> {
    [("“", "「"), ("”", "」"), ("‘", "『"), ("’", "』")]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

pub(crate) fn default_text_file_types() -> Vec<String> {
    [
        ".txt", ".md", ".csv", ".html", ".xml", ".json", ".srt", ".ass", ".vtt", ".ini",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub(crate) fn default_office_file_types() -> Vec<String> {
    [".docx", ".xlsx", ".pptx", ".odt", ".ods", ".odp", ".epub"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub(crate) fn default_max_heading_len() -> i32 {
    8
}

pub(crate) fn default_boundary_value() -> i32 {
    2
}

pub(crate) fn default_punctuation() -> bool {
    true
}

pub(crate) fn default_dictionary() -> String {
    "dicts".to_string()
}

pub(crate) fn default_locale() -> u32 {
    2
}

pub(crate) fn default_true() -> bool {
    true
}
