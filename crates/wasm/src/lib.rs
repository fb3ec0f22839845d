//! WASM bindings for ebook-export. The page turns the returned bytes into a
//! Blob for download or stores them in its export history.

use ebook_export_core::css::stylesheet;
use ebook_export_core::export::{build_epub, ExportOptions};
use ebook_export_core::model::{BookExportModel, TypographyPreset};
use ebook_export_core::sanitize::sanitize_chapter;
use ebook_export_core::security::SecurityLimits;
use wasm_bindgen::prelude::*;

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Export a `BookExportModel` (editor JSON) to EPUB bytes.
#[wasm_bindgen(js_name = exportEpub)]
pub fn export_epub(model_json: &str) -> Result<Vec<u8>, JsValue> {
    let model = BookExportModel::from_json(model_json).map_err(js_err)?;
    let build = build_epub(&model, &ExportOptions::default(), None).map_err(js_err)?;
    Ok(build.bytes)
}

/// Run the export and return only its `ExportReport` as JSON.
#[wasm_bindgen(js_name = exportReport)]
pub fn export_report(model_json: &str) -> Result<String, JsValue> {
    let model = BookExportModel::from_json(model_json).map_err(js_err)?;
    let build = build_epub(&model, &ExportOptions::default(), None).map_err(js_err)?;
    serde_json::to_string(&build.report).map_err(js_err)
}

/// Stylesheet text for a typography preset name.
#[wasm_bindgen(js_name = typographyCss)]
pub fn typography_css(preset: &str) -> String {
    stylesheet(TypographyPreset::from_name(preset))
}

/// Convert one chapter's HTML to an XHTML fragment, as export would.
#[wasm_bindgen(js_name = sanitizeHtml)]
pub fn sanitize_html(html: &str) -> String {
    sanitize_chapter(html, &SecurityLimits::default()).xhtml
}
