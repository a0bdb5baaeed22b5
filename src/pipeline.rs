//! One scan, start to finish.
//!
//! decode → normalize → locate markers → correct → identifier → score →
//! classify → assemble. Missing markers and a missing identifier degrade the
//! result; anything else that fails aborts the request with a [`ScanError`].

use serde::Serialize;

use crate::classify::{classify_all, AnswerResult};
use crate::debug::render_debug_image;
use crate::errors::ScanError;
use crate::fiducial;
use crate::grid::score_grid;
use crate::identifier::{find_payload, parse_payload, SheetIdentifier, SymbolReader};
use crate::image::{normalize, RawImage};
use crate::template::SheetTemplate;
use crate::warp::correct;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Attach a base64 JPEG overlay of the scored cells
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    #[serde(flatten)]
    pub identifier: SheetIdentifier,
    pub respuestas: Vec<AnswerResult>,
    pub warp_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_image: Option<String>,
}

/// What goes back to the caller: either a full result or `ok: false` with
/// the error message, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub result: Option<ScanResult>,
}

impl From<Result<ScanResult, ScanError>> for ScanResponse {
    fn from(value: Result<ScanResult, ScanError>) -> Self {
        match value {
            Ok(result) => ScanResponse {
                ok: true,
                error: None,
                result: Some(result),
            },
            Err(e) => ScanResponse::failure(e),
        }
    }
}

impl ScanResponse {
    /// `ok: false` carrying `error`'s message, for failures that never reach
    /// the pipeline (unreadable files, reader setup).
    pub fn failure(error: impl ToString) -> Self {
        ScanResponse {
            ok: false,
            error: Some(error.to_string()),
            result: None,
        }
    }
}

/// Everything one scan needs. Owns nothing shared except the borrowed,
/// read-only template.
pub struct ScanContext<'a> {
    template: &'a SheetTemplate,
    reader: &'a dyn SymbolReader,
    options: ScanOptions,
}

impl<'a> ScanContext<'a> {
    pub fn new(
        template: &'a SheetTemplate,
        reader: &'a dyn SymbolReader,
        options: ScanOptions,
    ) -> Result<Self, ScanError> {
        template.layout.validate()?;
        template.config.validate(template.layout.options.len())?;
        Ok(Self {
            template,
            reader,
            options,
        })
    }

    pub fn scan(&self, bytes: &[u8]) -> Result<ScanResult, ScanError> {
        let config = &self.template.config;
        let layout = &self.template.layout;

        let raw = RawImage::decode(bytes)?;
        let norm = normalize(&raw, &config.normalize)?;

        let fiducials = match fiducial::locate(&norm.binary, &config.fiducials)? {
            Ok(set) => Some(set),
            Err(e) => {
                log::warn!("{e}, falling back to deskew");
                None
            }
        };
        let corrected = correct(&norm, fiducials.as_ref(), &config.warp)?;

        let codigo = match find_payload(self.reader, raw.mat(), &config.identifier) {
            Ok(payload) => {
                log::debug!("identifier payload {payload:?}");
                Some(payload)
            }
            Err(e) => {
                log::warn!("{e}");
                None
            }
        };
        let identifier = codigo
            .as_deref()
            .map(|payload| parse_payload(payload, config.identifier.delimiter))
            .unwrap_or_default();

        let scores = score_grid(&corrected, layout, &config.grid)?;
        let respuestas = classify_all(&scores, layout.questions, &layout.options, &config.classifier)?;

        let debug_image = if self.options.debug {
            Some(render_debug_image(&corrected, layout, &scores, &respuestas)?)
        } else {
            None
        };

        Ok(ScanResult {
            codigo,
            identifier,
            respuestas,
            warp_ok: corrected.warp_ok,
            debug_image,
        })
    }

    /// [`Self::scan`], with failures logged and folded into the response.
    pub fn respond(&self, bytes: &[u8]) -> ScanResponse {
        let result = self.scan(bytes);
        if let Err(e) = &result {
            crate::err_log!(e);
        }
        result.into()
    }
}

/// Scan one upload against `template`.
pub fn scan_sheet(
    bytes: &[u8],
    template: &SheetTemplate,
    reader: &dyn SymbolReader,
    options: ScanOptions,
) -> Result<ScanResult, ScanError> {
    ScanContext::new(template, reader, options)?.scan(bytes)
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::layout::Choice;

    fn result(respuestas: Vec<AnswerResult>) -> ScanResult {
        ScanResult {
            codigo: Some("42|7|2026-01-01".to_string()),
            identifier: parse_payload("42|7|2026-01-01", '|'),
            respuestas,
            warp_ok: true,
            debug_image: None,
        }
    }

    #[test]
    fn test_success_payload_shape() {
        let response = ScanResponse::from(Ok(result(vec![
            AnswerResult::Clear(Choice::A),
            AnswerResult::Blank,
        ])));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "ok": true,
                "codigo": "42|7|2026-01-01",
                "id_examen": 42,
                "id_alumno": 7,
                "fecha_qr": "2026-01-01",
                "respuestas": ["A", null],
                "warp_ok": true,
            })
        );
    }

    #[test]
    fn test_failure_payload_shape() {
        let response = ScanResponse::from(Err(ScanError::Decode));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "ok": false, "error": "Unable to decode image bytes" })
        );
    }

    #[test]
    fn test_failure_message_is_escaped() {
        let message = "cannot read \"scan 1.png\": not found\n\\tmp";
        let line = serde_json::to_string(&ScanResponse::failure(message)).unwrap();
        assert!(!line.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, serde_json::json!({ "ok": false, "error": message }));
    }

    #[test]
    fn test_missing_identifier_fields_are_null() {
        let mut without_code = result(vec![AnswerResult::Weak]);
        without_code.codigo = None;
        without_code.identifier = SheetIdentifier::default();
        without_code.debug_image = Some("aGk=".to_string());
        let json = serde_json::to_value(ScanResponse::from(Ok(without_code))).unwrap();
        assert_eq!(json["id_examen"], serde_json::Value::Null);
        assert!(json.get("codigo").is_none());
        assert_eq!(json["respuestas"], serde_json::json!(["?"]));
        assert_eq!(json["debug_image"], "aGk=");
    }
}
