//! Upload checks run before bytes reach the render engine
//!
//! These only look at the name, declared type and raw header; full parsing
//! happens in `RenderEngine::load`.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::IntakeError;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// What intake learned about an accepted upload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadInfo {
    pub file_name: String,
    pub size_bytes: usize,
    /// Header version, e.g. "1.7"
    pub version: String,
}

/// Accept or reject a dropped or picked file.
///
/// The type check passes when either the declared MIME type is
/// `application/pdf` or the name ends in `.pdf`; browsers report an empty
/// type for some drag sources.
pub fn validate_upload(
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<UploadInfo, IntakeError> {
    let declared_pdf = mime_type.trim().eq_ignore_ascii_case(PDF_MIME_TYPE);
    let named_pdf = file_name.to_ascii_lowercase().ends_with(".pdf");
    if !declared_pdf && !named_pdf {
        warn!(file_name, mime_type, "Rejected upload with unsupported type");
        let shown = if mime_type.is_empty() { file_name } else { mime_type };
        return Err(IntakeError::UnsupportedType(shown.to_string()));
    }

    if bytes.is_empty() {
        return Err(IntakeError::Empty);
    }

    if bytes.len() > max_bytes {
        warn!(size = bytes.len(), limit = max_bytes, "Rejected oversized upload");
        return Err(IntakeError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    check_header(bytes)?;

    let info = UploadInfo {
        file_name: file_name.to_string(),
        size_bytes: bytes.len(),
        version: extract_version(bytes),
    };
    debug!(?info, "Accepted upload");
    Ok(info)
}

fn check_header(bytes: &[u8]) -> Result<(), IntakeError> {
    if bytes.len() < 8 {
        return Err(IntakeError::InvalidHeader(
            "file too small to be a valid PDF".to_string(),
        ));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(IntakeError::InvalidHeader(
            "missing %PDF- header".to_string(),
        ));
    }
    Ok(())
}

/// Header check plus a trailing `%%EOF` marker, without parsing
pub fn quick_validate(bytes: &[u8]) -> Result<(), IntakeError> {
    check_header(bytes)?;

    let tail = if bytes.len() > 1024 {
        &bytes[bytes.len() - 1024..]
    } else {
        bytes
    };

    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err(IntakeError::InvalidHeader(
            "PDF appears truncated (missing %%EOF marker)".to_string(),
        ));
    }

    Ok(())
}

/// Version from the `%PDF-x.y` header, "1.4" when unreadable
pub fn extract_version(bytes: &[u8]) -> String {
    if bytes.len() >= 8 && bytes.starts_with(b"%PDF-") {
        if let Ok(version) = std::str::from_utf8(&bytes[5..8]) {
            return version.trim().to_string();
        }
    }
    "1.4".to_string()
}
