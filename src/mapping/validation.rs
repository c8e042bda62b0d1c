//! Message validation helpers shared by the mappings.
//!
//! Everything here runs before a mapping touches any store.

use crate::error::{MappingError, MappingResult};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::sync::LazyLock;

/// File extensions accepted next to a leaflet XML.
pub const ACCEPTED_FILE_EXTENSIONS: &[&str] = &[
    "xml", "apng", "avif", "gif", "jpg", "jpeg", "jfif", "pjpeg", "pjp", "png", "svg", "webp",
    "bmp", "ico", "cur",
];

/// Extensions whose content is markup and goes through the sanitizer.
const MARKUP_EXTENSIONS: &[&str] = &["xml", "svg"];

/// Checks embedded markup. Implementations decide what "forbidden" means.
pub trait ContentSanitizer: Send + Sync {
    /// Returns a description of the offending construct when `content` is rejected.
    fn check(&self, content: &[u8]) -> Result<(), String>;
}

/// Script-like elements, inline event handlers and `javascript:` URLs.
pub const FORBIDDEN_PATTERNS: &[&str] = &[
    r"(?i)<\s*(script|iframe|object|embed|form|link|meta|base)\b",
    r#"(?i)\son[a-z]+\s*=\s*["']"#,
    r"(?i)javascript\s*:",
];

static FORBIDDEN_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FORBIDDEN_PATTERNS
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::error!("Sanitizer pattern {} does not compile: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Rejects active content matching any of its patterns.
pub struct ForbiddenTagSanitizer {
    patterns: Vec<Regex>,
}

impl ForbiddenTagSanitizer {
    /// Sanitizer over [`FORBIDDEN_PATTERNS`].
    pub fn new() -> Self {
        Self {
            patterns: FORBIDDEN_REGEXES.clone(),
        }
    }

    /// Sanitizer over caller-supplied patterns.
    pub fn with_patterns(patterns: &[&str]) -> MappingResult<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    MappingError::Validation(format!("invalid sanitizer pattern {}: {}", pattern, e))
                })
            })
            .collect::<MappingResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

impl Default for ForbiddenTagSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSanitizer for ForbiddenTagSanitizer {
    fn check(&self, content: &[u8]) -> Result<(), String> {
        let text = String::from_utf8_lossy(content);
        for pattern in &self.patterns {
            if let Some(found) = pattern.find(&text) {
                return Err(found.as_str().trim().to_string());
            }
        }
        Ok(())
    }
}

/// GTIN-14: fourteen digits, the last one a GS1 mod-10 check digit.
pub fn validate_gtin(code: &str) -> MappingResult<()> {
    if code.len() != 14 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MappingError::Validation(format!(
            "productCode '{}' must be 14 digits",
            code
        )));
    }

    let digits: Vec<u32> = code.bytes().map(|b| (b - b'0') as u32).collect();
    let (body, check) = digits.split_at(13);
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    let expected = (10 - sum % 10) % 10;

    if check[0] != expected {
        return Err(MappingError::Validation(format!(
            "productCode '{}' has an invalid check digit",
            code
        )));
    }
    Ok(())
}

/// Two-letter language code with an optional region (`en`, `pt-BR`, `fr_CA`).
pub fn validate_language(code: &str) -> MappingResult<()> {
    let bytes = code.as_bytes();
    let valid = match bytes.len() {
        2 => bytes.iter().all(u8::is_ascii_lowercase),
        5 => {
            bytes[..2].iter().all(u8::is_ascii_lowercase)
                && (bytes[2] == b'-' || bytes[2] == b'_')
                && bytes[3..].iter().all(u8::is_ascii_alphabetic)
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(MappingError::Validation(format!(
            "language '{}' is not a valid language code",
            code
        )))
    }
}

/// Batch codes are printed on packs: 1-20 alphanumerics, no path separators.
pub fn validate_batch_code(code: &str) -> MappingResult<()> {
    let valid = !code.is_empty()
        && code.len() <= 20
        && code.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(MappingError::Validation(format!(
            "batchCode '{}' is not valid",
            code
        )))
    }
}

pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn check_file_extension(filename: &str) -> MappingResult<()> {
    match file_extension(filename) {
        Some(ext) if ACCEPTED_FILE_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(MappingError::UnsupportedFormat(filename.to_string())),
    }
}

/// True when files of this name are markup and must be sanitized.
pub fn is_markup(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| MARKUP_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Filenames become content paths, so they may not escape their folder.
pub fn check_filename(filename: &str) -> MappingResult<()> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') || filename == ".." {
        return Err(MappingError::Validation(format!(
            "filename '{}' is not allowed",
            filename
        )));
    }
    Ok(())
}

pub fn decode_base64(field: &str, content: &str) -> MappingResult<Vec<u8>> {
    STANDARD
        .decode(content.trim())
        .map_err(|e| MappingError::Validation(format!("{} is not valid base64: {}", field, e)))
}

pub fn sanitize(sanitizer: &dyn ContentSanitizer, name: &str, content: &[u8]) -> MappingResult<()> {
    sanitizer
        .check(content)
        .map_err(|found| MappingError::ForbiddenContent(format!("{} contains '{}'", name, found)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
}

/// Sniffs the image format from magic bytes.
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else if bytes.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else {
        None
    }
}
