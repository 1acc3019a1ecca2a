use rand::RngCore;
use std::path::Path;
use thiserror::Error;

/// Prefix reserved for processed outputs. Only names carrying it are downloadable.
pub const OUTPUT_PREFIX: &str = "no_bg_";

/// Random bytes in the collision token (16 hex digits)
const TOKEN_BYTES: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid file name.")]
pub struct InvalidFilename;

/// Generates a secure, collision-resistant name for a user-supplied filename.
///
/// The stem keeps only alphanumerics (Unicode included), `_` and `-`, gets a
/// random hex token appended, and the extension is reduced to lowercase ASCII.
/// Fails when the stem is empty once the extension is stripped (`""`, `".png"`).
pub fn secure_filename(filename: &str) -> Result<String, InvalidFilename> {
    let token = random_token();
    build_filename(filename, &token)
}

fn build_filename(filename: &str, token: &str) -> Result<String, InvalidFilename> {
    // Browsers may send a full client path; only the last component matters
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let (stem, ext) = split_extension(name);
    if stem.is_empty() {
        return Err(InvalidFilename);
    }

    if name != filename {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if ext.is_empty() {
        Ok(format!("{}_{}", sanitized, token))
    } else {
        Ok(format!("{}_{}.{}", sanitized, token, ext))
    }
}

/// Splits `name` at its last dot. A leading dot belongs to the extension, so
/// `".png"` has an empty stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Name of the processed output for a staged input: `no_bg_<stem>.png`
pub fn output_filename(input_name: &str) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(input_name);
    format!("{}{}.png", OUTPUT_PREFIX, stem)
}

/// True if `name` is a single, non-special path component
pub fn is_safe_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    !name.chars().any(|c| matches!(c, '/' | '\\' | '\0'))
}

pub fn is_output_name(name: &str) -> bool {
    name.starts_with(OUTPUT_PREFIX)
}
