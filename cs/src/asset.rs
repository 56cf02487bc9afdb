//! Write-once binary assets
//!
//! Assets live under `<data-dir>/assets/` as `<client-id>_<uuid-hex>.<ext>`
//! and are referenced by the relative path `assets/<file>`.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};
use uuid::Uuid;

use crate::atomic::write_new;
use crate::error::{StoreError, StoreResult};

/// Subdirectory of the data dir holding assets
pub const ASSETS_DIR: &str = "assets";

/// Extension used when the payload does not say what it is
pub const DEFAULT_EXTENSION: &str = "bin";

/// A decoded asset payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPayload {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl AssetPayload {
    /// Decode a base64 payload, optionally prefixed `data:<mime>/<subtype>;...,`
    pub fn from_data_uri(payload: &str) -> StoreResult<Self> {
        let (header, body) = match payload.split_once(',') {
            Some((header, body)) => (Some(header), body),
            None => (None, payload),
        };
        let extension = header
            .and_then(extension_from_header)
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

        let bytes = STANDARD
            .decode(body.trim())
            .map_err(|e| StoreError::InvalidAsset(e.to_string()))?;
        debug!(%extension, bytes = bytes.len(), "AssetPayload::from_data_uri: decoded");
        Ok(Self { extension, bytes })
    }

    /// Read an existing file, taking the (lowercased) extension from its name
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| sanitize_component(&e.to_ascii_lowercase()))
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        Ok(Self { extension, bytes })
    }
}

fn extension_from_header(header: &str) -> Option<String> {
    let mime = header.strip_prefix("data:")?;
    let (_, subtype) = mime.split_once('/')?;
    let (subtype, _) = subtype.split_once(';')?;
    // Structured suffixes name the encoding, not the format: `svg+xml` is svg
    let subtype = subtype.split('+').next().unwrap_or(subtype);
    let ext = sanitize_component(&subtype.to_ascii_lowercase());
    (!ext.is_empty()).then_some(ext)
}

/// Keep ASCII alphanumerics, `-` and `_`; everything else becomes `_`
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Generate `<client-id>_<uuid-hex>.<ext>`
pub fn asset_file_name(client_id: &str, extension: &str) -> String {
    let id = sanitize_component(client_id);
    let id = if id.is_empty() { "asset".to_string() } else { id };
    format!("{}_{}.{}", id, Uuid::now_v7().simple(), extension)
}

/// Store `payload` as a new asset under `data_dir`; returns `assets/<file>`
pub fn save_asset(data_dir: &Path, client_id: &str, payload: &AssetPayload) -> StoreResult<String> {
    let assets_dir = data_dir.join(ASSETS_DIR);
    fs::create_dir_all(&assets_dir).map_err(|e| StoreError::io(&assets_dir, e))?;

    let file_name = asset_file_name(client_id, &payload.extension);
    let path: PathBuf = assets_dir.join(&file_name);
    write_new(&path, &payload.bytes)?;

    info!(file = %file_name, bytes = payload.bytes.len(), "Asset saved");
    Ok(format!("{}/{}", ASSETS_DIR, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn is_asset_path(path: &str, id: &str, ext: &str) -> bool {
        let Some(rest) = path.strip_prefix(&format!("assets/{}_", id)) else {
            return false;
        };
        let Some(hex) = rest.strip_suffix(&format!(".{}", ext)) else {
            return false;
        };
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[test]
    fn test_png_data_uri() {
        let dir = TempDir::new().unwrap();
        let payload = AssetPayload::from_data_uri("data:image/png;base64,AAAA").unwrap();
        assert_eq!(payload.extension, "png");
        assert_eq!(payload.bytes, vec![0u8, 0, 0]);

        let path = save_asset(dir.path(), "icon1", &payload).unwrap();

        assert!(is_asset_path(&path, "icon1", "png"), "{}", path);
        assert_eq!(fs::read(dir.path().join(&path)).unwrap(), vec![0u8, 0, 0]);
    }

    #[test]
    fn test_payload_without_prefix_is_bin() {
        let dir = TempDir::new().unwrap();
        let payload = AssetPayload::from_data_uri("AAAA").unwrap();
        assert_eq!(payload.extension, "bin");

        let path = save_asset(dir.path(), "icon1", &payload).unwrap();
        assert!(is_asset_path(&path, "icon1", "bin"), "{}", path);
    }

    #[test]
    fn test_header_without_mime_is_bin() {
        let payload = AssetPayload::from_data_uri("something,AAAA").unwrap();
        assert_eq!(payload.extension, "bin");
    }

    #[test]
    fn test_svg_subtype_drops_structured_suffix() {
        let dir = TempDir::new().unwrap();
        let payload = AssetPayload::from_data_uri("data:image/svg+xml;base64,AAAA").unwrap();
        assert_eq!(payload.extension, "svg");

        let path = save_asset(dir.path(), "logo", &payload).unwrap();
        assert!(is_asset_path(&path, "logo", "svg"), "{}", path);
    }

    #[test]
    fn test_odd_subtype_characters_are_sanitized() {
        let payload = AssetPayload::from_data_uri("data:image/X.Icon;base64,AAAA").unwrap();
        assert_eq!(payload.extension, "x_icon");
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result = AssetPayload::from_data_uri("data:image/png;base64,@@@");
        assert!(matches!(result, Err(StoreError::InvalidAsset(_))));
    }

    #[test]
    fn test_client_id_cannot_escape_assets_dir() {
        let name = asset_file_name("../../etc/passwd", "png");
        assert!(!name.contains('/'));
        assert!(name.starts_with("______etc_passwd_"));
    }

    #[test]
    fn test_names_are_unique() {
        let a = asset_file_name("icon", "png");
        let b = asset_file_name("icon", "png");
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_file_uses_extension() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("photo.JPG");
        fs::write(&source, [1u8, 2, 3]).unwrap();

        let payload = AssetPayload::from_file(&source).unwrap();

        assert_eq!(payload.extension, "jpg");
        assert_eq!(payload.bytes, vec![1u8, 2, 3]);
    }
}
