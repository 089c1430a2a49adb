//! Savegame codec: versioned envelope, canonical JSON, zlib compression.
//!
//! On disk a save is `zlib(json({"state": .., "version": N}))` with keys
//! sorted at every level, so the same state always encodes to the same
//! bytes. Decoding migrates older envelopes forward and then checks every
//! field-level invariant before a state is handed back.

use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::SaveGameError,
    migration::{MigrationRegistry, CURRENT_VERSION},
    state::GameState,
};

pub const COMPRESSION_LEVEL: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveGame {
    pub version: u32,
    pub state:   GameState,
}

impl SaveGame {
    pub fn from_state(state: &GameState) -> Self {
        Self { version: CURRENT_VERSION, state: state.clone() }
    }
}

pub fn encode_savegame(save: &SaveGame) -> Result<Vec<u8>, SaveGameError> {
    encode_with_level(save, COMPRESSION_LEVEL)
}

pub fn encode_with_level(save: &SaveGame, level: u32) -> Result<Vec<u8>, SaveGameError> {
    // Going through Value sorts object keys (serde_json maps are BTreeMaps).
    let canonical = serde_json::to_value(save).map_err(SaveGameError::Parse)?;
    let payload = serde_json::to_vec(&canonical).map_err(SaveGameError::Parse)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(&payload).map_err(SaveGameError::Encode)?;
    encoder.finish().map_err(SaveGameError::Encode)
}

pub fn decode_savegame(bytes: &[u8]) -> Result<SaveGame, SaveGameError> {
    decode_with(bytes, &MigrationRegistry::standard())
}

pub fn decode_with(bytes: &[u8], registry: &MigrationRegistry) -> Result<SaveGame, SaveGameError> {
    let mut buffer = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut buffer)
        .map_err(SaveGameError::Decompress)?;

    let envelope = match serde_json::from_slice::<Value>(&buffer).map_err(SaveGameError::Parse)? {
        Value::Object(map) => map,
        _ => return Err(SaveGameError::NotAnObject),
    };

    let version = envelope
        .get("version")
        .and_then(Value::as_u64)
        .ok_or(SaveGameError::MissingVersion)?;
    let from = u32::try_from(version).map_err(|_| SaveGameError::UnsupportedVersion(version))?;
    if from > CURRENT_VERSION || !registry.can_migrate(from, CURRENT_VERSION) {
        return Err(SaveGameError::UnsupportedVersion(version));
    }

    let migrated = registry.migrate(envelope, from, CURRENT_VERSION)?;
    let save: SaveGame =
        serde_json::from_value(Value::Object(migrated)).map_err(SaveGameError::Schema)?;
    save.state.validate()?;
    Ok(save)
}

/// Write `state` to `path` as one whole buffer. Atomic replacement is the caller's job.
pub fn save_game(path: &Path, state: &GameState) -> Result<(), SaveGameError> {
    let bytes = encode_savegame(&SaveGame::from_state(state))?;
    fs::write(path, bytes).map_err(|source| SaveGameError::Io {
        path: path.display().to_string(),
        source,
    })?;
    log::info!("savegame: wrote tick {} to {}", state.tick, path.display());
    Ok(())
}

pub fn load_game(path: &Path) -> Result<GameState, SaveGameError> {
    let bytes = fs::read(path).map_err(|source| SaveGameError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let save = decode_savegame(&bytes)?;
    log::info!("savegame: loaded tick {} from {}", save.state.tick, path.display());
    Ok(save.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetCatalog, EconomyConfig};
    use serde_json::json;

    fn compress(value: &Value) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serde_json::to_vec(value).unwrap()).unwrap();
        encoder.finish().unwrap()
    }

    fn state() -> GameState {
        GameState::initial(&AssetCatalog::default_test(), &EconomyConfig::default())
            .with_tick(12)
            .apply_cash_delta(1234.5678)
    }

    #[test]
    fn encoding_is_canonical() {
        let save = SaveGame::from_state(&state());
        assert_eq!(encode_savegame(&save).unwrap(), encode_savegame(&save).unwrap());

        let mut raw = Vec::new();
        ZlibDecoder::new(&encode_savegame(&save).unwrap()[..])
            .read_to_end(&mut raw)
            .unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with(r#"{"state":{"achievements":[],"cash":1234.5678"#));
        assert!(text.ends_with(r#""version":2}"#));
    }

    #[test]
    fn round_trip_preserves_state() {
        let save = SaveGame::from_state(&state());
        let decoded = decode_savegame(&encode_savegame(&save).unwrap()).unwrap();
        assert_eq!(decoded, save);
    }

    #[test]
    fn version_one_payload_is_migrated() {
        let bytes = compress(&json!({
            "version": 1,
            "state": { "tick": 3, "cash": 10.0, "reputation": 48.5 }
        }));
        let save = decode_savegame(&bytes).unwrap();
        assert_eq!(save.version, CURRENT_VERSION);
        assert_eq!(save.state.tick, 3);
        assert!(save.state.team.is_empty());
        assert!(save.state.products.is_empty());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let bytes = compress(&json!({ "version": 99, "state": {} }));
        assert!(matches!(decode_savegame(&bytes), Err(SaveGameError::UnsupportedVersion(99))));
    }

    #[test]
    fn missing_version_is_rejected() {
        let bytes = compress(&json!({ "state": {} }));
        assert!(matches!(decode_savegame(&bytes), Err(SaveGameError::MissingVersion)));
    }

    #[test]
    fn corrupted_buffer_fails_to_decode() {
        let mut bytes = encode_savegame(&SaveGame::from_state(&state())).unwrap();
        bytes.truncate(bytes.len() / 2);
        // A cut stream either fails inside zlib or leaves truncated JSON behind.
        assert!(matches!(
            decode_savegame(&bytes),
            Err(SaveGameError::Decompress(_) | SaveGameError::Parse(_))
        ));
        assert!(matches!(
            decode_savegame(b"not a save"),
            Err(SaveGameError::Decompress(_) | SaveGameError::Parse(_))
        ));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let bytes = compress(&json!([1, 2, 3]));
        assert!(matches!(decode_savegame(&bytes), Err(SaveGameError::NotAnObject)));
    }

    #[test]
    fn invariant_violations_are_reported() {
        let mut bad = state();
        bad.reputation = 101.0;
        let bytes = compress(&json!({ "version": 2, "state": serde_json::to_value(&bad).unwrap() }));
        assert!(matches!(decode_savegame(&bytes), Err(SaveGameError::Invariant { .. })));
    }

    #[test]
    fn schema_mismatch_is_reported() {
        let bytes = compress(&json!({ "version": 2, "state": { "tick": "soon" } }));
        assert!(matches!(decode_savegame(&bytes), Err(SaveGameError::Schema(_))));
    }

    #[test]
    fn save_and_load_through_a_file() {
        let path = std::env::temp_dir().join(format!("tycoon-save-{}.bin", std::process::id()));
        save_game(&path, &state()).unwrap();
        let loaded = load_game(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, state());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("tycoon-save-does-not-exist.bin");
        assert!(matches!(load_game(&path), Err(SaveGameError::Io { .. })));
    }
}
