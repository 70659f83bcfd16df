// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Persisted device-configuration snapshots keyed by firmware and
//! hardware revision. A known pair lets a freshly paired pod be
//! fast-configured from the snapshot instead of replaying the whole
//! generation pipeline.

use anyhow::Context;
use device_api::Result;
use indexmap::IndexMap;
use std::path::Path;

fn store_key(firmware_revision: &str, hardware_revision: &str) -> String {
    format!("{firmware_revision}/{hardware_revision}")
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

pub fn from_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(anyhow::anyhow!("odd-length hex string").into());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .with_context(|| format!("bad hex byte at offset {i}"))
                .map_err(Into::into)
        })
        .collect()
}

/// Hex-encoded snapshots, one per `(firmware, hardware)` pair, stored
/// as JSON. Insertion order is kept so diffs of the store file stay
/// readable.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BootstrapStore {
    entries: IndexMap<String, String>,
}

impl BootstrapStore {
    pub fn new() -> Self {
        BootstrapStore::default()
    }

    /// Read a store file; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(BootstrapStore::new());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading bootstrap store {}", path.display()))?;
        let store = serde_json::from_str(&text)
            .with_context(|| format!("parsing bootstrap store {}", path.display()))?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .context("encoding bootstrap store")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing bootstrap store {}", path.display()))?;
        Ok(())
    }

    pub fn record(&mut self, firmware_revision: &str, hardware_revision: &str, snapshot: &[u8]) {
        self.entries
            .insert(store_key(firmware_revision, hardware_revision), to_hex(snapshot));
    }

    pub fn lookup(
        &self,
        firmware_revision: &str,
        hardware_revision: &str,
    ) -> Result<Option<Vec<u8>>> {
        match self.entries.get(&store_key(firmware_revision, hardware_revision)) {
            Some(hex) => Ok(Some(from_hex(hex)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = [0x00, 0x7E, 0xFF, 0x12];
        assert_eq!(to_hex(&bytes), "007EFF12");
        assert_eq!(from_hex("007EFF12").unwrap(), bytes);
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(from_hex("ABC").is_err());
        assert!(from_hex("ZZ").is_err());
    }

    #[test]
    fn record_then_lookup() {
        let mut store = BootstrapStore::new();
        store.record("1.5.0", "0.4", &[0xDE, 0xAD]);
        assert_eq!(store.lookup("1.5.0", "0.4").unwrap(), Some(vec![0xDE, 0xAD]));
        assert_eq!(store.lookup("1.4.4", "0.4").unwrap(), None);
    }

    #[test]
    fn revision_pairs_do_not_collide() {
        let mut store = BootstrapStore::new();
        store.record("1.5.0", "0.4", &[1]);
        store.record("1.5.0", "0.3", &[2]);
        assert_eq!(store.lookup("1.5.0", "0.4").unwrap(), Some(vec![1]));
        assert_eq!(store.lookup("1.5.0", "0.3").unwrap(), Some(vec![2]));
    }
}
