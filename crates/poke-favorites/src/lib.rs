//! Per-user favorite Pokémon store with whole-file persistence.
//!
//! State lives in memory and is rewritten to a single JSON file (atomically,
//! temp file + rename) whenever a mutation changes it. Load and persist
//! failures are logged and swallowed; in-memory state stays authoritative
//! for the remainder of the process.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use poke_core::{capitalize_first, write_text_atomic};


/// Upper bound (exclusive) for hash-derived fallback ids.
const FALLBACK_ID_RANGE: u64 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// A saved `{id, name}` pair representing a liked Pokémon.
pub struct FavoriteEntry {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Result of an add operation: the user's list after the call.
pub struct AddOutcome {
    pub user_id: String,
    pub favorites: Vec<FavoriteEntry>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Result of a remove-by-name operation.
pub struct RemoveOutcome {
    pub success: bool,
    pub message: String,
    pub user_id: String,
    pub favorites_count: usize,
    pub favorites: Vec<FavoriteEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
/// Result of a remove-by-id operation.
pub struct RemoveByIdOutcome {
    pub removed: usize,
    pub favorites_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Read-only snapshot of a user's favorites with a count field.
pub struct FavoritesSnapshot {
    pub user_id: String,
    pub favorites_count: usize,
    pub favorites: Vec<FavoriteEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Read-only favorites list without the count field.
pub struct FavoritesList {
    pub user_id: String,
    pub favorites: Vec<FavoriteEntry>,
}

/// In-memory favorites mapping persisted to one JSON file.
///
/// Reads never create user keys; writes create them eagerly. Persistence
/// happens exactly when a mutation changed the in-memory state.
pub struct FavoritesStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, Vec<FavoriteEntry>>>,
}

impl FavoritesStore {
    /// Opens the store, merging any previously persisted state.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = load_state(&path);
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a Pokémon to `user_id`'s list, resolving the id from (in order)
    /// the explicit `pokemon_id`, a trailing `-<digits>` name suffix, or a
    /// stable hash of the name. A duplicate id is a no-op.
    pub fn add_favorite(
        &self,
        user_id: &str,
        pokemon_name: &str,
        pokemon_id: Option<u32>,
    ) -> AddOutcome {
        let entry = resolve_entry(pokemon_name, pokemon_id);
        let message = format!("Added {} to favorites.", entry.name);

        let mut state = self.lock_state();
        let favorites = state.entry(user_id.to_string()).or_default();
        let duplicate = favorites.iter().any(|existing| existing.id == entry.id);
        if !duplicate {
            favorites.push(entry);
        }
        let snapshot = favorites.clone();

        // A fresh user key implies a non-duplicate entry, so this also covers
        // key creation.
        if !duplicate {
            self.persist(&state);
        }

        AddOutcome {
            user_id: user_id.to_string(),
            favorites: snapshot,
            message,
        }
    }

    /// Removes every entry whose stored name matches `pokemon_name`
    /// case-insensitively after trimming.
    pub fn remove_favorite_by_name(&self, user_id: &str, pokemon_name: &str) -> RemoveOutcome {
        let normalized = pokemon_name.trim().to_lowercase();

        let mut state = self.lock_state();
        let Some(favorites) = state.get_mut(user_id) else {
            return RemoveOutcome {
                success: false,
                message: "User not found or has no favorites".to_string(),
                user_id: user_id.to_string(),
                favorites_count: 0,
                favorites: Vec::new(),
            };
        };

        let before = favorites.len();
        favorites.retain(|entry| entry.name.to_lowercase() != normalized);
        let after = favorites.len();
        let snapshot = favorites.clone();

        if after < before {
            self.persist(&state);
            RemoveOutcome {
                success: true,
                message: format!("Removed {pokemon_name} from favorites"),
                user_id: user_id.to_string(),
                favorites_count: after,
                favorites: snapshot,
            }
        } else {
            RemoveOutcome {
                success: false,
                message: format!("Could not find {pokemon_name} in your favorites"),
                user_id: user_id.to_string(),
                favorites_count: after,
                favorites: snapshot,
            }
        }
    }

    /// Removes every entry with a matching id.
    pub fn remove_favorite_by_id(&self, user_id: &str, pokemon_id: u32) -> RemoveByIdOutcome {
        let mut state = self.lock_state();
        let Some(favorites) = state.get_mut(user_id) else {
            return RemoveByIdOutcome {
                removed: 0,
                favorites_count: 0,
            };
        };

        let before = favorites.len();
        favorites.retain(|entry| entry.id != pokemon_id);
        let after = favorites.len();

        if after < before {
            self.persist(&state);
        }

        RemoveByIdOutcome {
            removed: before - after,
            favorites_count: after,
        }
    }

    /// Read-only snapshot; unknown users get a zero-count result and no key.
    pub fn get_user_favorites(&self, user_id: &str) -> FavoritesSnapshot {
        let state = self.lock_state();
        let favorites = state.get(user_id).cloned().unwrap_or_default();
        FavoritesSnapshot {
            user_id: user_id.to_string(),
            favorites_count: favorites.len(),
            favorites,
        }
    }

    /// Read-only list without the count field.
    pub fn get_favorites(&self, user_id: &str) -> FavoritesList {
        let state = self.lock_state();
        let favorites = state.get(user_id).cloned().unwrap_or_default();
        FavoritesList {
            user_id: user_id.to_string(),
            favorites,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<FavoriteEntry>>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, state: &BTreeMap<String, Vec<FavoriteEntry>>) {
        let rendered = match serde_json::to_string_pretty(state) {
            Ok(rendered) => rendered,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize favorites state");
                return;
            }
        };
        if let Err(error) = write_text_atomic(&self.path, &rendered) {
            tracing::warn!(
                %error,
                path = %self.path.display(),
                "failed to persist favorites file"
            );
        }
    }
}

fn load_state(path: &Path) -> BTreeMap<String, Vec<FavoriteEntry>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no favorites file found, starting empty");
        return BTreeMap::new();
    }

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "failed to read favorites file");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, Vec<FavoriteEntry>>>(&raw) {
        Ok(loaded) => {
            tracing::info!(users = loaded.len(), "loaded favorites from file");
            loaded
        }
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "failed to parse favorites file");
            BTreeMap::new()
        }
    }
}

/// Resolves the stored entry for a raw conversational name.
fn resolve_entry(raw_name: &str, pokemon_id: Option<u32>) -> FavoriteEntry {
    let trimmed = raw_name.trim();

    if let Some(id) = pokemon_id {
        return FavoriteEntry {
            id,
            name: capitalize_first(trimmed),
        };
    }

    if let Some((base, id)) = split_trailing_id_suffix(trimmed) {
        return FavoriteEntry {
            id,
            name: capitalize_first(base),
        };
    }

    FavoriteEntry {
        id: fallback_id(trimmed),
        name: capitalize_first(trimmed),
    }
}

/// Splits a trailing `-<digits>` suffix, e.g. `pikachu-25` → (`pikachu`, 25).
fn split_trailing_id_suffix(name: &str) -> Option<(&str, u32)> {
    let (base, suffix) = name.rsplit_once('-')?;
    if base.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = suffix.parse::<u32>().ok()?;
    Some((base, id))
}

/// Stable fallback id: FNV-1a over the lowercased name, reduced mod 1000.
/// Used only when no explicit id and no trailing suffix is available.
fn fallback_id(name: &str) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in name.to_lowercase().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % FALLBACK_ID_RANGE) as u32
}
