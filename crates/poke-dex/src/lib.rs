//! Read-only PokeAPI client: paginated name/url listings and per-id detail
//! lookups. Pure passthrough, no caching, no retry.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Page size for the Pokémon listing (the original 151).
pub const POKEMON_PAGE_LIMIT: u32 = 151;
/// Page size for the ability listing.
pub const ABILITY_PAGE_LIMIT: u32 = 400;

#[derive(Debug, Error)]
/// Enumerates supported `DexError` values.
pub enum DexError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("pokeapi returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One `{name, url}` pair from a paginated listing.
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

impl NamedResource {
    /// Parses the numeric id from the trailing path segment of the resource
    /// URL, e.g. `https://pokeapi.co/api/v2/pokemon/25/` → 25.
    pub fn trailing_id(&self) -> Option<u32> {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse::<u32>().ok())
    }
}

#[derive(Debug, Deserialize)]
struct PagedResponse {
    results: Vec<NamedResource>,
}

#[derive(Debug, Clone)]
/// Connection settings for the PokeAPI endpoint.
pub struct DexConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            api_base: "https://pokeapi.co/api/v2".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
/// HTTP client over the public Pokémon data API.
pub struct PokeDexClient {
    client: reqwest::Client,
    api_base: String,
}

impl PokeDexClient {
    pub fn new(config: DexConfig) -> Result<Self, DexError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Lists the first [`POKEMON_PAGE_LIMIT`] Pokémon as `{name, url}` pairs.
    pub async fn list_pokemon(&self) -> Result<Vec<NamedResource>, DexError> {
        let url = format!("{}/pokemon?limit={}", self.api_base, POKEMON_PAGE_LIMIT);
        let page: PagedResponse = self.fetch_parsed(&url).await?;
        Ok(page.results)
    }

    /// Fetches one Pokémon's detail object with the two oversized fields
    /// removed: the historical `game_indices` list and the per-move
    /// `version_group_details` blocks.
    pub async fn pokemon_details(&self, id: u32) -> Result<Value, DexError> {
        let url = format!("{}/pokemon/{id}", self.api_base);
        let mut details = self.fetch_value(&url).await?;

        if let Some(object) = details.as_object_mut() {
            object.remove("game_indices");
            if let Some(moves) = object.get_mut("moves").and_then(Value::as_array_mut) {
                for entry in moves {
                    if let Some(entry) = entry.as_object_mut() {
                        entry.remove("version_group_details");
                    }
                }
            }
        }

        Ok(details)
    }

    /// Lists the first [`ABILITY_PAGE_LIMIT`] abilities as `{name, url}` pairs.
    pub async fn list_abilities(&self) -> Result<Vec<NamedResource>, DexError> {
        let url = format!("{}/ability?limit={}", self.api_base, ABILITY_PAGE_LIMIT);
        let page: PagedResponse = self.fetch_parsed(&url).await?;
        Ok(page.results)
    }

    /// Fetches one ability's detail object unmodified.
    pub async fn ability_details(&self, id: u32) -> Result<Value, DexError> {
        let url = format!("{}/ability/{id}", self.api_base);
        self.fetch_value(&url).await
    }

    async fn fetch_parsed<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, DexError> {
        let raw = self.fetch_text(url).await?;
        serde_json::from_str(&raw)
            .map_err(|error| DexError::InvalidResponse(format!("failed to parse {url}: {error}")))
    }

    async fn fetch_value(&self, url: &str) -> Result<Value, DexError> {
        self.fetch_parsed(url).await
    }

    async fn fetch_text(&self, url: &str) -> Result<String, DexError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DexError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}
