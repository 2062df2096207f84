//! PokéGPT backend entrypoint: configuration, wiring, and the serve loop.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use poke_ai::{OpenAiClient, OpenAiConfig};
use poke_chat::{ChatRegistry, ChatRegistryConfig, ToolRegistrarFn};
use poke_dex::{DexConfig, PokeDexClient};
use poke_favorites::FavoritesStore;
use poke_gateway::AppState;
use poke_tools::register_pokedex_tools;

mod bootstrap;

#[derive(Debug, Parser)]
#[command(name = "poke-server", about = "PokéGPT chat backend", version)]
struct Cli {
    #[arg(
        long,
        env = "POKE_MODEL",
        default_value = "gpt-4o-mini",
        help = "Chat model name passed to the OpenAI-compatible endpoint"
    )]
    model: String,

    #[arg(
        long,
        env = "POKE_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL for the OpenAI-compatible chat-completions API"
    )]
    api_base: String,

    #[arg(
        long,
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        default_value = "",
        help = "API key for the chat-completions endpoint"
    )]
    api_key: String,

    #[arg(
        long,
        env = "POKE_POKEAPI_BASE",
        default_value = "https://pokeapi.co/api/v2",
        help = "Base URL for the public Pokémon data API"
    )]
    pokeapi_base: String,

    #[arg(
        long,
        env = "POKE_BIND",
        default_value = "0.0.0.0:5000",
        help = "Socket address the HTTP server binds to"
    )]
    bind: String,

    #[arg(
        long,
        env = "POKE_FAVORITES_PATH",
        default_value = "user_favorites.json",
        help = "Path of the JSON file holding persisted user favorites"
    )]
    favorites_path: PathBuf,

    #[arg(
        long,
        env = "POKE_MAX_TURNS",
        default_value_t = 8,
        help = "Maximum model/tool round trips per conversational turn"
    )]
    max_turns: usize,

    #[arg(
        long,
        env = "POKE_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000,
        help = "Per-request timeout for the chat-completions endpoint in milliseconds"
    )]
    request_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    let cli = Cli::parse();

    // The one fatal startup path: without a working model client the backend
    // cannot answer anything.
    let client = OpenAiClient::new(OpenAiConfig {
        api_base: cli.api_base.clone(),
        api_key: cli.api_key.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        ..OpenAiConfig::default()
    })
    .context("failed to construct the chat model client")?;

    let dex = Arc::new(
        PokeDexClient::new(DexConfig {
            api_base: cli.pokeapi_base.clone(),
            ..DexConfig::default()
        })
        .context("failed to construct the PokeAPI client")?,
    );

    let favorites = Arc::new(FavoritesStore::open(&cli.favorites_path));

    let registrar = {
        let dex = dex.clone();
        let favorites = favorites.clone();
        Arc::new(ToolRegistrarFn::new(move |agent| {
            register_pokedex_tools(agent, dex.clone(), favorites.clone());
        }))
    };

    let registry = Arc::new(ChatRegistry::new(
        Arc::new(client),
        registrar,
        ChatRegistryConfig {
            model: cli.model.clone(),
            max_turns: cli.max_turns,
            ..ChatRegistryConfig::default()
        },
    ));

    tracing::info!(model = %cli.model, bind = %cli.bind, "starting PokéGPT backend");
    poke_gateway::serve(&cli.bind, AppState { registry, favorites }).await
}
