//! The tool surface exposed to the Pokémon assistant: four read-only PokeAPI
//! lookups and three favorites operations. Each tool shapes conversational
//! arguments, delegates to the dex client or the favorites store, and reports
//! failures as descriptive strings so the conversation always continues.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use poke_agent::{Agent, AgentTool, ToolExecutionResult};
use poke_ai::ToolDefinition;
use poke_dex::PokeDexClient;
use poke_favorites::FavoritesStore;


/// Registers the full Pokémon tool set on `agent`.
pub fn register_pokedex_tools(
    agent: &mut Agent,
    dex: Arc<PokeDexClient>,
    favorites: Arc<FavoritesStore>,
) {
    agent.register_tool(PokemonListTool { dex: dex.clone() });
    agent.register_tool(PokemonDetailsTool { dex: dex.clone() });
    agent.register_tool(AbilityListTool { dex: dex.clone() });
    agent.register_tool(AbilityDetailsTool { dex: dex.clone() });
    agent.register_tool(AddFavoriteTool {
        dex,
        favorites: favorites.clone(),
    });
    agent.register_tool(RemoveFavoriteTool {
        favorites: favorites.clone(),
    });
    agent.register_tool(UserFavoritesTool { favorites });
}

fn required_str_arg(arguments: &Value, name: &str) -> Result<String, ToolExecutionResult> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            ToolExecutionResult::error(json!({
                "error": format!("missing required argument '{name}'"),
            }))
        })
}

fn required_id_arg(arguments: &Value) -> Result<u32, ToolExecutionResult> {
    arguments
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| {
            ToolExecutionResult::error(json!({
                "error": "missing required integer argument 'id'",
            }))
        })
}

struct PokemonListTool {
    dex: Arc<PokeDexClient>,
}

#[async_trait]
impl AgentTool for PokemonListTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_pokemon_list".to_string(),
            description: "Returns the list of Pokémon as {name, url} pairs. \
                          The trailing path segment of each url is the Pokémon id."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
            }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        match self.dex.list_pokemon().await {
            Ok(results) => ToolExecutionResult::ok(json!(results)),
            Err(error) => ToolExecutionResult::error(json!({
                "error": format!("failed to fetch the Pokémon list: {error}"),
            })),
        }
    }
}

struct PokemonDetailsTool {
    dex: Arc<PokeDexClient>,
}

#[async_trait]
impl AgentTool for PokemonDetailsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_pokemon_details".to_string(),
            description: "Returns the detail object for one Pokémon: abilities, \
                          base experience, height, weight, moves, types, and more."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "integer",
                        "description": "The id of the Pokémon."
                    }
                },
                "required": ["id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let id = match required_id_arg(&arguments) {
            Ok(id) => id,
            Err(result) => return result,
        };
        match self.dex.pokemon_details(id).await {
            Ok(details) => ToolExecutionResult::ok(details),
            Err(error) => ToolExecutionResult::error(json!({
                "error": format!("failed to fetch details for Pokémon {id}: {error}"),
            })),
        }
    }
}

struct AbilityListTool {
    dex: Arc<PokeDexClient>,
}

#[async_trait]
impl AgentTool for AbilityListTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_ability_list".to_string(),
            description: "Returns the list of abilities as {name, url} pairs.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
            }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        match self.dex.list_abilities().await {
            Ok(results) => ToolExecutionResult::ok(json!(results)),
            Err(error) => ToolExecutionResult::error(json!({
                "error": format!("failed to fetch the ability list: {error}"),
            })),
        }
    }
}

struct AbilityDetailsTool {
    dex: Arc<PokeDexClient>,
}

#[async_trait]
impl AgentTool for AbilityDetailsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_ability_details".to_string(),
            description: "Returns the detail object for one ability: effect \
                          descriptions, flavor text, and the Pokémon that can have it."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "integer",
                        "description": "The id of the ability."
                    }
                },
                "required": ["id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let id = match required_id_arg(&arguments) {
            Ok(id) => id,
            Err(result) => return result,
        };
        match self.dex.ability_details(id).await {
            Ok(details) => ToolExecutionResult::ok(details),
            Err(error) => ToolExecutionResult::error(json!({
                "error": format!("failed to fetch details for ability {id}: {error}"),
            })),
        }
    }
}

struct AddFavoriteTool {
    dex: Arc<PokeDexClient>,
    favorites: Arc<FavoritesStore>,
}

#[async_trait]
impl AgentTool for AddFavoriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "add_to_favorites".to_string(),
            description: "Adds a Pokémon to the user's favorites. Looks the name up \
                          in the Pokémon database to resolve the official id, then \
                          saves and persists the favorite. Always pass the user_id \
                          from the conversation context."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pokemon": {
                        "type": "string",
                        "description": "The name of the Pokémon to add, e.g. \"Pikachu\"."
                    },
                    "user_id": {
                        "type": "string",
                        "description": "The user to save the favorite for."
                    }
                },
                "required": ["pokemon", "user_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let pokemon = match required_str_arg(&arguments, "pokemon") {
            Ok(pokemon) => pokemon,
            Err(result) => return result,
        };
        let user_id = match required_str_arg(&arguments, "user_id") {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };

        let normalized = pokemon.trim().to_lowercase();
        let listing = match self.dex.list_pokemon().await {
            Ok(listing) => listing,
            Err(error) => {
                return ToolExecutionResult::error(Value::String(format!(
                    "I encountered an error while adding **{pokemon}** to your favorites. \
                     Please try again. Error: {error}"
                )));
            }
        };

        let resolved_id = listing
            .iter()
            .find(|entry| entry.name.to_lowercase() == normalized)
            .and_then(|entry| entry.trailing_id());

        let Some(resolved_id) = resolved_id else {
            return ToolExecutionResult::ok(Value::String(format!(
                "I couldn't find **{pokemon}** in the Pokémon database. \
                 Please check the spelling and try again."
            )));
        };

        let outcome = self
            .favorites
            .add_favorite(&user_id, &pokemon, Some(resolved_id));
        ToolExecutionResult::ok(Value::String(format!(
            "Successfully added **{pokemon}** to your favorites! (User ID: {})",
            outcome.user_id
        )))
    }
}

struct RemoveFavoriteTool {
    favorites: Arc<FavoritesStore>,
}

#[async_trait]
impl AgentTool for RemoveFavoriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "remove_from_favorites".to_string(),
            description: "Removes a Pokémon from the user's favorites by name \
                          (case-insensitive) and persists the change. Always pass \
                          the user_id from the conversation context."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pokemon": {
                        "type": "string",
                        "description": "The name of the Pokémon to remove."
                    },
                    "user_id": {
                        "type": "string",
                        "description": "The user to remove the favorite from."
                    }
                },
                "required": ["pokemon", "user_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let pokemon = match required_str_arg(&arguments, "pokemon") {
            Ok(pokemon) => pokemon,
            Err(result) => return result,
        };
        let user_id = match required_str_arg(&arguments, "user_id") {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };

        let outcome = self.favorites.remove_favorite_by_name(&user_id, &pokemon);
        if outcome.success {
            ToolExecutionResult::ok(Value::String(format!(
                "Successfully removed **{pokemon}** from your favorites! \
                 You now have {} Pokémon in your favorites.",
                outcome.favorites_count
            )))
        } else {
            ToolExecutionResult::ok(Value::String(format!(
                "{}. Please check the spelling and try again.",
                outcome.message
            )))
        }
    }
}

struct UserFavoritesTool {
    favorites: Arc<FavoritesStore>,
}

#[async_trait]
impl AgentTool for UserFavoritesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_user_favorites".to_string(),
            description: "Returns the user's saved favorites with a count. \
                          Always pass the user_id from the conversation context."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "The user to fetch favorites for."
                    }
                },
                "required": ["user_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let user_id = match required_str_arg(&arguments, "user_id") {
            Ok(user_id) => user_id,
            Err(result) => return result,
        };

        let snapshot = self.favorites.get_user_favorites(&user_id);
        match serde_json::to_value(&snapshot) {
            Ok(payload) => ToolExecutionResult::ok(payload),
            Err(error) => ToolExecutionResult::error(json!({
                "error": format!("failed to serialize favorites: {error}"),
            })),
        }
    }
}
