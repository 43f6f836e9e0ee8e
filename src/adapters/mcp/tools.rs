//! The MCP tool catalog and the handlers behind it.

use serde::Deserialize;
use serde_json::{json, Value};

use super::protocol::RpcError;
use crate::domain::models::CallerIdentity;
use crate::domain::ports::{IdentityRepository, MemoryRepository};
use crate::services::{display_timestamp, MemoryService};

pub const ADD_MEMORY: &str = "add_memory";
pub const SEARCH_MEMORIES: &str = "search_memories";
pub const LIST_MEMORIES: &str = "list_memories";

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

/// The static catalog returned by `tools/list`.
pub fn catalog() -> Value {
    json!({
        "tools": [
            {
                "name": ADD_MEMORY,
                "description": "Store a new memory for the current user. Use this to remember facts, preferences or context worth recalling in later conversations.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "The content to remember" }
                    },
                    "required": ["text"]
                }
            },
            {
                "name": SEARCH_MEMORIES,
                "description": "Search the current user's memories for ones relevant to a query. Uses similarity search when available and falls back to text matching.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "What to look for" },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_LIMIT,
                            "description": format!("Maximum number of results (default: {})", DEFAULT_SEARCH_LIMIT)
                        }
                    },
                    "required": ["query"]
                }
            },
            {
                "name": LIST_MEMORIES,
                "description": "List the current user's most recent memories, newest first.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_LIMIT,
                            "description": format!("Maximum number of memories (default: {})", DEFAULT_LIST_LIMIT)
                        }
                    }
                }
            }
        ]
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddMemoryArgs {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchMemoriesArgs {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListMemoriesArgs {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

/// A validated `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    AddMemory(AddMemoryArgs),
    SearchMemories(SearchMemoriesArgs),
    ListMemories(ListMemoriesArgs),
}

impl ToolCall {
    /// Resolve a tool name and decode its arguments.
    ///
    /// Unknown tools and malformed arguments are both `-32602`.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, RpcError> {
        let call = match name {
            ADD_MEMORY => Self::AddMemory(decode(name, arguments)?),
            SEARCH_MEMORIES => Self::SearchMemories(decode(name, arguments)?),
            LIST_MEMORIES => Self::ListMemories(decode(name, arguments)?),
            _ => return Err(RpcError::unknown_tool(name)),
        };
        call.validate()?;
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AddMemory(_) => ADD_MEMORY,
            Self::SearchMemories(_) => SEARCH_MEMORIES,
            Self::ListMemories(_) => LIST_MEMORIES,
        }
    }

    fn validate(&self) -> Result<(), RpcError> {
        match self {
            Self::AddMemory(args) if args.text.trim().is_empty() => {
                Err(RpcError::invalid_params("text must not be empty"))
            }
            Self::SearchMemories(args) if args.query.trim().is_empty() => {
                Err(RpcError::invalid_params("query must not be empty"))
            }
            Self::SearchMemories(SearchMemoriesArgs { limit, .. })
            | Self::ListMemories(ListMemoriesArgs { limit }) => check_limit(*limit),
            Self::AddMemory(_) => Ok(()),
        }
    }

    /// Run the tool. `Err` carries the handler fault as display text.
    pub async fn execute<M, I>(
        &self,
        service: &MemoryService<M, I>,
        caller: &CallerIdentity,
    ) -> Result<String, String>
    where
        M: MemoryRepository,
        I: IdentityRepository,
    {
        match self {
            Self::AddMemory(args) => {
                let added = service
                    .add_memory(caller, &args.text)
                    .await
                    .map_err(|e| e.to_string())?;

                let mut text = format!("Memory added successfully (id: {})", added.memory.id);
                if let Some(key) = added.new_api_key {
                    text.push_str(&format!(
                        "\n\nNew user created! Your API key is: {}\nPlease save this key - it will not be shown again.",
                        key
                    ));
                }
                Ok(text)
            }
            Self::SearchMemories(args) => {
                let matches = service
                    .search_memories(caller, &args.query, args.limit)
                    .await
                    .map_err(|e| e.to_string())?;

                if matches.is_empty() {
                    return Ok(format!("No memories found matching '{}'.", args.query));
                }

                let mut text = format!("Found {} memories:", matches.len());
                for (i, m) in matches.iter().enumerate() {
                    match m.score {
                        Some(score) => text.push_str(&format!("\n{}. {} (score {:.2})", i + 1, m.content, score)),
                        None => text.push_str(&format!("\n{}. {}", i + 1, m.content)),
                    }
                }
                Ok(text)
            }
            Self::ListMemories(args) => {
                let memories = service
                    .list_memories(caller, args.limit)
                    .await
                    .map_err(|e| e.to_string())?;

                if memories.is_empty() {
                    return Ok("You have no stored memories yet.".to_string());
                }

                let mut text = format!("Your {} most recent memories:", memories.len());
                for (i, m) in memories.iter().enumerate() {
                    text.push_str(&format!(
                        "\n{}. [{}] {}",
                        i + 1,
                        display_timestamp(&m.created_at),
                        m.content
                    ));
                }
                Ok(text)
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, RpcError> {
    serde_json::from_value(arguments)
        .map_err(|e| RpcError::invalid_params(format!("{}: {}", tool, e)))
}

fn check_limit(limit: usize) -> Result<(), RpcError> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(RpcError::invalid_params(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )))
    }
}
