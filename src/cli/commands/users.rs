use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::display::{list_table, render_list};
use crate::domain::ports::{IdentityRepository, MemoryRepository};
use crate::services::{MemoryService, UserSummary};

/// Handle users create command
pub async fn handle_create<I: IdentityRepository>(
    identities: &I,
    user_id: String,
    name: Option<String>,
    email: Option<String>,
    json: bool,
) -> Result<()> {
    let (user, api_key) = identities
        .create_user(&user_id, name.as_deref(), email.as_deref())
        .await
        .with_context(|| format!("Failed to create user {}", user_id))?;

    tracing::info!(user_id = %user.user_id, "user created");

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "user": user, "api_key": api_key }))?
        );
    } else {
        println!("Created user {}", user.display_name());
        println!("API key: {}", api_key);
        println!("Save this key now - it will not be shown again.");
    }
    Ok(())
}

/// Handle users list command
pub async fn handle_list<M: MemoryRepository, I: IdentityRepository>(
    service: &MemoryService<M, I>,
    json: bool,
) -> Result<()> {
    let users = service.user_summaries().await.context("Failed to list users")?;

    if json {
        let rows: Vec<_> = users
            .iter()
            .map(|s| json!({ "user": s.user, "has_active_key": s.has_active_key, "memories": s.memories }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{}", format_users(&users));
    }
    Ok(())
}

/// Handle users revoke command
pub async fn handle_revoke<I: IdentityRepository>(identities: &I, user_id: String, json: bool) -> Result<()> {
    let revoked = identities
        .revoke_keys(&user_id)
        .await
        .with_context(|| format!("Failed to revoke keys for {}", user_id))?;

    tracing::info!(user_id = %user_id, revoked, "api keys revoked");

    if json {
        println!("{}", json!({ "user_id": user_id, "revoked": revoked }));
    } else {
        println!("Revoked {} key{} for {}", revoked, if revoked == 1 { "" } else { "s" }, user_id);
    }
    Ok(())
}

fn format_users(users: &[UserSummary]) -> String {
    let mut table = list_table(&["user", "name", "email", "key", "memories", "created", "last active"]);
    for UserSummary { user, has_active_key, memories } in users {
        table.add_row(vec![
            user.user_id.clone(),
            user.name.clone().unwrap_or_default(),
            user.email.clone().unwrap_or_default(),
            if *has_active_key { "active" } else { "revoked" }.to_string(),
            memories.to_string(),
            user.created_at.format("%Y-%m-%d %H:%M").to_string(),
            user.last_active
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string()),
        ]);
    }
    render_list("user", table, users.len())
}
