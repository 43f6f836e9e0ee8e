use anyhow::{Context, Result};
use serde_json::json;
use uuid::Uuid;

use crate::domain::models::CallerIdentity;
use crate::domain::ports::{IdentityRepository, MemoryRepository};
use crate::services::MemoryService;

/// Handle memories forget command
pub async fn handle_forget<M: MemoryRepository, I: IdentityRepository>(
    service: &MemoryService<M, I>,
    user_id: String,
    memory_id: Uuid,
    app: String,
    json: bool,
) -> Result<()> {
    let caller = CallerIdentity::new(user_id, app, "cli");
    service
        .forget(&caller, memory_id)
        .await
        .with_context(|| format!("Failed to forget memory {}", memory_id))?;

    if json {
        println!("{}", json!({ "memory_id": memory_id, "state": "deleted" }));
    } else {
        println!("Forgot memory {}", memory_id);
    }
    Ok(())
}

/// Handle memories forget-all command
pub async fn handle_forget_all<M: MemoryRepository, I: IdentityRepository>(
    service: &MemoryService<M, I>,
    user_id: String,
    app: String,
    json: bool,
) -> Result<()> {
    let caller = CallerIdentity::new(user_id.clone(), app.clone(), "cli");
    let forgotten = service
        .forget_all(&caller)
        .await
        .with_context(|| format!("Failed to forget memories of {}", user_id))?;

    if json {
        println!("{}", json!({ "user_id": user_id, "app": app, "forgotten": forgotten }));
    } else {
        println!("Forgot {} memories of {} in app {}", forgotten, user_id, app);
    }
    Ok(())
}
