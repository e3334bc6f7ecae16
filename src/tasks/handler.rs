//! Dispatches task payloads to the lifecycle manager.

use serde_json::json;

use super::{TaskFuture, TaskHandler, TaskPayload};
use crate::lifecycle::LifecycleManager;

impl TaskHandler for LifecycleManager {
    fn handle(&mut self, payload: TaskPayload) -> TaskFuture<'_> {
        Box::pin(async move {
            match payload {
                TaskPayload::Create(request) => {
                    self.create(&request).await?;
                    Ok(json!({ "message": "created" }))
                }
                TaskPayload::Action { action, name } => {
                    self.control(action, &name).await?;
                    Ok(json!({ "message": "action completed" }))
                }
                TaskPayload::Exec { name, command } => {
                    let output = self.exec(&name, &command).await?;
                    Ok(json!({ "exec": output }))
                }
                TaskPayload::Remove { name } => {
                    let report = self.remove(&name).await?;
                    Ok(json!({ "remove": report }))
                }
                TaskPayload::UpdateCredential {
                    name,
                    credential_hash,
                } => {
                    let outcome = self.rotate_credential(&name, &credential_hash).await?;
                    Ok(json!({ "update": outcome }))
                }
                TaskPayload::Resync => {
                    let report = self.resync().await?;
                    Ok(json!({ "resync": report }))
                }
            }
        })
    }
}
