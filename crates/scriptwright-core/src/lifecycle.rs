//! Acting on a suggestion: approval writes the file, decline only records it.

use crate::project::write_script;
use crate::session::{NoticeKind, Session};
use crate::state::Decision;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActOutcome {
    /// Unknown message, no suggestion, already resolved, no folder, or busy
    Ignored,
    Declined,
    Saved,
    /// The write failed; the suggestion is still marked approved
    SaveFailed,
}

pub fn saving_message(target_name: &str) -> String {
    format!("Saving {}...", target_name)
}

impl Session {
    /// Resolve the pending suggestion carried by `message_id`
    pub async fn act(&mut self, message_id: &str, decision: Decision) -> ActOutcome {
        if self.is_busy() {
            debug!(message_id, "suggestion action ignored while busy");
            return ActOutcome::Ignored;
        }
        let Some(suggestion) = self
            .messages
            .get(message_id)
            .and_then(|m| m.suggestion.as_ref())
            .filter(|s| s.is_pending())
        else {
            debug!(message_id, "no pending suggestion for message");
            return ActOutcome::Ignored;
        };
        if self.folder.is_none() {
            debug!(message_id, "no folder held; suggestion action ignored");
            return ActOutcome::Ignored;
        }
        let target_name = suggestion.target_name.clone();
        let code = suggestion.code.clone();

        let outcome = match decision {
            Decision::Approved => self.save(&target_name, &code).await,
            Decision::Declined => {
                info!(target = %target_name, "suggestion declined");
                ActOutcome::Declined
            }
        };

        if let Some(suggestion) = self
            .messages
            .get_mut(message_id)
            .and_then(|m| m.suggestion.as_mut())
        {
            suggestion.resolve(decision);
        }
        self.publish();
        outcome
    }

    async fn save(&mut self, target_name: &str, code: &str) -> ActOutcome {
        self.set_busy(saving_message(target_name));

        let written = match self.folder.as_deref() {
            Some(folder) => write_script(folder, target_name, code).await,
            None => Err(anyhow::anyhow!("No project folder selected")),
        };

        let outcome = match written {
            Ok(()) => {
                info!(target = %target_name, bytes = code.len(), "suggestion written");
                self.raise_notice(NoticeKind::Success, format!("{} saved successfully!", target_name));
                if let Err(e) = self.rescan().await {
                    warn!(error = %e, "rescan after write failed");
                }
                ActOutcome::Saved
            }
            Err(e) => {
                warn!(target = %target_name, error = %e, "writing suggestion failed");
                self.raise_notice(NoticeKind::Failure, format!("Error saving {}.", target_name));
                ActOutcome::SaveFailed
            }
        };

        self.clear_busy();
        outcome
    }
}
