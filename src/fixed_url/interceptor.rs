//! Commit Interceptor
//!
//! Composes a content handle's commit with the alias plan of the mutation that
//! produced it. The wrapped commit reports success as soon as the content is durable
//! and runs the plan in a detached tokio task; alias failures there are logged and
//! never reach the caller.

use super::service::AliasSync;
use super::types::AliasPlan;
use crate::content::ContentHandle;
use crate::error::MappingResult;

use std::sync::Arc;

pub struct CommitInterceptor {
    aliases: Arc<dyn AliasSync>,
}

impl CommitInterceptor {
    pub fn new(aliases: Arc<dyn AliasSync>) -> Self {
        Self { aliases }
    }

    /// Builds the commit for one mutation of `handle`.
    pub fn wrap(&self, handle: Arc<dyn ContentHandle>, plan: AliasPlan) -> InterceptedCommit {
        InterceptedCommit {
            handle,
            plan,
            aliases: self.aliases.clone(),
        }
    }
}

pub struct InterceptedCommit {
    handle: Arc<dyn ContentHandle>,
    plan: AliasPlan,
    aliases: Arc<dyn AliasSync>,
}

impl InterceptedCommit {
    /// Commits the handle, then schedules the alias plan.
    ///
    /// A commit error is returned unchanged and nothing is scheduled.
    pub async fn commit(self) -> MappingResult<()> {
        self.handle.commit().await?;

        if self.plan.is_empty() {
            return Ok(());
        }

        let anchor_id = self.handle.anchor_id().to_string();
        let aliases = self.aliases;
        let plan = self.plan;
        tokio::spawn(async move {
            run_plan(aliases.as_ref(), &anchor_id, &plan).await;
        });

        Ok(())
    }
}

/// Applies every step of `plan` in order. Returns the number of steps that succeeded.
pub async fn run_plan(aliases: &dyn AliasSync, anchor_id: &str, plan: &AliasPlan) -> usize {
    let mut succeeded = 0;
    for step in &plan.steps {
        match aliases.apply(anchor_id, step).await {
            Ok(outcome) => {
                succeeded += 1;
                tracing::debug!(
                    "{:?} {} done via {} ({} attempt(s))",
                    step.action,
                    step.descriptor.kind.as_str(),
                    outcome.replica,
                    outcome.attempts
                );
            }
            Err(e) => {
                tracing::warn!(
                    "{:?} {} for {} failed: {}",
                    step.action,
                    step.descriptor.kind.as_str(),
                    anchor_id,
                    e
                );
            }
        }
    }
    succeeded
}
