//! Mapping Registry
//!
//! An ordered list of (route, handler) rules. Rules are registered once at startup;
//! the registry is then shared read-only behind an `Arc`, so concurrent dispatches
//! never contend on it. The first rule whose route accepts a message handles it.

use super::handler::{MappingContext, MessageHandler, Mutation};
use super::leaflet::{LeafletDeleteHandler, LeafletHandler};
use super::photo::ProductPhotoHandler;
use super::product::{BatchHandler, ProductHandler};
use crate::error::{MappingError, MappingResult};
use crate::message::{Action, Message, MessageKind};
use crate::records::audit::AuditContext;
use crate::records::types::Diff;

use serde::Serialize;
use std::sync::Arc;

const ALL_ACTIONS: &[Action] = &[Action::Add, Action::Update, Action::Delete];

/// Which messages a rule accepts: a set of kinds and a set of actions.
#[derive(Debug, Clone)]
pub struct Route {
    kinds: Vec<MessageKind>,
    actions: Vec<Action>,
}

impl Route {
    /// Every action of one kind.
    pub fn kind(kind: MessageKind) -> Self {
        Self::kinds(&[kind])
    }

    /// Every action of several kinds.
    pub fn kinds(kinds: &[MessageKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            actions: ALL_ACTIONS.to_vec(),
        }
    }

    /// Restricts the route to the given actions.
    pub fn actions(mut self, actions: &[Action]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.kinds.contains(&message.kind()) && self.actions.contains(&message.action())
    }
}

struct MappingRule {
    route: Route,
    handler: Arc<dyn MessageHandler>,
}

/// Outcome of a successful mapping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingReport {
    pub handler: String,
    pub entity: String,
    pub version: u64,
    pub anchor_id: String,
    pub diff: Diff,
}

#[derive(Default)]
pub struct MappingRegistry {
    rules: Vec<MappingRule>,
}

impl MappingRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock product, batch, leaflet and photo mappings.
    pub fn with_default_mappings() -> Self {
        let mut registry = Self::new();
        registry.register(
            Route::kind(MessageKind::Product).actions(&[Action::Add, Action::Update]),
            Arc::new(ProductHandler),
        );
        registry.register(
            Route::kind(MessageKind::Batch).actions(&[Action::Add, Action::Update]),
            Arc::new(BatchHandler),
        );
        registry.register(
            Route::kinds(&[MessageKind::Leaflet, MessageKind::Smpc])
                .actions(&[Action::Add, Action::Update]),
            Arc::new(LeafletHandler),
        );
        registry.register(
            Route::kinds(&[MessageKind::Leaflet, MessageKind::Smpc]).actions(&[Action::Delete]),
            Arc::new(LeafletDeleteHandler),
        );
        registry.register(Route::kind(MessageKind::ProductPhoto), Arc::new(ProductPhotoHandler));
        registry
    }

    /// Appends a rule. Earlier rules win when several match.
    pub fn register(&mut self, route: Route, handler: Arc<dyn MessageHandler>) {
        tracing::info!("Registered mapping: {} for {:?}", handler.name(), route);
        self.rules.push(MappingRule { route, handler });
    }

    /// The handler that would process `message`, if any.
    pub fn find(&self, message: &Message) -> Option<&Arc<dyn MessageHandler>> {
        self.rules
            .iter()
            .find(|rule| rule.route.matches(message))
            .map(|rule| &rule.handler)
    }

    /// Validates and applies `message` with the first matching handler, then bumps the
    /// entity version and records the audit entry.
    ///
    /// # Returns
    /// * `Err(NoMatchingHandler)` if no rule accepts the message; no handler runs.
    /// * Any validation error, before a store is touched.
    /// * Any mutation or versioning error, in which case no audit success is recorded.
    pub async fn dispatch(
        &self,
        ctx: &MappingContext,
        message: &Message,
    ) -> MappingResult<MappingReport> {
        let handler = self.find(message).ok_or_else(|| {
            let error = MappingError::NoMatchingHandler {
                message_type: message.kind().as_str().to_string(),
                action: message.action().as_str().to_string(),
            };
            tracing::error!("{}", error);
            error
        })?;

        tracing::debug!(
            "Dispatching {} {} for {} to '{}'",
            message.kind().as_str(),
            message.action().as_str(),
            message.product_code(),
            handler.name()
        );

        handler.validate(ctx, message)?;
        let Mutation {
            entity,
            metadata,
            existed_before,
            diff,
            anchor_id,
        } = handler.mutate(ctx, message).await?;

        let version = ctx.ledger.increase_version(&entity).await?;

        ctx.audit
            .log_action(
                message,
                AuditContext {
                    domain: Some(&ctx.options.domain),
                    anchor_id: Some(&anchor_id),
                    metadata: &metadata,
                    existed_before,
                },
                &diff,
            )
            .await;

        Ok(MappingReport {
            handler: handler.name().to_string(),
            entity: entity.to_string(),
            version,
            anchor_id,
            diff,
        })
    }

    /// Returns the names of all registered handlers, in rule order.
    pub fn list_handlers(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.handler.name()).collect()
    }

    /// Returns the total number of registered rules.
    pub fn handler_count(&self) -> usize {
        self.rules.len()
    }
}
