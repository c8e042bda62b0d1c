//! Leaflet mappings.
//!
//! Leaflets live on the product or batch they are attached to, one folder per type and
//! language: `/<type>/<language>/<type>.xml` plus any attached images. SmPC messages
//! share the routes but only their deletion is enabled.

use super::handler::{MappingContext, MessageHandler, Mutation};
use super::validation::{
    check_file_extension, check_filename, decode_base64, is_markup, sanitize, validate_batch_code,
    validate_gtin, validate_language,
};
use crate::content::ContentHandle;
use crate::error::{MappingError, MappingResult};
use crate::fixed_url::types::{AliasAction, AliasDescriptor, AliasPlan, AliasStep};
use crate::message::{Action, Message, MessageKind};
use crate::message::types::LeafletMessage;
use crate::records::types::{Diff, EntityKey};

use async_trait::async_trait;
use serde_json::{Value, json};

pub fn leaflet_dir(leaflet_type: &str, language: &str) -> String {
    format!("/{}/{}", leaflet_type, language)
}

pub fn leaflet_xml_path(leaflet_type: &str, language: &str) -> String {
    format!("/{}/{}/{}.xml", leaflet_type, language, leaflet_type)
}

/// Alias of one leaflet language. Batch leaflets are additionally keyed by batch
/// number and expiry date, taken from the batch metadata.
pub fn leaflet_alias(
    leaflet_type: &str,
    entity: &EntityKey,
    metadata: &Value,
    language: &str,
) -> AliasDescriptor {
    let expiry = entity
        .batch_code()
        .and(metadata.get("expiryDate").and_then(Value::as_str));
    AliasDescriptor::leaflet(
        leaflet_type,
        entity.product_code(),
        language,
        entity.batch_code(),
        expiry,
    )
}

fn leaflet_body(message: &Message) -> MappingResult<(&'static str, &LeafletMessage)> {
    match (message.kind().leaflet_type(), message.leaflet()) {
        (Some(leaflet_type), Some(body)) => Ok((leaflet_type, body)),
        _ => Err(MappingError::Validation(format!(
            "{} is not a leaflet message",
            message.kind().as_str()
        ))),
    }
}

fn validate_identity(body: &LeafletMessage) -> MappingResult<()> {
    validate_gtin(&body.product_code)?;
    if let Some(batch_code) = &body.batch_code {
        validate_batch_code(batch_code)?;
    }
    validate_language(&body.language)
}

/// Adds or fully replaces one leaflet language.
pub struct LeafletHandler;

#[async_trait]
impl MessageHandler for LeafletHandler {
    fn name(&self) -> &'static str {
        "leaflet"
    }

    fn validate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<()> {
        let (_, body) = leaflet_body(message)?;
        if message.kind() == MessageKind::Smpc {
            return Err(MappingError::Restricted("smpc".to_string()));
        }
        validate_identity(body)?;

        let xml = body
            .xml_file_content
            .as_deref()
            .ok_or_else(|| MappingError::Validation("xmlFileContent is required".to_string()))?;
        let xml = decode_base64("xmlFileContent", xml)?;
        sanitize(ctx.sanitizer.as_ref(), "xmlFileContent", &xml)?;

        for file in &body.other_files_content {
            check_filename(&file.filename)?;
            check_file_extension(&file.filename)?;
            let content = decode_base64(&file.filename, &file.file_content)?;
            if is_markup(&file.filename) {
                sanitize(ctx.sanitizer.as_ref(), &file.filename, &content)?;
            }
        }
        Ok(())
    }

    async fn mutate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<Mutation> {
        let (leaflet_type, body) = leaflet_body(message)?;
        let entity = message.entity_key();
        let metadata = ctx.require_record(&entity).await?;
        let handle = ctx.content.open(&entity).await?;

        let dir = leaflet_dir(leaflet_type, &body.language);
        let existed_before = handle.stat(&dir).await?.is_some();

        if body.action == Action::Update {
            handle.delete(&dir, true).await?;
        }

        let xml = decode_base64("xmlFileContent", body.xml_file_content.as_deref().unwrap_or_default())?;
        handle
            .write_file(&leaflet_xml_path(leaflet_type, &body.language), xml)
            .await?;
        for file in &body.other_files_content {
            let content = decode_base64(&file.filename, &file.file_content)?;
            handle
                .write_file(&format!("{}/{}", dir, file.filename), content)
                .await?;
        }

        let alias = leaflet_alias(leaflet_type, &entity, &metadata, &body.language);
        // Stale aliases of this language are cleared on add as well as update.
        let plan = AliasPlan::new()
            .unregister(alias.clone())
            .register(alias)
            .register(AliasDescriptor::gtin_owner(entity.product_code()));

        ctx.commit_with_aliases(handle.clone(), plan).await?;
        refresh_languages(ctx, handle.as_ref(), &entity, leaflet_type).await;

        tracing::info!(
            "{} {} for {} written ({} attached file(s))",
            leaflet_type,
            body.language,
            entity,
            body.other_files_content.len()
        );

        Ok(Mutation {
            entity,
            metadata,
            existed_before,
            diff: Diff {
                old_value: Value::Null,
                new_value: json!({
                    "type": leaflet_type,
                    "language": body.language,
                    "action": body.action.as_str(),
                }),
            },
            anchor_id: handle.anchor_id().to_string(),
        })
    }
}

/// Removes one leaflet language. The alias is unregistered first and the content is
/// only deleted once a replica acknowledged that.
pub struct LeafletDeleteHandler;

#[async_trait]
impl MessageHandler for LeafletDeleteHandler {
    fn name(&self) -> &'static str {
        "leaflet_delete"
    }

    fn validate(&self, _ctx: &MappingContext, message: &Message) -> MappingResult<()> {
        let (_, body) = leaflet_body(message)?;
        validate_identity(body)
    }

    async fn mutate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<Mutation> {
        let (leaflet_type, body) = leaflet_body(message)?;
        let entity = message.entity_key();
        let metadata = ctx.require_record(&entity).await?;
        let handle = ctx.content.open(&entity).await?;

        let dir = leaflet_dir(leaflet_type, &body.language);
        let existed_before = handle.stat(&dir).await?.is_some();

        let step = AliasStep {
            action: AliasAction::Unregister,
            descriptor: leaflet_alias(leaflet_type, &entity, &metadata, &body.language),
        };
        if let Err(e) = ctx.aliases.apply(handle.anchor_id(), &step).await {
            tracing::error!("Leaflet delete for {} aborted, alias cleanup failed: {}", entity, e);
            return Err(MappingError::Consistency(e.to_string()));
        }

        handle.delete(&dir, true).await?;
        ctx.commit_with_aliases(handle.clone(), AliasPlan::new()).await?;
        refresh_languages(ctx, handle.as_ref(), &entity, leaflet_type).await;

        tracing::info!("{} {} for {} deleted", leaflet_type, body.language, entity);

        Ok(Mutation {
            entity,
            metadata,
            existed_before,
            diff: Diff {
                old_value: json!({ "type": leaflet_type, "language": body.language }),
                new_value: json!({ "action": "deleted" }),
            },
            anchor_id: handle.anchor_id().to_string(),
        })
    }
}

async fn refresh_languages(
    ctx: &MappingContext,
    handle: &dyn ContentHandle,
    entity: &EntityKey,
    leaflet_type: &str,
) {
    match handle.list_folders(&format!("/{}", leaflet_type)).await {
        Ok(languages) => ctx.languages.record(entity, leaflet_type, languages),
        Err(e) => tracing::debug!("Could not list {} languages of {}: {}", leaflet_type, entity, e),
    }
}
