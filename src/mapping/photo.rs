//! Product photo mapping: replaces `/image.png` and re-registers the product's aliases.

use super::handler::{MappingContext, MessageHandler, Mutation};
use super::leaflet::leaflet_alias;
use super::validation::{decode_base64, detect_image_format, validate_gtin};
use crate::content::EntryType;
use crate::error::{MappingError, MappingResult};
use crate::fixed_url::types::{AliasDescriptor, AliasPlan};
use crate::message::{Message, MessageBody};
use crate::message::types::ProductPhotoMessage;
use crate::records::types::{Diff, EntityKey};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

pub const PRODUCT_IMAGE_PATH: &str = "/image.png";

fn photo_body(message: &Message) -> MappingResult<&ProductPhotoMessage> {
    match &message.body {
        MessageBody::ProductPhoto(body) => Ok(body),
        _ => Err(MappingError::Validation("not a product photo message".to_string())),
    }
}

/// Replaces the photo of an existing product and re-activates its aliases.
pub struct ProductPhotoHandler;

#[async_trait]
impl MessageHandler for ProductPhotoHandler {
    fn name(&self) -> &'static str {
        "product_photo"
    }

    fn validate(&self, _ctx: &MappingContext, message: &Message) -> MappingResult<()> {
        let body = photo_body(message)?;
        validate_gtin(&body.product_code)?;
        let bytes = decode_base64("imageData", &body.image_data)?;
        if detect_image_format(&bytes).is_none() {
            return Err(MappingError::UnsupportedFormat(
                "imageData is not a supported image".to_string(),
            ));
        }
        Ok(())
    }

    async fn mutate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<Mutation> {
        let body = photo_body(message)?;
        let entity = EntityKey::product(&body.product_code);
        let metadata = ctx.require_record(&entity).await?;
        let handle = ctx.content.open(&entity).await?;

        let existed_before = handle.stat(PRODUCT_IMAGE_PATH).await? == Some(EntryType::File);
        let old_value = if existed_before {
            Value::String(STANDARD.encode(handle.read_file(PRODUCT_IMAGE_PATH).await?))
        } else {
            Value::String("no photo".to_string())
        };

        handle
            .write_file(PRODUCT_IMAGE_PATH, decode_base64("imageData", &body.image_data)?)
            .await?;

        let mut plan = AliasPlan::new().register(AliasDescriptor::gtin_owner(&body.product_code));
        for language in handle.list_folders("/leaflet").await? {
            plan = plan.register(leaflet_alias("leaflet", &entity, &metadata, &language));
        }

        ctx.commit_with_aliases(handle.clone(), plan).await?;

        tracing::info!("Photo of product {} replaced", body.product_code);

        Ok(Mutation {
            entity,
            metadata,
            existed_before,
            diff: Diff {
                old_value,
                new_value: Value::String(body.image_data.clone()),
            },
            anchor_id: handle.anchor_id().to_string(),
        })
    }
}
