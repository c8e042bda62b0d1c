//! Product and batch metadata mappings.

use super::handler::{MappingContext, MessageHandler, Mutation};
use super::validation::{validate_batch_code, validate_gtin};
use crate::error::{MappingError, MappingResult};
use crate::fixed_url::types::{AliasDescriptor, AliasPlan};
use crate::message::{Action, Message, MessageBody};
use crate::records::store::{get_typed, upsert};
use crate::records::types::{BATCHES_TABLE, BatchRecord, Diff, EntityKey, PRODUCTS_TABLE, ProductRecord};

use async_trait::async_trait;
use serde_json::Value;

pub const PRODUCT_METADATA_PATH: &str = "/product/product.json";
pub const BATCH_METADATA_PATH: &str = "/batch/batch.json";

pub struct ProductHandler;

#[async_trait]
impl MessageHandler for ProductHandler {
    fn name(&self) -> &'static str {
        "product"
    }

    fn validate(&self, _ctx: &MappingContext, message: &Message) -> MappingResult<()> {
        let MessageBody::Product(body) = &message.body else {
            return Err(MappingError::Validation("not a product message".to_string()));
        };
        validate_gtin(&body.product_code)?;
        match body.product.invented_name.as_deref() {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(MappingError::Validation(
                "product.inventedName is required".to_string(),
            )),
        }
    }

    async fn mutate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<Mutation> {
        let MessageBody::Product(body) = &message.body else {
            return Err(MappingError::Validation("not a product message".to_string()));
        };
        let entity = EntityKey::product(&body.product_code);
        let existing: Option<ProductRecord> =
            get_typed(ctx.records.as_ref(), PRODUCTS_TABLE, &entity.pk()).await?;
        let handle = ctx.content.open(&entity).await?;

        if body.action == Action::Update || existing.is_some() {
            handle.delete("/product", true).await?;
        }
        handle
            .write_file(PRODUCT_METADATA_PATH, serde_json::to_vec(&body.product)?)
            .await?;

        let plan = AliasPlan::new().register(AliasDescriptor::gtin_owner(&body.product_code));
        ctx.commit_with_aliases(handle.clone(), plan).await?;

        let record = ProductRecord {
            pk: entity.pk(),
            product_code: body.product_code.clone(),
            invented_name: body.product.invented_name.clone(),
            name_medicinal_product: body.product.name_medicinal_product.clone(),
            version: existing.as_ref().map(|r| r.version).unwrap_or(0),
            extra: body.product.extra.clone(),
        };
        upsert(ctx.records.as_ref(), PRODUCTS_TABLE, &record.pk, &record).await?;

        tracing::info!("Product {} stored", body.product_code);

        let old_value = match &existing {
            Some(previous) => serde_json::to_value(previous)?,
            None => Value::Null,
        };
        Ok(Mutation {
            entity,
            existed_before: existing.is_some(),
            metadata: old_value.clone(),
            diff: Diff {
                old_value,
                new_value: serde_json::to_value(&record)?,
            },
            anchor_id: handle.anchor_id().to_string(),
        })
    }
}

pub struct BatchHandler;

fn validate_expiry(expiry: Option<&str>) -> MappingResult<()> {
    let Some(expiry) = expiry else {
        return Err(MappingError::Validation("batch.expiryDate is required".to_string()));
    };
    let digits_ok = expiry.len() == 6 && expiry.bytes().all(|b| b.is_ascii_digit());
    let month_ok = digits_ok && matches!(expiry[2..4].parse::<u8>(), Ok(1..=12));
    let day_ok = digits_ok && matches!(expiry[4..6].parse::<u8>(), Ok(0..=31));
    if month_ok && day_ok {
        Ok(())
    } else {
        Err(MappingError::Validation(format!(
            "batch.expiryDate '{}' must be YYMMDD",
            expiry
        )))
    }
}

#[async_trait]
impl MessageHandler for BatchHandler {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn validate(&self, _ctx: &MappingContext, message: &Message) -> MappingResult<()> {
        let MessageBody::Batch(body) = &message.body else {
            return Err(MappingError::Validation("not a batch message".to_string()));
        };
        validate_gtin(&body.product_code)?;
        validate_batch_code(&body.batch_code)?;
        validate_expiry(body.batch.expiry_date.as_deref())
    }

    async fn mutate(&self, ctx: &MappingContext, message: &Message) -> MappingResult<Mutation> {
        let MessageBody::Batch(body) = &message.body else {
            return Err(MappingError::Validation("not a batch message".to_string()));
        };
        ctx.require_record(&EntityKey::product(&body.product_code))
            .await?;

        let entity = EntityKey::batch(&body.product_code, &body.batch_code);
        let existing: Option<BatchRecord> =
            get_typed(ctx.records.as_ref(), BATCHES_TABLE, &entity.pk()).await?;
        let handle = ctx.content.open(&entity).await?;

        if body.action == Action::Update || existing.is_some() {
            handle.delete("/batch", true).await?;
        }
        handle
            .write_file(BATCH_METADATA_PATH, serde_json::to_vec(&body.batch)?)
            .await?;

        let plan = AliasPlan::new().register(AliasDescriptor::gtin_owner(&body.product_code));
        ctx.commit_with_aliases(handle.clone(), plan).await?;

        let record = BatchRecord {
            pk: entity.pk(),
            product_code: body.product_code.clone(),
            batch_code: body.batch_code.clone(),
            expiry_date: body.batch.expiry_date.clone(),
            epi_leaflet_version: existing.as_ref().and_then(|r| r.epi_leaflet_version),
            version: existing.as_ref().map(|r| r.version).unwrap_or(0),
            extra: body.batch.extra.clone(),
        };
        upsert(ctx.records.as_ref(), BATCHES_TABLE, &record.pk, &record).await?;

        tracing::info!("Batch {} of {} stored", body.batch_code, body.product_code);

        let old_value = match &existing {
            Some(previous) => serde_json::to_value(previous)?,
            None => Value::Null,
        };
        Ok(Mutation {
            entity,
            existed_before: existing.is_some(),
            metadata: old_value.clone(),
            diff: Diff {
                old_value,
                new_value: serde_json::to_value(&record)?,
            },
            anchor_id: handle.anchor_id().to_string(),
        })
    }
}
