//! Mapping Module Tests
//!
//! ## Test Scopes
//! - **Validation helpers**: GTIN, language, batch code, file and markup checks.
//! - **Registry**: Default routes, first-match ordering, unroutable messages.
//! - **Handlers**: Product, batch, leaflet, leaflet delete and photo mappings run
//!   end to end against in-memory stores and an alias double.
//! - **Replicas**: A leaflet add propagated to mock replicas over HTTP.

#[cfg(test)]
mod tests {
    use crate::content::{ContentHandle, ContentStore};
    use crate::content::memory::MemoryContentStore;
    use crate::error::{MappingError, MappingResult};
    use crate::fixed_url::propagator::FixedUrlPropagator;
    use crate::fixed_url::resolver::{ReplicaResolver, StaticDiscovery};
    use crate::fixed_url::service::{AliasSync, FixedUrlService};
    use crate::fixed_url::types::{
        AliasAction, AliasDescriptor, AliasStep, PropagationOutcome, ReplicaEndpoint, ResourceKind,
    };
    use crate::mapping::handler::{MappingContext, MappingOptions, MessageHandler, Mutation};
    use crate::mapping::validation::{
        ContentSanitizer, FORBIDDEN_PATTERNS, ForbiddenTagSanitizer, ImageFormat, check_file_extension,
        check_filename, detect_image_format, validate_batch_code, validate_gtin,
        validate_language,
    };
    use crate::mapping::{MappingEngine, MappingRegistry, Route};
    use crate::message::{Action, Message, MessageKind};
    use crate::records::store::{InMemoryEntityStore, get_typed};
    use crate::records::types::{BATCHES_TABLE, BatchRecord, EntityKey};

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GTIN: &str = "00012345678905";
    const LEAFLET_XML: &str = "<document><title>Package leaflet</title></document>";
    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    // ============================================================
    // Test doubles and fixtures
    // ============================================================

    /// Records every alias step; optionally refuses unregistrations.
    struct RecordingAliases {
        steps: Mutex<Vec<AliasStep>>,
        fail_unregister: bool,
    }

    impl RecordingAliases {
        fn new(fail_unregister: bool) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(Vec::new()),
                fail_unregister,
            })
        }

        fn steps(&self) -> Vec<AliasStep> {
            self.steps.lock().unwrap().clone()
        }

        /// Waits until at least `count` steps were applied.
        async fn wait_for(&self, count: usize) -> Vec<AliasStep> {
            for _ in 0..200 {
                if self.steps.lock().unwrap().len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.steps()
        }
    }

    #[async_trait]
    impl AliasSync for RecordingAliases {
        async fn apply(&self, _anchor_id: &str, step: &AliasStep) -> MappingResult<PropagationOutcome> {
            if self.fail_unregister && step.action == AliasAction::Unregister {
                return Err(MappingError::AllReplicasFailed { attempts: 2 });
            }
            self.steps.lock().unwrap().push(step.clone());
            Ok(PropagationOutcome {
                replica: ReplicaEndpoint("http://r1".to_string()),
                attempts: 1,
            })
        }
    }

    struct Fixture {
        engine: Arc<MappingEngine>,
        content: Arc<MemoryContentStore>,
        records: Arc<InMemoryEntityStore>,
        aliases: Arc<RecordingAliases>,
    }

    fn fixture_with(aliases: Arc<RecordingAliases>) -> Fixture {
        let content = MemoryContentStore::new("epi");
        let records = InMemoryEntityStore::new();
        let engine = MappingEngine::new(
            content.clone(),
            records.clone(),
            aliases.clone(),
            MappingOptions {
                domain: "epi".to_string(),
                subdomain: "default".to_string(),
            },
        );
        Fixture {
            engine,
            content,
            records,
            aliases,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingAliases::new(false))
    }

    fn message(value: Value) -> Message {
        Message::from_value(value).unwrap()
    }

    fn product_message(action: &str, name: &str) -> Message {
        message(json!({
            "messageType": "product",
            "messageId": format!("product-{}", action),
            "action": action,
            "productCode": GTIN,
            "product": {"inventedName": name}
        }))
    }

    fn leaflet_message(action: &str, language: &str, xml: &str, files: Value) -> Message {
        message(json!({
            "messageType": "leaflet",
            "action": action,
            "productCode": GTIN,
            "language": language,
            "xmlFileContent": STANDARD.encode(xml),
            "otherFilesContent": files
        }))
    }

    fn leaflet_delete_message(language: &str) -> Message {
        message(json!({
            "messageType": "leaflet",
            "action": "delete",
            "productCode": GTIN,
            "language": language
        }))
    }

    async fn committed(fixture: &Fixture, entity: &EntityKey, path: &str) -> Option<Vec<u8>> {
        match fixture.content.handle(entity) {
            Some(handle) => handle.committed_file(path).await,
            None => None,
        }
    }

    // ============================================================
    // TEST 1: Validation helpers
    // ============================================================

    #[test]
    fn test_validate_gtin() {
        assert!(validate_gtin(GTIN).is_ok());
        assert!(validate_gtin("00012345678906").is_err());
        assert!(validate_gtin("0001234567890").is_err());
        assert!(validate_gtin("0001234567890A").is_err());
    }

    #[test]
    fn test_validate_language_and_batch() {
        assert!(validate_language("en").is_ok());
        assert!(validate_language("pt-BR").is_ok());
        assert!(validate_language("fr_CA").is_ok());
        assert!(validate_language("EN").is_err());
        assert!(validate_language("../en").is_err());

        assert!(validate_batch_code("LOT-2024").is_ok());
        assert!(validate_batch_code("").is_err());
        assert!(validate_batch_code("a/b").is_err());
    }

    #[test]
    fn test_file_checks() {
        assert!(check_file_extension("figure.PNG").is_ok());
        assert!(matches!(
            check_file_extension("run.exe"),
            Err(MappingError::UnsupportedFormat(_))
        ));
        assert!(check_file_extension("noext").is_err());
        assert!(check_filename("../x.png").is_err());
        assert!(check_filename("x.png").is_ok());
    }

    #[test]
    fn test_forbidden_tag_sanitizer() {
        let sanitizer = ForbiddenTagSanitizer::new();

        assert!(sanitizer.check(LEAFLET_XML.as_bytes()).is_ok());
        assert!(sanitizer.check(b"<doc><SCRIPT>alert(1)</SCRIPT></doc>").is_err());
        assert!(sanitizer.check(br#"<img src="x" onerror="alert(1)"/>"#).is_err());
        assert!(sanitizer.check(b"<a href='javascript:void(0)'>x</a>").is_err());
    }

    #[test]
    fn test_sanitizer_patterns_all_compile() {
        let sanitizer = ForbiddenTagSanitizer::new();
        assert_eq!(sanitizer.pattern_count(), FORBIDDEN_PATTERNS.len());

        let custom = ForbiddenTagSanitizer::with_patterns(&["(?i)<style"]).unwrap();
        assert!(custom.check(b"<STYLE>").is_err());
        assert!(custom.check(LEAFLET_XML.as_bytes()).is_ok());
        assert!(matches!(
            ForbiddenTagSanitizer::with_patterns(&["(unclosed"]),
            Err(MappingError::Validation(_))
        ));
    }

    #[test]
    fn test_detect_image_format() {
        assert_eq!(detect_image_format(PNG_BYTES), Some(ImageFormat::Png));
        assert_eq!(detect_image_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(detect_image_format(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(detect_image_format(b"plain text"), None);
    }

    // ============================================================
    // TEST 2: Registry routing
    // ============================================================

    #[test]
    fn test_default_mappings() {
        let registry = MappingRegistry::with_default_mappings();

        assert_eq!(registry.handler_count(), 5);
        assert_eq!(
            registry.list_handlers(),
            vec!["product", "batch", "leaflet", "leaflet_delete", "product_photo"]
        );

        let delete = leaflet_delete_message("en");
        assert_eq!(registry.find(&delete).unwrap().name(), "leaflet_delete");

        let product_delete = message(json!({
            "messageType": "product",
            "action": "delete",
            "productCode": GTIN
        }));
        assert!(registry.find(&product_delete).is_none());
    }

    /// Handler that counts invocations and then stops the dispatch.
    struct CountingHandler {
        name: &'static str,
        validated: AtomicUsize,
        mutated: AtomicUsize,
    }

    impl CountingHandler {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                validated: AtomicUsize::new(0),
                mutated: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        fn name(&self) -> &'static str {
            self.name
        }

        fn validate(&self, _ctx: &MappingContext, _message: &Message) -> MappingResult<()> {
            self.validated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn mutate(&self, _ctx: &MappingContext, _message: &Message) -> MappingResult<Mutation> {
            self.mutated.fetch_add(1, Ordering::SeqCst);
            Err(MappingError::StorageWrite(format!("{} stopped here", self.name)))
        }
    }

    fn engine_with(registry: MappingRegistry, records: Arc<InMemoryEntityStore>) -> Arc<MappingEngine> {
        MappingEngine::with_registry(
            registry,
            MemoryContentStore::new("epi"),
            records,
            RecordingAliases::new(false),
            Arc::new(ForbiddenTagSanitizer::new()),
            MappingOptions {
                domain: "epi".to_string(),
                subdomain: "default".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_unroutable_message_invokes_no_handler() {
        // ARRANGE
        let product_only = CountingHandler::new("product_only");
        let mut registry = MappingRegistry::new();
        registry.register(Route::kind(MessageKind::Product), product_only.clone());
        let records = InMemoryEntityStore::new();
        let engine = engine_with(registry, records.clone());

        // ACT
        let result = engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await;

        // ASSERT
        assert!(matches!(
            result,
            Err(MappingError::NoMatchingHandler { ref message_type, ref action })
                if message_type == "leaflet" && action == "add"
        ));
        assert_eq!(product_only.validated.load(Ordering::SeqCst), 0);
        assert_eq!(product_only.mutated.load(Ordering::SeqCst), 0);
        assert!(engine.audit_entries(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let first = CountingHandler::new("first");
        let second = CountingHandler::new("second");
        let mut registry = MappingRegistry::new();
        registry.register(
            Route::kinds(&[MessageKind::Leaflet, MessageKind::Smpc]).actions(&[Action::Add]),
            first.clone(),
        );
        registry.register(Route::kind(MessageKind::Leaflet), second.clone());
        let engine = engine_with(registry, InMemoryEntityStore::new());

        let result = engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await;

        assert!(matches!(result, Err(MappingError::StorageWrite(ref m)) if m.starts_with("first")));
        assert_eq!(first.mutated.load(Ordering::SeqCst), 1);
        assert_eq!(second.validated.load(Ordering::SeqCst), 0);

        // update is only accepted by the second rule
        let _ = engine
            .dispatch(leaflet_message("update", "en", LEAFLET_XML, json!([])))
            .await;
        assert_eq!(second.mutated.load(Ordering::SeqCst), 1);
    }

    // ============================================================
    // TEST 3: Product and batch mappings
    // ============================================================

    #[tokio::test]
    async fn test_product_add_creates_record_and_content() {
        // ARRANGE
        let f = fixture();
        let entity = EntityKey::product(GTIN);

        // ACT
        let report = f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();

        // ASSERT
        assert_eq!(report.handler, "product");
        assert_eq!(report.version, 1);
        assert_eq!(report.entity, format!("products/{}", GTIN));
        assert!(report.anchor_id.starts_with("ssi:anchor:epi:"));

        let json_file = committed(&f, &entity, "/product/product.json").await.unwrap();
        let stored: Value = serde_json::from_slice(&json_file).unwrap();
        assert_eq!(stored["inventedName"], "Aspirin");

        let steps = f.aliases.wait_for(1).await;
        assert_eq!(steps[0].action, AliasAction::Register);
        assert_eq!(steps[0].descriptor, AliasDescriptor::gtin_owner(GTIN));
    }

    #[tokio::test]
    async fn test_sequential_mutations_increment_version_by_one_each() {
        let f = fixture();
        let entity = EntityKey::product(GTIN);

        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        let before = f.engine.current_version(&entity).await.unwrap().unwrap();

        let mut versions = Vec::new();
        for i in 0..4 {
            let report = f
                .engine
                .dispatch(product_message("update", &format!("Aspirin {}", i)))
                .await
                .unwrap();
            versions.push(report.version);
        }

        assert_eq!(versions, vec![before + 1, before + 2, before + 3, before + 4]);
        assert_eq!(f.engine.current_version(&entity).await.unwrap(), Some(before + 4));

        let audit = f.engine.audit_entries(Some("epi")).await;
        assert_eq!(audit.len(), 5);
        assert!(audit.iter().all(|entry| entry.success));
        assert_eq!(audit.iter().filter(|entry| entry.existed_before).count(), 4);
    }

    #[tokio::test]
    async fn test_product_validation_rejects_before_any_write() {
        let f = fixture();

        let result = f
            .engine
            .dispatch(message(json!({
                "messageType": "product",
                "action": "add",
                "productCode": "00012345678906",
                "product": {"inventedName": "Aspirin"}
            })))
            .await;

        assert!(matches!(result, Err(MappingError::Validation(_))));
        assert_eq!(f.content.handle_count(), 0);

        let audit = f.engine.audit_entries(None).await;
        assert_eq!(audit.len(), 1);
        assert!(!audit[0].success);
    }

    #[tokio::test]
    async fn test_batch_requires_existing_product() {
        let f = fixture();
        let batch = message(json!({
            "messageType": "batch",
            "action": "add",
            "productCode": GTIN,
            "batchCode": "LOT1",
            "batch": {"expiryDate": "251231"}
        }));

        let missing = f.engine.dispatch(batch.clone()).await;
        assert!(matches!(missing, Err(MappingError::EntityNotFound(_))));
        assert_eq!(f.content.handle_count(), 0);

        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        let report = f.engine.dispatch(batch).await.unwrap();

        assert_eq!(report.version, 1);
        let record: BatchRecord = get_typed(&*f.records, BATCHES_TABLE, &format!("{}|LOT1", GTIN))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.expiry_date.as_deref(), Some("251231"));
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_batch_expiry_must_be_yymmdd() {
        let f = fixture();

        let result = f
            .engine
            .dispatch(message(json!({
                "messageType": "batch",
                "action": "add",
                "productCode": GTIN,
                "batchCode": "LOT1",
                "batch": {"expiryDate": "2025-12-31"}
            })))
            .await;

        assert!(matches!(result, Err(MappingError::Validation(_))));
    }

    // ============================================================
    // TEST 4: Leaflet mappings
    // ============================================================

    #[tokio::test]
    async fn test_leaflet_add_end_to_end() {
        // ARRANGE
        let f = fixture();
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.aliases.wait_for(1).await;
        let version_before = f.engine.current_version(&entity).await.unwrap().unwrap();

        // ACT
        let report = f
            .engine
            .dispatch(leaflet_message(
                "add",
                "en",
                LEAFLET_XML,
                json!([{"filename": "figure.png", "fileContent": STANDARD.encode(PNG_BYTES)}]),
            ))
            .await
            .unwrap();

        // ASSERT: content
        assert_eq!(
            committed(&f, &entity, "/leaflet/en/leaflet.xml").await,
            Some(LEAFLET_XML.as_bytes().to_vec())
        );
        assert_eq!(
            committed(&f, &entity, "/leaflet/en/figure.png").await,
            Some(PNG_BYTES.to_vec())
        );

        // ASSERT: version
        assert_eq!(report.version, version_before + 1);
        assert_eq!(
            f.engine.current_version(&entity).await.unwrap(),
            Some(version_before + 1)
        );

        // ASSERT: stale alias cleared, leaflet registered before the GTIN owner
        let steps = f.aliases.wait_for(4).await;
        let leaflet_steps = &steps[1..];
        assert_eq!(leaflet_steps.len(), 3);
        let alias = AliasDescriptor::leaflet("leaflet", GTIN, "en", None, None);
        assert_eq!(leaflet_steps[0].action, AliasAction::Unregister);
        assert_eq!(leaflet_steps[0].descriptor, alias);
        assert_eq!(leaflet_steps[1].action, AliasAction::Register);
        assert_eq!(leaflet_steps[1].descriptor, alias);
        assert_eq!(leaflet_steps[2].descriptor.kind, ResourceKind::GtinOwner);

        // ASSERT: audit
        let audit = f.engine.audit_entries(Some("epi")).await;
        let entry = audit
            .iter()
            .find(|entry| entry.message_type == "leaflet")
            .unwrap();
        assert_eq!(entry.action, "add");
        assert!(entry.success);
        assert!(!entry.existed_before);
        assert_eq!(entry.anchor_id.as_deref(), Some(report.anchor_id.as_str()));

        // ASSERT: language cache
        assert_eq!(
            f.engine.languages(&entity),
            vec![("leaflet".to_string(), vec!["en".to_string()])]
        );
    }

    #[tokio::test]
    async fn test_leaflet_update_replaces_language_folder() {
        let f = fixture();
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.engine
            .dispatch(leaflet_message(
                "add",
                "en",
                LEAFLET_XML,
                json!([{"filename": "figure.png", "fileContent": STANDARD.encode(PNG_BYTES)}]),
            ))
            .await
            .unwrap();
        f.aliases.wait_for(4).await;

        let report = f
            .engine
            .dispatch(leaflet_message("update", "en", "<document>v2</document>", json!([])))
            .await
            .unwrap();

        assert_eq!(report.version, 3);
        assert_eq!(
            committed(&f, &entity, "/leaflet/en/leaflet.xml").await,
            Some(b"<document>v2</document>".to_vec())
        );
        assert!(committed(&f, &entity, "/leaflet/en/figure.png").await.is_none());

        let steps = f.aliases.wait_for(7).await;
        let update_steps: Vec<AliasAction> = steps[4..].iter().map(|s| s.action).collect();
        assert_eq!(
            update_steps,
            vec![AliasAction::Unregister, AliasAction::Register, AliasAction::Register]
        );
    }

    #[tokio::test]
    async fn test_leaflet_rejections() {
        let f = fixture();
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        let entity = EntityKey::product(GTIN);
        let version = f.engine.current_version(&entity).await.unwrap();

        let forbidden = f
            .engine
            .dispatch(leaflet_message("add", "en", "<doc><script>x()</script></doc>", json!([])))
            .await;
        let bad_extension = f
            .engine
            .dispatch(leaflet_message(
                "add",
                "en",
                LEAFLET_XML,
                json!([{"filename": "payload.exe", "fileContent": "AAAA"}]),
            ))
            .await;
        let bad_base64 = f
            .engine
            .dispatch(message(json!({
                "messageType": "leaflet",
                "action": "add",
                "productCode": GTIN,
                "language": "en",
                "xmlFileContent": "%%% not base64 %%%"
            })))
            .await;
        let bad_svg = f
            .engine
            .dispatch(leaflet_message(
                "add",
                "en",
                LEAFLET_XML,
                json!([{"filename": "logo.svg", "fileContent": STANDARD.encode("<svg onload='x()'/>")}]),
            ))
            .await;

        assert!(matches!(forbidden, Err(MappingError::ForbiddenContent(_))));
        assert!(matches!(bad_extension, Err(MappingError::UnsupportedFormat(_))));
        assert!(matches!(bad_base64, Err(MappingError::Validation(_))));
        assert!(matches!(bad_svg, Err(MappingError::ForbiddenContent(_))));

        assert!(committed(&f, &entity, "/leaflet/en/leaflet.xml").await.is_none());
        assert_eq!(f.engine.current_version(&entity).await.unwrap(), version);

        let failures = f
            .engine
            .audit_entries(None)
            .await
            .into_iter()
            .filter(|entry| !entry.success)
            .count();
        assert_eq!(failures, 4);
    }

    #[tokio::test]
    async fn test_smpc_upload_is_restricted() {
        // ARRANGE
        let f = fixture();
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.aliases.wait_for(1).await;
        let version = f.engine.current_version(&entity).await.unwrap();
        let revision = f.content.handle(&entity).unwrap().revision().await;

        // ACT
        let result = f
            .engine
            .dispatch(message(json!({
                "messageType": "smpc",
                "action": "add",
                "productCode": GTIN,
                "language": "en",
                "xmlFileContent": STANDARD.encode(LEAFLET_XML)
            })))
            .await;

        // ASSERT
        let err = result.unwrap_err();
        assert!(matches!(err, MappingError::Restricted(_)));
        assert_eq!(err.code(), "MVP1_RESTRICTED");
        assert!(committed(&f, &entity, "/smpc/en/smpc.xml").await.is_none());
        assert_eq!(f.content.handle(&entity).unwrap().revision().await, revision);
        assert_eq!(f.engine.current_version(&entity).await.unwrap(), version);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.aliases.steps().len(), 1);
    }

    #[tokio::test]
    async fn test_leaflet_for_unknown_product() {
        let f = fixture();

        let result = f
            .engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await;

        assert!(matches!(result, Err(MappingError::EntityNotFound(_))));
        assert_eq!(f.content.handle_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_leaflet_alias_carries_batch_and_expiry() {
        let f = fixture();
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.engine
            .dispatch(message(json!({
                "messageType": "batch",
                "action": "add",
                "productCode": GTIN,
                "batchCode": "LOT1",
                "batch": {"expiryDate": "251231"}
            })))
            .await
            .unwrap();
        f.aliases.wait_for(2).await;

        let report = f
            .engine
            .dispatch(message(json!({
                "messageType": "leaflet",
                "action": "add",
                "productCode": GTIN,
                "batchCode": "LOT1",
                "language": "de",
                "xmlFileContent": STANDARD.encode(LEAFLET_XML)
            })))
            .await
            .unwrap();

        assert_eq!(report.entity, format!("batches/{}|LOT1", GTIN));
        let steps = f.aliases.wait_for(5).await;
        assert_eq!(steps[3].action, AliasAction::Register);
        assert_eq!(
            steps[3].descriptor,
            AliasDescriptor::leaflet("leaflet", GTIN, "de", Some("LOT1"), Some("251231"))
        );
    }

    // ============================================================
    // TEST 5: Leaflet deletion
    // ============================================================

    #[tokio::test]
    async fn test_leaflet_delete_unregisters_then_removes() {
        // ARRANGE
        let f = fixture();
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await
            .unwrap();
        f.aliases.wait_for(4).await;

        // ACT
        let report = f.engine.dispatch(leaflet_delete_message("en")).await.unwrap();

        // ASSERT: unregistration happened before dispatch returned
        let steps = f.aliases.steps();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[4].action, AliasAction::Unregister);
        assert_eq!(
            steps[4].descriptor,
            AliasDescriptor::leaflet("leaflet", GTIN, "en", None, None)
        );

        assert_eq!(report.handler, "leaflet_delete");
        assert_eq!(report.version, 3);
        assert!(committed(&f, &entity, "/leaflet/en/leaflet.xml").await.is_none());
        assert_eq!(
            f.engine.languages(&entity),
            vec![("leaflet".to_string(), Vec::<String>::new())]
        );
    }

    #[tokio::test]
    async fn test_leaflet_delete_keeps_content_when_unregister_fails() {
        // ARRANGE
        let f = fixture_with(RecordingAliases::new(true));
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await
            .unwrap();
        let version = f.engine.current_version(&entity).await.unwrap();
        let revision = f.content.handle(&entity).unwrap().revision().await;

        // ACT
        let result = f.engine.dispatch(leaflet_delete_message("en")).await;

        // ASSERT
        assert!(matches!(result, Err(MappingError::Consistency(_))));
        assert_eq!(
            committed(&f, &entity, "/leaflet/en/leaflet.xml").await,
            Some(LEAFLET_XML.as_bytes().to_vec())
        );
        let handle = f.content.handle(&entity).unwrap();
        assert_eq!(handle.revision().await, revision);
        assert_eq!(
            handle.begin().await.stat("/leaflet/en").await.unwrap(),
            Some(crate::content::EntryType::Folder)
        );
        assert_eq!(f.engine.current_version(&entity).await.unwrap(), version);

        let audit = f.engine.audit_entries(None).await;
        let failure = audit.iter().find(|entry| !entry.success).unwrap();
        assert!(
            failure
                .error
                .as_deref()
                .unwrap()
                .starts_with("NOT_ABLE_TO_ENSURE_DATA_CONSISTENCY_ON_SERVER")
        );
    }

    // ============================================================
    // TEST 6: Product photo
    // ============================================================

    #[tokio::test]
    async fn test_photo_replaces_image_and_reregisters_leaflets() {
        let f = fixture();
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await
            .unwrap();
        f.engine
            .dispatch(leaflet_message("add", "fr", LEAFLET_XML, json!([])))
            .await
            .unwrap();
        f.aliases.wait_for(7).await;

        let report = f
            .engine
            .dispatch(message(json!({
                "messageType": "ProductPhoto",
                "productCode": GTIN,
                "imageData": STANDARD.encode(PNG_BYTES)
            })))
            .await
            .unwrap();

        assert_eq!(report.handler, "product_photo");
        assert_eq!(report.diff.old_value, json!("no photo"));
        assert_eq!(
            committed(&f, &entity, "/image.png").await,
            Some(PNG_BYTES.to_vec())
        );

        let steps = f.aliases.wait_for(10).await;
        let photo_steps = &steps[7..];
        assert_eq!(photo_steps[0].descriptor, AliasDescriptor::gtin_owner(GTIN));
        assert_eq!(
            photo_steps[1].descriptor,
            AliasDescriptor::leaflet("leaflet", GTIN, "en", None, None)
        );
        assert_eq!(
            photo_steps[2].descriptor,
            AliasDescriptor::leaflet("leaflet", GTIN, "fr", None, None)
        );
    }

    #[tokio::test]
    async fn test_photo_does_not_publish_another_mappings_staged_leaflet() {
        // ARRANGE: a leaflet staged on the product but never committed
        let f = fixture();
        let entity = EntityKey::product(GTIN);
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        f.aliases.wait_for(1).await;
        let pending = f.content.open(&entity).await.unwrap();
        pending
            .write_file("/leaflet/de/leaflet.xml", LEAFLET_XML.as_bytes().to_vec())
            .await
            .unwrap();

        // ACT
        f.engine
            .dispatch(message(json!({
                "messageType": "ProductPhoto",
                "productCode": GTIN,
                "imageData": STANDARD.encode(PNG_BYTES)
            })))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(
            committed(&f, &entity, "/image.png").await,
            Some(PNG_BYTES.to_vec())
        );
        assert!(committed(&f, &entity, "/leaflet/de/leaflet.xml").await.is_none());

        f.aliases.wait_for(2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let steps = f.aliases.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].descriptor, AliasDescriptor::gtin_owner(GTIN));
    }

    #[tokio::test]
    async fn test_photo_rejects_non_image() {
        let f = fixture();
        f.engine.dispatch(product_message("add", "Aspirin")).await.unwrap();

        let result = f
            .engine
            .dispatch(message(json!({
                "messageType": "ProductPhoto",
                "productCode": GTIN,
                "imageData": STANDARD.encode("definitely not a picture")
            })))
            .await;

        assert!(matches!(result, Err(MappingError::UnsupportedFormat(_))));
    }

    // ============================================================
    // TEST 7: Concurrency across entities
    // ============================================================

    #[tokio::test]
    async fn test_concurrent_dispatch_of_independent_products() {
        let f = fixture();
        let codes = ["00012345678905", "00000000000000", "10000000000007"];
        for code in codes {
            assert!(validate_gtin(code).is_ok(), "{} should be a valid GTIN", code);
        }

        let mut tasks = Vec::new();
        for code in codes {
            let engine = f.engine.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .dispatch(message(json!({
                        "messageType": "product",
                        "action": "add",
                        "productCode": code,
                        "product": {"inventedName": "Generic"}
                    })))
                    .await
            }));
        }

        for task in tasks {
            let report = task.await.unwrap().unwrap();
            assert_eq!(report.version, 1);
        }
        assert_eq!(f.content.handle_count(), 3);
    }

    // ============================================================
    // TEST 8: Propagation to mock replicas
    // ============================================================

    #[tokio::test]
    async fn test_leaflet_add_registers_on_first_replica() {
        // ARRANGE
        let r1 = MockServer::start().await;
        let r2 = MockServer::start().await;
        let leaflet_alias = AliasDescriptor::leaflet("leaflet", GTIN, "en", None, None)
            .canonical_path(AliasAction::Register, "epi");
        let stale_alias = AliasDescriptor::leaflet("leaflet", GTIN, "en", None, None)
            .canonical_path(AliasAction::Unregister, "epi");
        let owner_alias =
            AliasDescriptor::gtin_owner(GTIN).canonical_path(AliasAction::Register, "epi");

        Mock::given(method("PUT"))
            .and(path(leaflet_alias.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&r1)
            .await;
        Mock::given(method("PUT"))
            .and(path(stale_alias.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&r1)
            .await;
        Mock::given(method("PUT"))
            .and(path(owner_alias.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&r1)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&r2)
            .await;

        let discovery = StaticDiscovery::new().with_domain("epi", vec![r1.uri(), r2.uri()]);
        let aliases = Arc::new(FixedUrlService::new(
            ReplicaResolver::new(Arc::new(discovery)),
            FixedUrlPropagator::new(Duration::from_secs(2)),
        ));
        let engine = MappingEngine::new(
            MemoryContentStore::new("epi"),
            InMemoryEntityStore::new(),
            aliases,
            MappingOptions {
                domain: "epi".to_string(),
                subdomain: "default".to_string(),
            },
        );

        // ACT
        engine.dispatch(product_message("add", "Aspirin")).await.unwrap();
        engine
            .dispatch(leaflet_message("add", "en", LEAFLET_XML, json!([])))
            .await
            .unwrap();

        // ASSERT: wait for the detached plans to reach the replica
        let mut received = Vec::new();
        for _ in 0..200 {
            received = r1.received_requests().await.unwrap();
            if received.len() >= 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.len(), 4);
        assert!(received.iter().any(|r| r.url.path() == leaflet_alias.as_str() && r.body == b"leaflet"));
    }
}
