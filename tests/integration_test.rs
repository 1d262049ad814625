//! Integration tests for cardsmith.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::too_many_lines,
    clippy::float_cmp,
    clippy::doc_markdown
)]

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use cardsmith::embedding::HashEmbedder;
use cardsmith::index::library_fingerprint;
use cardsmith::models::{ComponentDescriptor, ParamSpec, PointType};
use cardsmith::services::{
    BuildRequest, ComponentEngine, EngineBoundaries, EngineSettings, PatternFilter,
    PatternRequest, RankedList, RrfFusion,
};
use cardsmith::storage::{
    FilesystemTemplateStore, InMemoryVectorStore, SqliteResolutionStore, TemplateArtifactStore,
};
use cardsmith::{
    CardsmithConfig, ComponentLibrary, ComponentRegistry, Error, Feedback, PromotionState, dsl,
};

fn demo_manifest() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/card_library.json")
}

fn engine_over(library: Arc<dyn ComponentLibrary>, data: &TempDir) -> ComponentEngine {
    let fingerprint = library_fingerprint(&library.describe().unwrap(), &library.overrides()).unwrap();
    let boundaries = EngineBoundaries {
        library,
        store: Arc::new(InMemoryVectorStore::open(data.path().join("vectors.json")).unwrap()),
        embedder: Arc::new(HashEmbedder::new()),
        resolution: Some(Arc::new(
            SqliteResolutionStore::open(data.path().join("resolution.db"), &fingerprint).unwrap(),
        )),
        artifacts: Arc::new(FilesystemTemplateStore::new(data.path().join("templates")).unwrap()),
    };
    let engine = ComponentEngine::new(boundaries, EngineSettings::default());
    engine.reindex().unwrap();
    engine
}

fn demo_engine(data: &TempDir) -> ComponentEngine {
    engine_over(
        Arc::new(ComponentRegistry::load_manifest(demo_manifest()).unwrap()),
        data,
    )
}

#[test]
fn test_scenario_parse_and_build_section() {
    let tree = dsl::parse("§[δ]").unwrap();
    assert_eq!(tree.symbol, "§");
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].tree.symbol, "δ");

    let mut registry = ComponentRegistry::new();
    registry
        .register(
            ComponentDescriptor::class("card", "Section")
                .with_param(ParamSpec::new("widgets", "List[DecoratedText]")),
        )
        .unwrap();
    registry
        .register(ComponentDescriptor::class("card", "DecoratedText"))
        .unwrap();
    let data = TempDir::new().unwrap();
    let engine = engine_over(Arc::new(registry), &data);

    let built = engine.build_notation(&["Section", "DecoratedText"]).unwrap();
    assert_eq!(built.to_string(), "§[δ]");
}

#[test]
fn test_scenario_promotion_thresholds() {
    let data = TempDir::new().unwrap();
    let engine = demo_engine(&data);
    let id = engine
        .store_pattern(
            PatternRequest::new(
                vec![
                    "card_framework.v2.Section".to_string(),
                    "card_framework.v2.widgets.DecoratedText".to_string(),
                ],
                "deployment status card",
            )
            .with_param("text", json!("Build passed")),
        )
        .unwrap();

    for _ in 0..2 {
        engine.feedback(&id, Feedback::Positive).unwrap();
    }
    assert_eq!(
        engine.patterns().get(&id).unwrap().unwrap().state,
        PromotionState::Candidate
    );

    let outcome = engine.feedback(&id, Feedback::Positive).unwrap();
    assert_eq!(outcome.previous, PromotionState::Candidate);
    assert_eq!(outcome.state, PromotionState::TemplateEligible);
    let name = outcome.template.clone().unwrap();

    let hits = engine
        .similar_patterns(
            "deployment status card",
            &PatternFilter::new().including_templates().with_limit(10),
        )
        .unwrap();
    let template_hit = hits
        .iter()
        .find(|h| h.point_type == PointType::Template)
        .expect("template point is visible");
    assert_eq!(template_hit.params["text"], json!("Build passed"));

    for _ in 3..9 {
        let outcome = engine.feedback(&id, Feedback::Positive).unwrap();
        assert_eq!(outcome.state, PromotionState::TemplateEligible);
        assert!(outcome.artifact.is_none());
    }
    let outcome = engine.feedback(&id, Feedback::Positive).unwrap();
    assert_eq!(outcome.state, PromotionState::Materialized);
    let artifact = outcome.artifact.unwrap();
    assert!(artifact.exists());

    let store = FilesystemTemplateStore::new(data.path().join("templates")).unwrap();
    let template = store.load(&name).unwrap().unwrap();
    assert_eq!(template.positive_count, 10);
    assert!(template.materialized_at.is_some());

    let outcome = engine.feedback(&id, Feedback::Positive).unwrap();
    assert_eq!(outcome.previous, PromotionState::Materialized);
    assert!(!outcome.promoted());
}

#[test]
fn test_scenario_fusion_exact_scores() {
    let fusion = RrfFusion::new();
    let fused = fusion.fuse(&[
        RankedList::from_ids("identity", &["A", "B", "C"]),
        RankedList::from_ids("content", &["B", "A"]),
        RankedList::from_ids("structure", &["C"]),
    ]);

    let a = 1.0 / 61.0 + 1.0 / 62.0;
    let c = 1.0 / 61.0 + 1.0 / 63.0;
    let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert!((fused[0].score - a).abs() < 1e-12);
    assert_eq!(fused[0].score, fused[1].score);
    assert!((fused[2].score - c).abs() < 1e-12);
    assert!(fused[1].score > fused[2].score);
}

#[test]
fn test_demo_library_indexes() {
    let data = TempDir::new().unwrap();
    let engine = demo_engine(&data);
    let index = engine.index();

    assert_eq!(index.symbol_for("card_framework.v2.Section"), Some("§"));
    assert_eq!(index.symbol_for("card_framework.v2.widgets.ButtonList"), Some("Ƀ"));
    assert!(index.symbol_for("card_framework.v2.render.render_card").is_none());
    assert!(index.graph().is_acyclic());
    assert!(index.graph().can_contain(
        "card_framework.v2.Card",
        "card_framework.v2.widgets.Button"
    ));

    let report = engine.validate("ℂ[§[δ, Ƀ[ᵬ×2]]]").unwrap();
    assert!(report.is_valid(), "{report}");
    let report = engine.validate("ᵬ[§]").unwrap();
    assert!(!report.is_valid());
}

#[test]
fn test_plan_round_trip_through_notation() {
    let data = TempDir::new().unwrap();
    let engine = demo_engine(&data);
    let plan = engine
        .plan(
            BuildRequest::new(["Section", "DecoratedText", "ButtonList", "Button", "Button"])
                .with_param("text", json!("Deploy"))
                .with_param("header", json!("Release"))
                .with_description("release card with actions"),
        )
        .unwrap();

    let notation = plan.notation.clone().unwrap();
    assert_eq!(notation, "§[δ, Ƀ[ᵬ×2]]");
    assert_eq!(plan.steps.len(), 5);
    assert_eq!(plan.steps[0].params["header"], json!("Release"));
    assert_eq!(plan.steps[1].params["text"], json!("Deploy"));

    let expanded = engine.expand(&notation).unwrap();
    let planned: Vec<String> = plan.paths().iter().map(|p| (*p).to_string()).collect();
    assert_eq!(expanded, planned);
    assert!(plan.pattern_id.is_some());
}

#[test]
fn test_state_survives_restart() {
    let data = TempDir::new().unwrap();
    let id = {
        let engine = demo_engine(&data);
        let plan = engine
            .plan(BuildRequest::new(["Section", "Image"]).with_description("photo section"))
            .unwrap();
        engine.resolve("card_framework.v2.Section").unwrap();
        plan.pattern_id.unwrap()
    };

    let engine = demo_engine(&data);
    let pattern = engine.patterns().get(&id).unwrap().unwrap();
    assert_eq!(pattern.description, "photo section");
    let resolution = engine.cache().resolve("card_framework.v2.Section").unwrap();
    assert_eq!(resolution.tier.as_str(), "l2");
}

#[test]
fn test_unknown_feedback_target() {
    let data = TempDir::new().unwrap();
    let engine = demo_engine(&data);
    let err = engine
        .feedback(&"missing".into(), Feedback::Positive)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_negative_patterns_hidden_by_default() {
    let data = TempDir::new().unwrap();
    let engine = demo_engine(&data);
    let id = engine
        .store_pattern(
            PatternRequest::new(
                vec!["card_framework.v2.widgets.Grid".to_string()],
                "image gallery grid",
            )
            .with_feedback(Feedback::Negative),
        )
        .unwrap();

    let hidden = engine
        .similar_patterns("image gallery grid", &PatternFilter::new())
        .unwrap();
    assert!(hidden.iter().all(|h| h.id != id.as_str()));

    let shown = engine
        .similar_patterns("image gallery grid", &PatternFilter::new().including_negative())
        .unwrap();
    assert!(shown.iter().any(|h| h.id == id.as_str()));
}

#[test]
fn test_config_points_at_demo_library() {
    let config = CardsmithConfig::parse(&format!(
        "library = \"{}\"\n[promotion]\ntemplate_threshold = 1\nmaterialize_threshold = 1\n",
        demo_manifest().display()
    ))
    .unwrap();
    let settings = EngineSettings::from_config(&config).unwrap();
    assert_eq!(settings.thresholds.template, 1);
    assert_eq!(config.library, Some(demo_manifest()));

    let sample = CardsmithConfig::load_from_file(
        &PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/cardsmith.toml"),
    )
    .unwrap();
    assert!(sample.cache.l2_enabled);
    assert_eq!(EngineSettings::from_config(&sample).unwrap(), EngineSettings::default());

    let bad = CardsmithConfig::parse("[promotion]\ntemplate_threshold = 5\nmaterialize_threshold = 2\n")
        .unwrap();
    assert!(matches!(
        EngineSettings::from_config(&bad),
        Err(Error::InvalidInput(_))
    ));
}
