mod support;

use std::sync::Arc;

use assert_matches::assert_matches;
use support::{TestWorkspace, column_annotation, subject_table, touch_into_past};
use tablegraph::cache::CacheOutcome;
use tablegraph::export::CanonicalOptions;
use tablegraph::model::{CellCoord, StatementValue};
use tablegraph::resolver::StaticResolver;
use tablegraph::{Annotation, CellErrorKind, Engine, EngineConfig, EngineError, ValueType, Window};

fn population_csv(workspace: &TestWorkspace) -> std::path::PathBuf {
    workspace.write_csv(
        "population.csv",
        &[&["Chad", "17"], &["Niger", "25"], &["Mali", "22"]],
    )
}

fn annotation() -> Annotation {
    let mut annotation = column_annotation(3, "P1082");
    annotation.data.value_type = Some(ValueType::Quantity);
    annotation
}

#[test]
fn full_pass_is_cached_until_inputs_change() {
    let workspace = TestWorkspace::new();
    let file = population_csv(&workspace);
    let engine = Engine::new(workspace.config());
    let table = subject_table(&[("Chad", "Q657"), ("Niger", "Q1032"), ("Mali", "Q912")]);

    let first = engine
        .generate(&file, "population.csv", &annotation(), &table, Window::ALL)
        .expect("first");
    assert_eq!(first.cache, CacheOutcome::Miss);
    assert_eq!(first.result.statements.len(), 3);
    assert!(first.metadata.is_some());

    let second = engine
        .generate(&file, "population.csv", &annotation(), &table, Window::ALL)
        .expect("second");
    assert_eq!(second.cache, CacheOutcome::Hit);
    assert!(second.metadata.is_none());
    assert_eq!(second.result.statements, first.result.statements);

    let rewikified = subject_table(&[("Chad", "Q1"), ("Niger", "Q1032"), ("Mali", "Q912")]);
    let third = engine
        .generate(&file, "population.csv", &annotation(), &rewikified, Window::ALL)
        .expect("third");
    assert_eq!(third.cache, CacheOutcome::Miss);
    assert_eq!(third.result.statements[&CellCoord::new(1, 0)].subject, "Q1");

    touch_into_past(&file);
    let fourth = engine
        .generate(&file, "population.csv", &annotation(), &table, Window::ALL)
        .expect("fourth");
    assert_eq!(fourth.cache, CacheOutcome::Miss);

    let stats = engine.stats();
    assert_eq!(stats.results.hits, 1);
    assert_eq!(stats.results.misses, 3);
}

#[test]
fn windowed_calls_bypass_the_result_cache() {
    let workspace = TestWorkspace::new();
    let file = population_csv(&workspace);
    let engine = Engine::new(workspace.config());
    let table = subject_table(&[("Chad", "Q657"), ("Niger", "Q1032"), ("Mali", "Q912")]);

    let page = engine
        .generate(&file, "population.csv", &annotation(), &table, Window::new(1, 2))
        .expect("page");
    assert_eq!(page.cache, CacheOutcome::Bypass);
    let cells: Vec<CellCoord> = page.result.statements.keys().copied().collect();
    assert_eq!(cells, vec![CellCoord::new(1, 1)]);
    assert_eq!(page.result.highlights.items, vec![CellCoord::new(0, 1)]);
    assert_eq!(engine.stats().results.operations(), 0);
}

#[test]
fn invalid_annotation_fails_before_any_work() {
    let workspace = TestWorkspace::new();
    let file = population_csv(&workspace);
    let engine = Engine::new(workspace.config());
    let mut annotation = annotation();
    annotation.data.property = None;

    assert_matches!(
        engine.generate(&file, "population.csv", &annotation, &subject_table(&[]), Window::ALL),
        Err(EngineError::InvalidAnnotation(_))
    );
    assert_eq!(engine.stats().sheets.operations(), 0);
}

#[test]
fn warm_and_clear_manage_artifacts() {
    let workspace = TestWorkspace::new();
    let file = population_csv(&workspace);
    let engine = Engine::new(workspace.config());
    let table = subject_table(&[("Chad", "Q657")]);

    assert_eq!(engine.warm(&file).expect("warm"), vec!["population.csv".to_string()]);
    engine
        .generate(&file, "population.csv", &annotation(), &table, Window::ALL)
        .expect("generate");
    assert_eq!(engine.stats().sheets.hits, 1);

    let removed = engine.clear_cache(None).expect("clear");
    assert_eq!(removed, 2);
    assert!(engine.sheet_cache().artifact(&file, "population.csv").is_none());
}

#[test]
fn canonical_export_uses_the_label_resolver() {
    let workspace = TestWorkspace::new();
    let file = population_csv(&workspace);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_label("P1082", "population")
            .with_label("Q657", "Chad"),
    );
    let engine = Engine::new(workspace.config()).with_label_resolver(resolver);
    let table = subject_table(&[("Chad", "Q657"), ("Niger", "Q1032"), ("Mali", "Q912")]);

    let output = engine
        .generate(&file, "population.csv", &annotation(), &table, Window::ALL)
        .expect("generate");
    let csv = engine
        .export_canonical(
            &output.result.statements,
            &CanonicalOptions {
                dataset_id: "sahel".into(),
                ..CanonicalOptions::default()
            },
        )
        .expect("csv");

    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("sahel,population,population,Chad,Q657,17,"));
    assert!(lines[2].starts_with("sahel,population,population,Q1032,Q1032,25,"));
}

#[tokio::test]
async fn async_generation_matches_sync() {
    let workspace = TestWorkspace::new();
    let file = population_csv(&workspace);
    let engine = Arc::new(Engine::new(workspace.config_without_cache()));
    let table = Arc::new(subject_table(&[
        ("Chad", "Q657"),
        ("Niger", "Q1032"),
        ("Mali", "Q912"),
    ]));
    let annotation = Arc::new(annotation());

    let sync = engine
        .generate(&file, "population.csv", &annotation, &table, Window::ALL)
        .expect("sync");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let (file, annotation, table) = (file.clone(), annotation.clone(), table.clone());
            tokio::spawn(async move {
                engine
                    .generate_async(file, "population.csv".into(), annotation, table, Window::ALL)
                    .await
            })
        })
        .collect();

    for handle in handles {
        let output = handle.await.expect("join").expect("generate");
        assert_eq!(output.result.statements, sync.result.statements);
    }
    assert_eq!(
        sync.result.statements[&CellCoord::new(1, 2)].value,
        StatementValue::Quantity {
            amount: 22.0,
            unit: None
        }
    );
}

#[tokio::test]
async fn async_generation_surfaces_errors() {
    let workspace = TestWorkspace::new();
    let engine = Arc::new(Engine::new(workspace.config()));

    let result = engine
        .generate_async(
            workspace.path("missing.csv"),
            "missing.csv".into(),
            Arc::new(annotation()),
            Arc::new(subject_table(&[("Chad", "Q657")])),
            Window::ALL,
        )
        .await;
    assert_matches!(result, Err(EngineError::SourceUnavailable { .. }));
}

#[test]
fn generator_settings_are_part_of_the_result_key() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("gaps.csv", &[&["Chad", "17"], &["Niger", ""]]);
    let table = subject_table(&[("Chad", "Q657"), ("Niger", "Q1032")]);
    let mut annotation = column_annotation(2, "P1082");
    annotation.data.value_type = Some(ValueType::Quantity);

    let quiet = Engine::new(workspace.config())
        .generate(&file, "gaps.csv", &annotation, &table, Window::ALL)
        .expect("quiet");
    assert_eq!(quiet.cache, CacheOutcome::Miss);
    assert!(quiet.result.errors.is_empty());

    let loud_engine = Engine::new(EngineConfig {
        warn_for_empty_cells: true,
        ..workspace.config()
    });
    let loud = loud_engine
        .generate(&file, "gaps.csv", &annotation, &table, Window::ALL)
        .expect("loud");
    assert_eq!(loud.cache, CacheOutcome::Miss);
    assert_eq!(
        loud.result.errors[&CellCoord::new(1, 1)][0].kind,
        CellErrorKind::EmptyCell
    );

    let typed = Engine::new(workspace.config()).with_type_resolver(Arc::new(
        StaticResolver::new().with_type("P1082", ValueType::Quantity),
    ));
    let typed = typed
        .generate(&file, "gaps.csv", &annotation, &table, Window::ALL)
        .expect("typed");
    assert_eq!(typed.cache, CacheOutcome::Miss);

    let again = Engine::new(workspace.config())
        .generate(&file, "gaps.csv", &annotation, &table, Window::ALL)
        .expect("again");
    assert_eq!(again.cache, CacheOutcome::Hit);
}

#[test]
fn string_values_keep_leading_zeros() {
    let workspace = TestWorkspace::new();
    let file = workspace.write_csv("zips.csv", &[&["Boston", "02139"], &["Q90", "007"]]);
    let table = subject_table(&[("Boston", "Q100")]);
    let mut annotation = column_annotation(2, "P281");
    annotation.data.value_type = Some(ValueType::String);

    let output = Engine::new(workspace.config_without_cache())
        .generate(&file, "zips.csv", &annotation, &table, Window::ALL)
        .expect("generate");

    assert_eq!(
        output.result.statements[&CellCoord::new(1, 0)].value,
        StatementValue::String {
            text: "02139".into(),
            lang: None
        }
    );
    assert_eq!(
        output.result.statements[&CellCoord::new(1, 1)].value.display(),
        "007"
    );
}
