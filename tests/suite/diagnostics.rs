//! Diagnostics, definitions and template preprocessing through the adapter.

use cmbridge_adapter::{AdapterEvent, DiagnosticsStore};
use cmbridge_types::DiagnosticSeverity;

use crate::common::{Fixture, drain, until_output};

const TEMPLATE: &str = "package $dynamicPackageName;\nuse $rootExtensionPackage.base;\n";

#[tokio::test]
async fn compile_template_publishes_against_template() {
    let fixture = Fixture::new();
    let template = fixture.write("custom/acme/w.cmx", TEMPLATE);
    let (mut adapter, mut rx) = fixture.adapter();

    let target = adapter.compile_file(&template).await.unwrap();
    assert_eq!(target, fixture.path("custom/acme/w.cm"));
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "package custom.acme;\nuse custom.acme.base;\n"
    );

    let events = until_output(&mut rx, "compiled").await;
    assert!(events.contains(&AdapterEvent::DiagnosticsCleared));

    let mut store = DiagnosticsStore::new();
    for event in &events {
        if let AdapterEvent::Diagnostics { path, .. } = event {
            assert_eq!(path, &template);
        }
        store.apply(event);
    }

    // The three-field error line is plain output.
    let snapshot = store.snapshot();
    assert_eq!(snapshot.status_string(), "E:1 W:1");
    let (path, items) = &snapshot.files()[0];
    assert_eq!(path, &template);
    assert_eq!(items[0].severity(), DiagnosticSeverity::Error);
    assert_eq!((items[0].line(), items[0].col()), (1, 2));
    assert_eq!(items[0].message(), "unknown name");
    assert_eq!(items[1].severity(), DiagnosticSeverity::Warning);

    adapter.shutdown().await;
}

#[tokio::test]
async fn diagnostics_without_template_keep_generated_path() {
    let fixture = Fixture::new();
    let source = fixture.write("custom/acme/w.cm", "package custom.acme;\n");
    let (mut adapter, mut rx) = fixture.adapter();

    assert_eq!(adapter.compile_file(&source).await.unwrap(), source);

    let events = until_output(&mut rx, "compiled").await;
    let paths: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::Diagnostics { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(paths, vec![source.clone(), source]);

    adapter.shutdown().await;
}

#[tokio::test]
async fn goto_resolves_to_template_location() {
    let fixture = Fixture::new();
    let template = fixture.write("custom/acme/w.cmx", TEMPLATE);
    fixture.write("custom/acme/w.cm", "package custom.acme;\n");
    let (mut adapter, _rx) = fixture.adapter();

    let location = adapter.goto(&template, 17).await.unwrap();
    assert_eq!(location.path(), template);
    assert_eq!((location.line(), location.col()), (2, 4));

    adapter.shutdown().await;
}

#[tokio::test]
async fn compile_workspace_preprocesses_all_templates() {
    let fixture = Fixture::new();
    fixture.write("custom/acme/a.cmx", "$dynamicPackageName");
    fixture.write("custom/acme/tools/b.cmx", "$parentPackageName");
    let (mut adapter, mut rx) = fixture.adapter();

    let custom = fixture.path("custom");
    adapter.compile_workspace(&custom).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(fixture.path("custom/acme/a.cm")).unwrap(),
        "custom.acme"
    );
    assert_eq!(
        std::fs::read_to_string(fixture.path("custom/acme/tools/b.cm")).unwrap(),
        "custom.acme"
    );
    let expected = format!(
        "got:{{ use cm.runtime.util; compileAllBelow(CompileAllEnv(\"{}/\")); }}",
        custom.display()
    );
    until_output(&mut rx, &expected).await;

    adapter.shutdown().await;
}

#[tokio::test]
async fn compile_folders_sends_one_call_per_folder() {
    let fixture = Fixture::new();
    fixture.write("custom/acme/a.cmx", "$dynamicPackageName");
    let (mut adapter, mut rx) = fixture.adapter();

    let first = fixture.path("custom");
    let second = fixture.path("base/");
    adapter
        .compile_folders(&[first.clone(), second.clone()])
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(fixture.path("custom/acme/a.cm")).unwrap(),
        "custom.acme"
    );
    let base = second.display().to_string();
    let expected = format!(
        "got:{{ use cm.runtime.util; compileAllBelow(CompileAllEnv(\"{}/\"));\
         compileAllBelow(CompileAllEnv(\"{}/\")); }}",
        first.display(),
        base.trim_end_matches('/'),
    );
    until_output(&mut rx, &expected).await;

    adapter.shutdown().await;
}

#[tokio::test]
async fn loader_run_keeps_output() {
    let fixture = Fixture::new();
    let loader = fixture.write("custom/acme/acloader.cm", "");
    let other = fixture.write("custom/acme/main.cm", "");
    let (mut adapter, mut rx) = fixture.adapter();
    adapter.start().await.unwrap();
    drain(&mut rx);

    adapter.run_current_file(&loader).await.unwrap();
    let events = until_output(&mut rx, &format!("got:runFile(\"{}\");", loader.display())).await;
    assert!(!events.contains(&AdapterEvent::OutputCleared));
    assert!(events.contains(&AdapterEvent::DiagnosticsCleared));

    adapter.run_current_file(&other).await.unwrap();
    let events = until_output(&mut rx, &format!("got:runFile(\"{}\");", other.display())).await;
    assert!(events.contains(&AdapterEvent::OutputCleared));

    adapter.shutdown().await;
}

#[tokio::test]
async fn load_all_known_sends_load_all() {
    let fixture = Fixture::new();
    let file = fixture.write("custom/acme/main.cm", "");
    let (mut adapter, mut rx) = fixture.adapter();

    adapter.load_all_known(&file).await.unwrap();
    until_output(&mut rx, &format!("got:loadAll(\"{}\");", file.display())).await;

    adapter.shutdown().await;
}
