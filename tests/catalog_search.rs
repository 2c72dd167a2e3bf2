//! Multi-project search and autocomplete through the catalog

use sourcedex::analysis::AnalyzerSet;
use sourcedex::config::{GroupConfig, ProjectConfig};
use sourcedex::scheduler::NoHistory;
use sourcedex::suggest::Suggester;
use sourcedex::{
    CancelToken, Catalog, CatalogConfig, Field, IndexScheduler, QueryExecutor, SearchRequest,
    SuggestRequest,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Workspace {
    _root: TempDir,
    config: CatalogConfig,
}

fn workspace(projects: &[(&str, &[(&str, &str)])]) -> Workspace {
    let root = TempDir::new().unwrap();
    let mut config = CatalogConfig {
        data_dir: root.path().join("data"),
        groups: vec![GroupConfig {
            name: "kernel".to_string(),
            pattern: "linux-.*".to_string(),
            parent: None,
        }],
        ..CatalogConfig::default()
    };
    config.settings.scheduler = config.settings.scheduler.clone().with_worker_threads(2);
    for (name, files) in projects {
        let source_root = root.path().join("src").join(name);
        for (path, text) in files.iter() {
            let full = source_root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, text).unwrap();
        }
        config.projects.push(ProjectConfig {
            name: name.to_string(),
            source_root,
            description: None,
        });
    }

    let catalog = Catalog::open(&config).unwrap();
    let scheduler = IndexScheduler::new(&config.settings);
    for project in catalog.projects() {
        scheduler
            .index_project_with_history(
                &catalog.index(&project.name).unwrap(),
                &project.source_root,
                &NoHistory,
                &CancelToken::new(),
            )
            .unwrap();
    }
    Workspace { _root: root, config }
}

fn executor() -> QueryExecutor {
    let settings = sourcedex::IndexSettings::default();
    QueryExecutor::new(
        Arc::new(AnalyzerSet::default()),
        settings.similarity,
        settings.query,
    )
}

fn corrupt_postings(index_dir: &Path) {
    for entry in fs::read_dir(index_dir).unwrap() {
        let postings = entry.unwrap().path().join("postings.bin");
        if postings.exists() {
            fs::write(postings, b"garbage").unwrap();
        }
    }
}

#[test]
fn test_results_merge_across_projects() {
    let ws = workspace(&[
        ("linux-a", &[("mm/alloc.c", "void *kmalloc(int size) { return 0; }\n")]),
        ("linux-b", &[("mm/alloc.c", "void *kmalloc(int size) { return 0; }\n")]),
        ("tools", &[("main.c", "int main(void) { kmalloc(4); return 0; }\n")]),
    ]);
    let catalog = Catalog::open(&ws.config).unwrap();
    let executor = executor();

    let targets = catalog.targets(&[]).unwrap();
    let defs = executor
        .search(&SearchRequest::new().with_field(Field::Defs, "kmalloc"), &targets, &CancelToken::new())
        .unwrap();
    let projects: Vec<_> = defs.hits.iter().map(|h| h.project.as_str()).collect();
    assert_eq!(projects, vec!["linux-a", "linux-b"]);
    assert!(defs.failed_projects.is_empty());

    let kernel = catalog.targets(&["kernel".to_string()]).unwrap();
    let refs = executor
        .search(&SearchRequest::new().with_field(Field::Refs, "kmalloc"), &kernel, &CancelToken::new())
        .unwrap();
    assert!(refs.hits.is_empty());

    let everywhere = executor
        .search(&SearchRequest::new().with_field(Field::Refs, "kmalloc"), &targets, &CancelToken::new())
        .unwrap();
    assert_eq!(everywhere.hits.len(), 1);
    assert_eq!(everywhere.hits[0].project, "tools");
}

#[test]
fn test_corrupt_project_is_isolated() {
    let ws = workspace(&[
        ("healthy", &[("a.c", "int shared_name;\n")]),
        ("damaged", &[("b.c", "int shared_name;\n")]),
    ]);
    corrupt_postings(&ws.config.index_dir("damaged"));

    let catalog = Catalog::open(&ws.config).unwrap();
    let targets = catalog.targets(&[]).unwrap();
    let results = executor()
        .search(&SearchRequest::new().with_field(Field::Defs, "shared_name"), &targets, &CancelToken::new())
        .unwrap();

    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].project, "healthy");
    assert_eq!(results.failed_projects.len(), 1);
    assert_eq!(results.failed_projects[0].project, "damaged");
    assert!(results.failed_projects[0].reason.contains("checksum"));

    let listing = catalog.listing();
    let damaged = listing.iter().find(|p| p.name == "damaged").unwrap();
    assert!(damaged.unavailable.is_some());
}

#[test]
fn test_autocomplete_across_projects() {
    let ws = workspace(&[
        ("one", &[("x.c", "int buffer_len;\nint buffer_cap;\n")]),
        ("two", &[("y.c", "int buffer_len;\n")]),
    ]);
    let catalog = Catalog::open(&ws.config).unwrap();
    let suggester = Suggester::new(Arc::new(AnalyzerSet::default()), ws.config.settings.suggester.clone());
    let targets = catalog.targets(&[]).unwrap();

    let response = suggester
        .suggest(
            &SuggestRequest {
                query: SearchRequest::new().with_field(Field::Defs, "buffer_"),
                field: Field::Defs,
                caret: None,
            },
            &targets,
            &CancelToken::new(),
        )
        .unwrap();
    let phrases: Vec<_> = response.suggestions.iter().map(|s| s.phrase.as_str()).collect();
    assert_eq!(phrases, vec!["buffer_len", "buffer_cap"]);
    assert_eq!(response.suggestions[0].projects, vec!["one", "two"]);
    assert!(!response.partial_result);
}
