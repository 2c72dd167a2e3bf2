use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use sourcedex::analysis::AnalyzerSet;
use sourcedex::config::{QueryConfig, SchedulerConfig, SuggesterConfig};
use sourcedex::document::DocumentBuilder;
use sourcedex::suggest::Suggester;
use sourcedex::{
    CancelToken, Field, FileMeta, IndexScheduler, ProjectIndex, QueryExecutor, SearchRequest,
    SearchTarget, Similarity, SuggestRequest,
};

struct BenchEnv {
    _src: TempDir,
    _idx: TempDir,
    index: ProjectIndex,
}

fn source_file(i: usize) -> String {
    format!(
        "#include \"common.h\"\n\n\
         static int helper_{i}(int value) {{\n    return value * {i};\n}}\n\n\
         int handler_{i}(struct request *req) {{\n    \
         if (!req) return -1;\n    return helper_{i}(req->size) + dispatch(req);\n}}\n"
    )
}

fn build_env(file_count: usize) -> BenchEnv {
    let src = TempDir::new().unwrap();
    let idx = TempDir::new().unwrap();
    for i in 0..file_count {
        let dir = src.path().join(format!("mod{}", i % 16));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("file{}.c", i)), source_file(i)).unwrap();
    }
    let index = ProjectIndex::open("bench", idx.path()).unwrap();
    let scheduler = IndexScheduler::with_analyzers(
        SchedulerConfig::default().with_history(false),
        Arc::new(AnalyzerSet::default()),
    );
    scheduler
        .index_project(&index, src.path(), &CancelToken::new())
        .unwrap();
    BenchEnv {
        _src: src,
        _idx: idx,
        index,
    }
}

fn bench_build_document(c: &mut Criterion) {
    let builder = DocumentBuilder::new(Arc::new(AnalyzerSet::default()));
    let text = (0..50).map(source_file).collect::<String>();
    c.bench_function("build_document_c", |b| {
        b.iter(|| {
            black_box(builder.build("bench", "big.c", text.as_bytes(), FileMeta::default(), &[]));
        });
    });
}

fn bench_search(c: &mut Criterion) {
    let counts = [500usize, 2_000];
    let envs: Vec<(usize, BenchEnv)> = counts.iter().map(|&n| (n, build_env(n))).collect();
    let executor = QueryExecutor::new(
        Arc::new(AnalyzerSet::default()),
        Similarity::default(),
        QueryConfig::default(),
    );
    let queries = [
        ("defs", SearchRequest::new().with_field(Field::Defs, "dispatch")),
        ("refs", SearchRequest::new().with_field(Field::Refs, "dispatch")),
        ("phrase", SearchRequest::new().with_field(Field::Full, "\"return value\"")),
        ("bool", SearchRequest::new().with_field(Field::Full, "req AND handler* -helper_1")),
    ];

    let mut group = c.benchmark_group("search");
    for (count, env) in envs.iter() {
        let targets = vec![SearchTarget::ready("bench", env.index.snapshot())];
        for (name, request) in &queries {
            group.bench_with_input(BenchmarkId::new(*name, count), &targets, |b, targets| {
                b.iter(|| {
                    black_box(executor.search(request, targets, &CancelToken::new()).unwrap());
                });
            });
        }
    }
    group.finish();
}

fn bench_suggest(c: &mut Criterion) {
    let env = build_env(2_000);
    let suggester = Suggester::new(Arc::new(AnalyzerSet::default()), SuggesterConfig::default());
    let targets = vec![SearchTarget::ready("bench", env.index.snapshot())];
    let request = SuggestRequest {
        query: SearchRequest::new().with_field(Field::Defs, "handler_1"),
        field: Field::Defs,
        caret: None,
    };
    c.bench_function("suggest_defs_prefix", |b| {
        b.iter(|| {
            black_box(suggester.suggest(&request, &targets, &CancelToken::new()).unwrap());
        });
    });
}

criterion_group!(benches, bench_build_document, bench_search, bench_suggest);
criterion_main!(benches);
