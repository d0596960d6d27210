use criterion::{Criterion, black_box, criterion_group, criterion_main};
use protolens::cache::AnalysisCache;
use protolens::golang::{GoAnalyzer, SignatureMatcher};
use protolens::proto::extract_services;
use std::path::{Path, PathBuf};

const GREETER_PROTO: &str = include_str!("../tests/fixtures/kratos/api/helloworld/v1/greeter.proto");
const USER_PROTO: &str = include_str!("../tests/fixtures/kratos/api/user/v1/user.proto");
const BIZ_GO: &str = include_str!("../tests/fixtures/kratos/internal/biz/greeter.go");
const DATA_GO: &str = include_str!("../tests/fixtures/kratos/internal/data/greeter.go");

fn bench_extract_services(c: &mut Criterion) {
    let greeter = Path::new("api/helloworld/v1/greeter.proto");
    let user = Path::new("api/user/v1/user.proto");
    c.bench_function("extract_services_greeter", |b| {
        b.iter(|| black_box(extract_services(black_box(GREETER_PROTO), greeter)))
    });
    c.bench_function("extract_services_user", |b| {
        b.iter(|| black_box(extract_services(black_box(USER_PROTO), user)))
    });
}

fn bench_go_analysis(c: &mut Criterion) {
    let analyzer = GoAnalyzer::new();
    let biz = Path::new("internal/biz/greeter.go");
    let data = Path::new("internal/data/greeter.go");
    c.bench_function("go_analyze", |b| {
        b.iter(|| {
            black_box(analyzer.analyze(biz, black_box(BIZ_GO)));
            black_box(analyzer.analyze(data, black_box(DATA_GO)))
        })
    });

    let biz_analysis = analyzer.analyze(biz, BIZ_GO);
    let data_analysis = analyzer.analyze(data, DATA_GO);
    let interfaces: Vec<_> = biz_analysis
        .interfaces
        .iter()
        .chain(&data_analysis.interfaces)
        .cloned()
        .collect();
    let structs: Vec<_> = biz_analysis
        .structs
        .iter()
        .chain(&data_analysis.structs)
        .cloned()
        .collect();
    let matcher = SignatureMatcher::default();
    c.bench_function("find_implementations", |b| {
        b.iter(|| black_box(matcher.find_implementations(black_box(&interfaces), black_box(&structs))))
    });
}

/// Lookups against a warm cache should not re-run the analyzer.
fn bench_cache_hits(c: &mut Criterion) {
    let paths: Vec<PathBuf> = (0..64).map(|idx| PathBuf::from(format!("pkg/file{idx}.go"))).collect();
    let mut cache = AnalysisCache::new(128);
    for path in &paths {
        cache.get_file_info(path, DATA_GO, 1);
    }
    c.bench_function("cache_hit_64", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(cache.get_file_info(path, DATA_GO, 1));
            }
        })
    });
}

criterion_group!(benches, bench_extract_services, bench_go_analysis, bench_cache_hits);
criterion_main!(benches);
