use criterion::{criterion_group, criterion_main, Criterion};
use deb_incoming::version::Version;

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("version_parse");

    // the shapes the incoming queue sees: plain uploads, binary-only
    // rebuilds, epoch-bearing packages, and backports
    group.bench_function("upload", |b| {
        b.iter(|| {
            let _: Version = "2.10-3".parse().unwrap();
        })
    });

    group.bench_function("binnmu", |b| {
        b.iter(|| {
            let _: Version = "2.10-3+b4".parse().unwrap();
        })
    });

    group.bench_function("epoch", |b| {
        b.iter(|| {
            let _: Version = "7:5.1.4-0+deb12u1".parse().unwrap();
        })
    });

    group.bench_function("backport", |b| {
        b.iter(|| {
            let _: Version = "21.06.0+ds1-2~bpo11+1".parse().unwrap();
        })
    });

    group.bench_function("without_epoch", |b| {
        let version: Version = "7:5.1.4-0+deb12u1".parse().unwrap();
        b.iter(|| version.without_epoch())
    });

    // what the check-add dry run does per package: compare the upload
    // against the published version
    group.bench_function("compare_binnmu", |b| {
        let published: Version = "2.10-3".parse().unwrap();
        let upload: Version = "2.10-3+b4".parse().unwrap();
        b.iter(|| published.cmp(&upload))
    });

    group.bench_function("compare_epoch_mismatch", |b| {
        let published: Version = "1:2.10-3".parse().unwrap();
        let upload: Version = "2.30-1".parse().unwrap();
        b.iter(|| published.cmp(&upload))
    });

    group.bench_function("compare_tilde", |b| {
        let published: Version = "3.0~rc2-1".parse().unwrap();
        let upload: Version = "3.0-1".parse().unwrap();
        b.iter(|| published.cmp(&upload))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
