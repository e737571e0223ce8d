use criterion::{criterion_group, criterion_main, Criterion};
use deb_incoming::control::Paragraph;

macro_rules! benchmark_paragraph {
    ($grp:ident, $name:ident, $para:expr) => {
        $grp.bench_function(stringify!($name), |b| {
            b.iter(|| {
                Paragraph::parse($para).unwrap();
            })
        });
    };
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("paragraph_parse");

    benchmark_paragraph!(
        group,
        simple,
        "\
Hello: World
Hello1: World2
Single:
 Multi line
 Value goes
 Here
"
    );

    benchmark_paragraph!(
        group,
        simple_comment,
        "\
Hello: World
# Comment here
Hello1: World2
Single:
 Multi line
 Value goes
 Here
"
    );

    benchmark_paragraph!(
        group,
        manifest,
        "\
Source: hello
Binary: hello hello-dbgsym
Architecture: source amd64
Version: 2.10-3
Distribution: unstable
Files:
 e7bd195571b19d33bd83d1c379fe6432 1183 devel optional hello_2.10-3.dsc
 16678389ba7fddcdfa05e0707d61f043 12688 devel optional hello_2.10-3.debian.tar.xz
 d36abefbc87d8dfb7704238f0aee0e90 53324 devel optional hello_2.10-3_amd64.deb
Checksums-Sha256:
 e8ba61cf5c8e2ef3107cc1c6e4fb7125064947dd5565c22cde1b9a407c6264ba 1183 hello_2.10-3.dsc
 f43ddcca8d7168c5d52b53e1f2a69b78f42f8387633ef8955edd0621c73cf65c 12688 hello_2.10-3.debian.tar.xz
 052cb5fdfa86bb3485d6194d9ae2fd1cabbccbdd9c7da3258aed1674b288bbf9 53324 hello_2.10-3_amd64.deb
"
    );
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
