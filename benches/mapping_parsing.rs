use criterion::{black_box, criterion_group, criterion_main, Criterion};
use proguard_rewrite::{MappingFile, MappingIndex};

static MAPPING: &[u8] = include_bytes!("../tests/res/mapping.txt");

fn mapping_index(mapping: MappingFile) -> MappingIndex {
    MappingIndex::parse(mapping).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("mapping index", |b| {
        b.iter(|| mapping_index(black_box(MappingFile::new(MAPPING))))
    });
    c.bench_function("mapping summary", |b| {
        b.iter(|| black_box(MappingFile::new(MAPPING)).summary())
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(25);
    targets = criterion_benchmark
}
criterion_main!(benches);
