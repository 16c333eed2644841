use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use tempfile::TempDir;
use vecdex::analysis::LatinTokenizer;
use vecdex::core::config::{Config, LoadingStrategy, Similarity};
use vecdex::core::types::{DocId, Document, FieldValue};
use vecdex::session::SessionFactory;
use vecdex::storage::postings::PostingsWriter;
use vecdex::tree::VectorTree;
use vecdex::vector::codec::VectorWriter;
use vecdex::vector::term_vector::TermVector;

fn random_words(count: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.gen_range(3..10);
            (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
        })
        .collect()
}

fn build_tree(words: &[String]) -> VectorTree {
    let sim = Similarity::default();
    let mut tree = VectorTree::new();
    for (i, word) in words.iter().enumerate() {
        tree.insert(TermVector::from_text(word), DocId(i as u64), &sim).unwrap();
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_insert");
    for size in [1_000, 10_000] {
        let words = random_words(size, 7);
        group.bench_with_input(BenchmarkId::from_parameter(size), &words, |b, words| {
            b.iter(|| black_box(build_tree(words)));
        });
    }
    group.finish();
}

fn bench_closest_match(c: &mut Criterion) {
    let sim = Similarity::default();
    let tree = build_tree(&random_words(10_000, 7));
    let queries: Vec<TermVector> = random_words(100, 11).iter().map(|w| TermVector::from_text(w)).collect();

    c.bench_function("closest_match_10k", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(tree.closest_match(query, &sim));
            }
        })
    });
}

fn bench_codec(c: &mut Criterion) {
    let mut tree = build_tree(&random_words(10_000, 7));
    let mut vectors = VectorWriter::new(Vec::new(), 0);
    let mut postings = PostingsWriter::new(Cursor::new(Vec::new())).unwrap();
    tree.flush_payload(&mut vectors, &mut postings).unwrap();
    let mut bytes = Vec::new();
    tree.serialize_tree(&mut bytes).unwrap();

    c.bench_function("serialize_10k", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(bytes.len());
            tree.serialize_tree(&mut out).unwrap();
            black_box(out)
        })
    });

    c.bench_function("deserialize_10k", |b| {
        b.iter(|| black_box(VectorTree::deserialize(&bytes, &vectors.writer).unwrap()))
    });
}

fn bench_session(c: &mut Criterion) {
    let words = random_words(2_000, 3);
    let docs: Vec<Document> = words
        .chunks(4)
        .map(|chunk| Document::new().with_field("body", FieldValue::Text(chunk.join(" "))))
        .collect();

    let mut group = c.benchmark_group("session");
    group.sample_size(10);

    group.bench_function("write_and_close_500_docs", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let factory = SessionFactory::new(Config::with_data_dir(dir.path())).unwrap();
            let mut session = factory.open_write_session(1).unwrap();
            session.write(&docs, &LatinTokenizer).unwrap();
            black_box(session.close().unwrap())
        })
    });

    for strategy in [LoadingStrategy::Mapped, LoadingStrategy::Deserialized] {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(dir.path());
        config.column_loading = strategy;
        let factory = SessionFactory::new(config).unwrap();
        let mut session = factory.open_write_session(1).unwrap();
        session.write(&docs, &LatinTokenizer).unwrap();
        session.close().unwrap();

        let reader = factory.read_session_factory(1).unwrap().open_default().unwrap();
        let queries = random_words(50, 5);
        group.bench_with_input(BenchmarkId::new("query", format!("{:?}", strategy)), &queries, |b, queries| {
            b.iter(|| {
                for query in queries {
                    black_box(reader.closest_term("body", query).unwrap());
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_closest_match, bench_codec, bench_session);
criterion_main!(benches);
