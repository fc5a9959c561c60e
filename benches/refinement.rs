// benches/refinement.rs
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cpso_scrape::{Alphabet, Limits, PostalCode, Query, QueryResult, Refiner};

/// Every level-1 code under a few hundred FSAs, all censored.
fn censored_round() -> Vec<QueryResult> {
    let letters = "ABCEGHJKLMNPRSTVXY";
    let alphabet = Alphabet::default();
    let mut out = Vec::new();
    for a in letters.chars().take(6) {
        for d in '0'..='9' {
            for b in letters.chars() {
                let Ok(root) = PostalCode::make_root(&format!("{a}{d}{b}")) else { continue };
                for &c in alphabet.at(1) {
                    let code = root.refine(c).unwrap();
                    out.push(QueryResult::new(Query::new(code, Default::default(), None), -1, Vec::new()));
                }
            }
        }
    }
    out
}

fn bench_next_generation(c: &mut Criterion) {
    let round = censored_round();
    let refiner = Refiner::new(Limits::default(), Alphabet::default());

    c.bench_function("next_generation_censored_round", |b| {
        b.iter(|| {
            let next = refiner.generate_next_generation(black_box(&round).iter()).unwrap();
            black_box(next.queries.len())
        })
    });
}

criterion_group!(benches, bench_next_generation);
criterion_main!(benches);
