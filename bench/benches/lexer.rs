use criterion::{criterion_group, criterion_main, Criterion};
use glos::{lexer, token::TokenKind};
use std::hint::black_box;

static INPUTS: [&str; 3] = [
    include_str!("../../demos/fib.glos"),
    include_str!("../../demos/shadowing.glos"),
    include_str!("../../demos/apply.glos"),
];

fn lexer(input: &str) {
    let mut i = 0;
    for token in lexer::Lexer::new(input) {
        let token = token.unwrap();
        if matches!(token.kind, TokenKind::Eof) {
            break;
        }
        i += 1;
    }
    black_box(i);
}

fn criterion_benchmark(c: &mut Criterion) {
    let input = INPUTS.concat();
    c.bench_function("lexer", |b| {
        b.iter(|| {
            black_box(lexer(black_box(&input)));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
