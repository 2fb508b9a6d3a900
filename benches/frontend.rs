mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pcc::backend::Backend;
use pcc::codegen::generate;
use pcc::{lexer, parser};

fn bench_frontend(c: &mut Criterion) {
    for (label, path) in common::workloads() {
        let source = common::load_source(&path);
        let tokens = lexer::tokenize(&source).expect("tokenize");
        let module = parser::parse_tokens(tokens.clone()).expect("parse");

        c.bench_function(&format!("frontend_tokenize_{label}"), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source)).expect("tokenize");
                black_box(out);
            })
        });

        c.bench_function(&format!("frontend_parse_only_{label}"), |b| {
            b.iter(|| {
                let out = parser::parse_tokens(black_box(tokens.clone())).expect("parse");
                black_box(out);
            })
        });

        for backend in Backend::ALL {
            c.bench_function(&format!("codegen_{backend}_{label}"), |b| {
                b.iter(|| {
                    let out = generate(black_box(&module), backend).expect("generate");
                    black_box(out);
                })
            });
        }
    }
}

criterion_group!(benches, bench_frontend);
criterion_main!(benches);
