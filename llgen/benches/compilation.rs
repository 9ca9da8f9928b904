use criterion::{black_box, criterion_group, criterion_main, Criterion};
use llgen::Compiler;

const PROGRAM: &str = r#"
struct Point { x: i64; y: i64 }

extern puts(s: str): i32;

function dot(a: Point*, b: Point*): i64 {
    return a->x * b->x + a->y * b->y;
}

function sum(n: i64): i64 {
    let total: i64 = 0;
    for (let i: i64 = 0; i < n; i = i + 1) {
        if (i > 10) { total = total + i; } else { total = total - 1; }
    }
    return total;
}

function main(): i64 {
    let p: Point = Point { x: 3, y: 4 };
    puts("hello");
    return dot(&p, &p) + sum(100);
}
"#;

fn compile_benchmark(c: &mut Criterion) {
    let compiler = Compiler::new();
    c.bench_function("verify_and_generate", |b| {
        b.iter(|| compiler.compile_source(black_box(PROGRAM), "bench.ll"))
    });
}

criterion_group!(benches, compile_benchmark);
criterion_main!(benches);
