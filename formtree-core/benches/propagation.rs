//! Criterion micro-benchmarks for change propagation through a form tree.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use formtree_core::factory::{Factory, Template, TreeOptions};
use formtree_core::tree::{Group, GroupSnapshot};
use formtree_core::validation::rules::{min_length, required};

/// Build a form with one collection of `count` three-field elements.
fn make_form(factory: &Factory, count: usize) -> Group {
    let items: Vec<Group> = (0..count)
        .map(|i| {
            factory.group(
                Template::new()
                    .validated("name", format!("item {i}"), [required()])
                    .value("qty", i as u64)
                    .value("note", ""),
            )
        })
        .collect();

    factory.create_tree(
        Template::new()
            .validated("title", "order", [required(), min_length(3)])
            .groups("items", items),
        Some(Arc::new(|snapshot: Arc<GroupSnapshot>| {
            black_box(snapshot);
        })),
        TreeOptions::default(),
    )
}

/// Benchmark: Build a 1K-element form.
fn bench_build_1k(c: &mut Criterion) {
    let factory = Factory::new();
    c.bench_function("build_1k", |b| {
        b.iter(|| black_box(make_form(&factory, 1_000)));
    });
}

/// Benchmark: Edit one field of the middle element of a 1K collection and
/// propagate to the root.
fn bench_element_edit_1k(c: &mut Criterion) {
    let factory = Factory::new();
    let form = make_form(&factory, 1_000);
    let field = form.find("items.500.qty").unwrap();
    let control = field.as_control().unwrap();
    let mut n = 0u64;

    c.bench_function("element_edit_1k", |b| {
        b.iter(|| {
            n += 1;
            control.set_value(json!(n));
            black_box(form.valid());
        });
    });
}

/// Benchmark: Append to and pop from a 1K collection.
fn bench_append_pop_1k(c: &mut Criterion) {
    let factory = Factory::new();
    let form = make_form(&factory, 1_000);
    let items = form.control("items").unwrap();
    let extra = factory.group(Template::new().value("name", "extra"));

    c.bench_function("append_pop_1k", |b| {
        b.iter(|| {
            items.update_groups(|seq| seq.push(extra.clone())).unwrap();
            items.update_groups(|seq| seq.pop()).unwrap();
        });
    });
}

/// Benchmark: Patch a top-level field and read the plain value back.
fn bench_patch_and_build_1k(c: &mut Criterion) {
    let factory = Factory::new();
    let form = make_form(&factory, 1_000);
    let mut flip = false;

    c.bench_function("patch_and_build_1k", |b| {
        b.iter(|| {
            flip = !flip;
            form.patch_value(&json!({ "title": if flip { "order" } else { "offer" } }));
            black_box(form.build());
        });
    });
}

criterion_group!(
    benches,
    bench_build_1k,
    bench_element_edit_1k,
    bench_append_pop_1k,
    bench_patch_and_build_1k
);
criterion_main!(benches);
