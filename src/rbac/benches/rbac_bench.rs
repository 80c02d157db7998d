//! RBAC engine benchmarks
//!
//! Permission checks at the bottom of deep hierarchies, with and without the cache, and
//! the cost of a reparent that re-levels a subtree.

use cretoai_rbac::{
    NewRole, PermissionGrant, RbacConfig, RbacEngine, RequestContext, RoleId, Subject, MAX_DEPTH,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

/// A chain `depth` deep with `grants_per_role` grants on every level; returns the engine
/// and the deepest role
async fn build_chain(config: RbacConfig, depth: u32, grants_per_role: usize) -> (RbacEngine, RoleId) {
    let engine = RbacEngine::new(config).unwrap();
    let mut parent: Option<RoleId> = None;

    for level in 0..=depth {
        let mut input = NewRole::new(format!("level_{}", level), format!("Level {}", level));
        if let Some(p) = parent {
            input = input.with_parent(p);
        }
        let role = engine.create_role(input).await.unwrap();

        for i in 0..grants_per_role {
            let grant = if i % 5 == 0 {
                PermissionGrant::deny(role.id, format!("resource_{}", i), "delete")
            } else {
                PermissionGrant::allow(role.id, format!("resource_{}", i), "read")
            };
            engine.add_permission(grant).await.unwrap();
        }
        engine
            .add_permission(
                PermissionGrant::allow(role.id, "projects", "write")
                    .in_context("project", format!("p{}", level)),
            )
            .await
            .unwrap();

        parent = Some(role.id);
    }

    let root = engine.list_roles()[0].id;
    engine
        .add_permission(PermissionGrant::allow(root, "*", "*"))
        .await
        .unwrap();

    (engine, parent.unwrap())
}

fn bench_check_permission(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("check_permission");

    for depth in [1u32, 5, MAX_DEPTH] {
        group.bench_with_input(BenchmarkId::new("uncached_depth", depth), &depth, |b, &depth| {
            let config = RbacConfig {
                enable_cache: false,
                enable_metrics: false,
                ..Default::default()
            };
            let (engine, leaf) = rt.block_on(build_chain(config, depth, 20));
            let subject = Subject::Role(leaf);

            b.to_async(&rt).iter(|| async {
                let allowed = engine
                    .check_permission(black_box(&subject), "resource_3", "read", None)
                    .await
                    .unwrap();
                black_box(allowed);
            });
        });

        group.bench_with_input(BenchmarkId::new("cached_depth", depth), &depth, |b, &depth| {
            let (engine, leaf) = rt.block_on(build_chain(RbacConfig::default(), depth, 20));
            let subject = Subject::Role(leaf);

            b.to_async(&rt).iter(|| async {
                let allowed = engine
                    .check_permission(black_box(&subject), "resource_3", "read", None)
                    .await
                    .unwrap();
                black_box(allowed);
            });
        });
    }

    group.finish();
}

fn bench_context_check(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = RbacConfig {
        enable_cache: false,
        enable_metrics: false,
        ..Default::default()
    };
    let (engine, leaf) = rt.block_on(build_chain(config, MAX_DEPTH, 20));
    let subject = Subject::Role(leaf);
    let context = RequestContext::new("project", "p0");

    c.bench_function("check_permission_in_context", |b| {
        b.to_async(&rt).iter(|| async {
            let allowed = engine
                .check_permission(&subject, "projects", "write", Some(black_box(&context)))
                .await
                .unwrap();
            black_box(allowed);
        });
    });
}

fn bench_effective_permissions(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = RbacConfig {
        enable_cache: false,
        enable_metrics: false,
        ..Default::default()
    };
    let (engine, leaf) = rt.block_on(build_chain(config, MAX_DEPTH, 20));
    let subject = Subject::Role(leaf);

    c.bench_function("effective_permissions_depth_10", |b| {
        b.to_async(&rt).iter(|| async {
            let set = engine
                .get_effective_permissions(black_box(&subject), None)
                .await
                .unwrap();
            black_box(set);
        });
    });
}

fn bench_reparent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, _) = rt.block_on(build_chain(RbacConfig::default(), 6, 5));
    let (top, alternate) = rt.block_on(async {
        let top = engine.create_role(NewRole::new("top", "Top")).await.unwrap().id;
        let alternate = engine
            .create_role(NewRole::new("alternate", "Alternate"))
            .await
            .unwrap()
            .id;
        (top, alternate)
    });
    let subtree_root = engine.list_roles()[1].id;
    let mut flip = false;

    c.bench_function("reparent_subtree", |b| {
        b.iter(|| {
            flip = !flip;
            let parent = if flip { top } else { alternate };
            rt.block_on(engine.set_role_parent(black_box(subtree_root), Some(parent)))
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_check_permission,
    bench_context_check,
    bench_effective_permissions,
    bench_reparent
);
criterion_main!(benches);
