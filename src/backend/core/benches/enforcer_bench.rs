//! Enforcer benchmarks. Run with: cargo bench --bench enforcer_bench
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use carehub_core::policy::{IdentityId, InMemoryPolicyStore, PolicyFact, TenantId};
use carehub_core::rbac::{Enforcer, PredefinedRole};

/// `members` identities with a direct role each, plus a role chain `depth` long in every tenant.
fn populated(tenants: usize, members: usize, depth: usize) -> Enforcer {
    let mut facts = Vec::new();
    for t in 0..tenants {
        let tenant = format!("provider-{t}");
        for m in 0..members { facts.push(PolicyFact::grouping(format!("user-{m}"), "level-0", &tenant)); }
        for d in 0..depth { facts.push(PolicyFact::grouping(format!("level-{d}"), format!("level-{}", d + 1), &tenant)); }
        facts.push(PolicyFact::grouping(format!("level-{depth}"), "administrator", &tenant));
    }
    Enforcer::new(Arc::new(InMemoryPolicyStore::with_facts(facts)), PredefinedRole::default_capabilities()).with_max_depth(depth + 2)
}

fn bench_roles_of_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("enforcer_roles_of_depth");
    group.measurement_time(Duration::from_secs(5));
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (user, tenant) = (IdentityId::new("user-0"), TenantId::new("provider-0"));
    for depth in [0, 2, 4, 8] {
        let enforcer = populated(1, 10, depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| { rt.block_on(async { black_box(enforcer.roles_of(&user, &tenant).await.unwrap()); }); });
        });
    }
    group.finish();
}

fn bench_check_store_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("enforcer_check_store_size");
    group.measurement_time(Duration::from_secs(5));
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (user, tenant) = (IdentityId::new("user-0"), TenantId::new("provider-0"));
    for tenants in [1, 10, 100] {
        let enforcer = populated(tenants, 50, 2);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(tenants), &tenants, |b, _| {
            b.iter(|| { rt.block_on(async { black_box(enforcer.allowed(&user, &tenant, "patient", "read").await.unwrap()); }); });
        });
    }
    group.finish();
}

fn bench_check_denied(c: &mut Criterion) {
    let mut group = c.benchmark_group("enforcer_check_denied");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let enforcer = populated(10, 50, 2);
    let (stranger, tenant) = (IdentityId::new("stranger"), TenantId::new("provider-0"));
    group.bench_function("no_roles", |b| { b.iter(|| { rt.block_on(async { black_box(enforcer.allowed(&stranger, &tenant, "invoice", "delete").await.unwrap()); }); }); });
    group.finish();
}

criterion_group!(benches, bench_roles_of_depth, bench_check_store_size, bench_check_denied);
criterion_main!(benches);
