//! Benchmarks for GJK/EPA and the world tick.
//!
//! Run with: cargo bench -p sim-core

#![allow(missing_docs, clippy::unwrap_used, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_core::gjk_epa::gjk_intersection;
use sim_core::{
    Collider, ColliderKind, CollisionShape, Pose, RigidBody, SimulationConfig, Stepper, World,
    gjk_epa_contact,
};

/// Points on a sphere of the given radius, seeded so runs compare.
fn sphere_cloud(count: usize, radius: f64, seed: u64) -> Vec<Point3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let v = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            Point3::from(v.normalize() * radius)
        })
        .collect()
}

/// Benchmark box-box overlap at several depths.
fn bench_box_box(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_box");

    let a = Collider::fixed(CollisionShape::cube(0.5), Pose::identity());
    for offset in [0.2, 0.6, 0.95] {
        let rotation = UnitQuaternion::from_euler_angles(0.3, 0.2, 0.1);
        let b = Collider::fixed(
            CollisionShape::cube(0.5),
            Pose::from_position_rotation(Point3::new(offset, 0.1, 0.0), rotation),
        );

        group.bench_with_input(
            BenchmarkId::new("gjk_epa", format!("{offset}")),
            &(&a, &b),
            |bench, (a, b)| {
                bench.iter(|| black_box(gjk_epa_contact(a, b)));
            },
        );
    }

    // Early rejection
    let far = Collider::fixed(
        CollisionShape::cube(0.5),
        Pose::from_position(Point3::new(5.0, 0.0, 0.0)),
    );
    group.bench_function("gjk_separated", |bench| {
        bench.iter(|| black_box(gjk_intersection(&a, &far)));
    });

    group.finish();
}

/// Benchmark mesh-mesh overlap as the vertex count grows.
fn bench_mesh_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_mesh");

    for count in [16, 64, 256, 1024] {
        let a = Collider::fixed(
            CollisionShape::convex_mesh(sphere_cloud(count, 0.5, 1)),
            Pose::identity(),
        );
        let b = Collider::fixed(
            CollisionShape::convex_mesh(sphere_cloud(count, 0.5, 2)),
            Pose::from_position(Point3::new(0.7, 0.1, 0.0)),
        );

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("gjk_epa", format!("{count}_vertices")),
            &(&a, &b),
            |bench, (a, b)| {
                bench.iter(|| black_box(gjk_epa_contact(a, b)));
            },
        );
    }

    group.finish();
}

/// Benchmark full ticks of a stack of cubes on a floor.
fn bench_world_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_tick");
    group.sample_size(50);

    for cubes in [4, 16, 32] {
        let mut world = World::new(SimulationConfig::default()).unwrap();
        world
            .register_collider(Collider::fixed(
                CollisionShape::box_shape(Vector3::new(20.0, 20.0, 0.5)),
                Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
            ))
            .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..cubes {
            let position = Point3::new(
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
                0.5 + i as f64 * 0.3,
            );
            let shape = CollisionShape::cube(0.25);
            let body = world
                .register_body(RigidBody::at_rest(
                    Pose::from_position(position),
                    shape.default_mass_properties(1.0),
                ))
                .unwrap();
            world
                .register_collider(Collider::new(shape, ColliderKind::Dynamic).attached_to(body))
                .unwrap();
        }

        // Settle into contact before measuring
        let mut stepper = Stepper::new();
        stepper.run(&mut world, 60).unwrap();

        group.bench_function(BenchmarkId::new("cubes", cubes), |bench| {
            bench.iter(|| black_box(stepper.step(&mut world).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_box_box, bench_mesh_mesh, bench_world_tick);
criterion_main!(benches);
