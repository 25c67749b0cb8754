use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use geomip::core::Camera;
use geomip::terrain::stitch::{build_indices, index_capacity};
use geomip::terrain::{
    HeightMap, Landscape, LandscapeConfig, NeighborLevels, PatchDraw, PatchRenderer,
    PatchTemplate, TerrainGenerator, TerrainParams,
};

use glam::Vec3;

struct NullRenderer;

impl PatchRenderer for NullRenderer {
    fn draw_patch(&mut self, draw: &PatchDraw<'_>) {
        black_box(draw.triangle_count());
    }
}

fn heightmap(size: u32) -> Arc<HeightMap> {
    let generator = TerrainGenerator::new(TerrainParams::default());
    Arc::new(generator.generate(size).expect("generate"))
}

fn orbit_camera(landscape: &Landscape, angle: f32) -> Camera {
    let [sx, _, sz] = landscape.config().scale;
    let half = landscape.size_cells() as f32 * sx * 0.5;
    let center = Vec3::new(half, half, 0.0);
    let eye = center + Vec3::new(angle.cos() * half * 0.7, angle.sin() * half * 0.7, 300.0 * sz);
    Camera::look_at(eye, center, Vec3::Z).with_clip_planes(1.0, half * 4.0)
}

fn bench_landscape_build_256(c: &mut Criterion) {
    let hm = heightmap(256);

    c.bench_function("landscape_build_256", |b| {
        b.iter(|| {
            Landscape::new(LandscapeConfig::default(), black_box(hm.clone())).expect("landscape")
        });
    });
}

fn bench_clip_and_lod(c: &mut Criterion) {
    let config = LandscapeConfig { hm_tile: 4, ..Default::default() };
    let mut landscape = Landscape::new(config, heightmap(256)).expect("landscape");

    c.bench_function("clip_and_lod_1024", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame += 1;
            let camera = orbit_camera(&landscape, frame as f32 * 0.01);
            let stats = landscape.clip(&camera);
            landscape.set_mip_levels(&camera);
            black_box(stats)
        });
    });
}

fn bench_full_frame(c: &mut Criterion) {
    let config = LandscapeConfig { hm_tile: 2, ..Default::default() };
    let mut landscape = Landscape::new(config, heightmap(256)).expect("landscape");

    c.bench_function("full_frame_512", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame += 1;
            let camera = orbit_camera(&landscape, frame as f32 * 0.01);
            black_box(landscape.frame(&camera, &mut NullRenderer))
        });
    });
}

fn bench_stitched_indices(c: &mut Criterion) {
    let template = PatchTemplate::new(32);
    let mut out = vec![0u16; index_capacity(32, 0)];
    let neighbors = NeighborLevels::new(Some(2), Some(1), Some(3), Some(0));

    c.bench_function("stitched_indices_32", |b| {
        b.iter(|| build_indices(black_box(&template), 0, black_box(neighbors), &mut out));
    });

    c.bench_function("plain_indices_32", |b| {
        b.iter(|| build_indices(black_box(&template), 0, NeighborLevels::uniform(0), &mut out));
    });
}

criterion_group!(
    benches,
    bench_landscape_build_256,
    bench_clip_and_lod,
    bench_full_frame,
    bench_stitched_indices,
);
criterion_main!(benches);
