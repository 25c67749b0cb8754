//! Terrain flythrough - drives a landscape along an orbit and reports
//! per-frame culling, LOD and cache statistics.
//!
//! Usage: cargo run --release --bin terrain_flythrough -- [OPTIONS]
//!
//! Options:
//!   --heightmap <PNG>  8-bit grayscale height map (default: generated)
//!   --size <CELLS>     Generated height map size (default: 256)
//!   --seed <SEED>      Generator seed (default: 12345)
//!   --config <JSON>    Landscape configuration (default: built-in)
//!   --save-config <JSON>  Write the configuration in use and continue
//!   --frames <N>       Frames to render (default: 360)
//!   --occlusion <DIR>  Enable horizon culling, caching `Height<N>.vis` in DIR
//!   --force-level <L>  Pin every patch to mip level L

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use geomip::core::{logging, Camera};
use geomip::terrain::{
    HeightMap, Landscape, LandscapeConfig, OcclusionConfig, PatchDraw, PatchRenderer,
    TerrainGenerator, TerrainParams,
};

/// Stand-in for a GPU backend: checks and counts what it is handed
#[derive(Default)]
struct CountingRenderer {
    draws: u64,
    triangles: u64,
    vertices: u64,
    levels: [u64; 8],
}

impl PatchRenderer for CountingRenderer {
    fn draw_patch(&mut self, draw: &PatchDraw<'_>) {
        self.draws += 1;
        self.triangles += draw.triangle_count() as u64;
        self.vertices += draw.vertices.len() as u64;
        if let Some(count) = self.levels.get_mut(draw.level as usize) {
            *count += 1;
        }
    }
}

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let heightmap_path = parse_str_arg(&args, "--heightmap").map(PathBuf::from);
    let size = parse_u32_arg(&args, "--size").unwrap_or(256);
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let config_path = parse_str_arg(&args, "--config").map(PathBuf::from);
    let save_config = parse_str_arg(&args, "--save-config").map(PathBuf::from);
    let frames = parse_u32_arg(&args, "--frames").unwrap_or(360);
    let occlusion_dir = parse_str_arg(&args, "--occlusion").map(PathBuf::from);
    let force_level = parse_u32_arg(&args, "--force-level");

    let heightmap = match &heightmap_path {
        Some(path) => HeightMap::from_image(path),
        None => {
            let params = TerrainParams { seed, ..Default::default() };
            TerrainGenerator::new(params).generate(size)
        }
    };
    let heightmap = match heightmap {
        Ok(hm) => Arc::new(hm),
        Err(e) => {
            log::error!("Failed to prepare height map: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = match &config_path {
        Some(path) => match LandscapeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => LandscapeConfig::default(),
    };
    if let Some(dir) = occlusion_dir {
        config.occlusion = OcclusionConfig { cache_dir: Some(dir), ..Default::default() };
    }
    if let Some(path) = &save_config {
        if let Err(e) = config.save(path) {
            log::warn!("Could not save configuration to {}: {}", path.display(), e);
        }
    }

    println!("=== Geomip Terrain Flythrough ===");
    println!("Height map: {}x{}", heightmap.size(), heightmap.size());
    println!("Patch size: {}, tiling: {}", config.patch_size, config.hm_tile);
    println!("Occlusion:  {}", if config.occlusion.is_enabled() { "on" } else { "off" });
    println!("Frames:     {}", frames);
    println!();

    let mut landscape = match Landscape::new(config.clone(), heightmap) {
        Ok(landscape) => landscape,
        Err(e) => {
            log::error!("Failed to build landscape: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(level) = force_level {
        landscape.force_mip_level(Some(level.min(u8::MAX as u32) as u8));
    }

    let [sx, sy, sz] = config.scale;
    let extent = Vec3::new(
        landscape.size_cells() as f32 * sx,
        landscape.size_cells() as f32 * sy,
        0.0,
    );
    let center = extent * 0.5;
    let radius = extent.x.min(extent.y) * 0.35;
    let altitude = 40.0 * sz;
    let eye_box = Vec3::splat(sx * 0.5);

    let mut camera = Camera::new(center, 60.0, 16.0 / 9.0).with_clip_planes(1.0, extent.x.max(extent.y));
    landscape.set_screen_height(1080);

    let mut renderer = CountingRenderer::default();
    let mut eye = center + Vec3::new(radius, 0.0, 255.0 * sz);
    let mut occluded = 0u64;
    let mut skipped = 0u64;
    let mut thrashed_frames = 0u32;
    let start = Instant::now();

    for frame in 0..frames {
        let angle = frame as f32 / frames.max(1) as f32 * std::f32::consts::TAU;
        let ground = landscape
            .height_at(center.x + radius * angle.cos(), center.y + radius * angle.sin())
            .unwrap_or(0.0);
        let target = Vec3::new(
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
            ground + altitude,
        );
        // follow the orbit without passing through hills
        eye = landscape.clip_move(eye, target, eye_box);

        camera.position = eye;
        let look = center + Vec3::new(0.0, 0.0, ground);
        camera.point_at(look, Vec3::Z);

        let stats = landscape.frame(&camera, &mut renderer);
        occluded += stats.occluded as u64;
        skipped += stats.skipped as u64;
        if stats.vertex_cache_thrashed || stats.index_cache_thrashed {
            thrashed_frames += 1;
        }

        if frame % 60 == 0 {
            log::info!(
                "Frame {}: {} patches, {} occluded, {} triangles",
                frame,
                stats.visible,
                stats.occluded,
                stats.triangles
            );
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let (vertex_stats, index_stats) = landscape.cache_stats();

    println!();
    println!("=== Summary ===");
    println!(
        "{} frames in {:.2}s ({:.1} fps)",
        frames,
        elapsed,
        frames as f64 / elapsed.max(1e-9)
    );
    println!(
        "Patches drawn: {}, occluded: {}, skipped: {}",
        renderer.draws, occluded, skipped
    );
    println!(
        "Triangles: {} ({:.0}/frame), vertices: {}",
        renderer.triangles,
        renderer.triangles as f64 / frames.max(1) as f64,
        renderer.vertices
    );
    for (level, count) in renderer.levels.iter().enumerate().filter(|(_, c)| **c > 0) {
        println!("  level {}: {} draws", level, count);
    }
    println!(
        "Vertex cache: {} allocations, {} evictions, {} wraps",
        vertex_stats.allocations, vertex_stats.evictions, vertex_stats.wraps
    );
    println!(
        "Index cache:  {} allocations, {} evictions, {} wraps",
        index_stats.allocations, index_stats.evictions, index_stats.wraps
    );
    if thrashed_frames > 0 {
        println!("Caches thrashed in {} frames", thrashed_frames);
    }
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
