//! Headless sector generator: builds a world, flies the observer across a
//! sector boundary and reports what was planned, realized and drawn.
//!
//! Usage: cargo run --release --bin generate_sector -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>      World config JSON (default: built-in defaults)
//!   --blocks <PATH>      Block registry JSON (default: built-in blocks)
//!   --archetypes <PATH>  Archetype table JSON (default: built-in archetypes)
//!   --seed <SEED>        Override the world seed
//!   --steps <N>          Observer steps (default: 40)
//!   --step <METERS>      Distance per step (default: 64)
//!   --dump-config <PATH> Write the effective config and exit

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use asteria::core::logging;
use asteria::core::types::Result;
use asteria::generation::ArchetypeTable;
use asteria::math::Ray;
use asteria::sector::{DrawRecorder, MaterialHandle};
use asteria::voxel::{BlockRegistry, RecordingHooks};
use asteria::{World, WorldConfig};

fn main() {
    logging::init();
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = match parse_path_arg(&args, "--config") {
        Some(path) => WorldConfig::load(&path)?,
        None => WorldConfig::default(),
    };
    if let Some(seed) = parse_u64_arg(&args, "--seed") {
        config.generation.seed = seed;
    }
    if let Some(path) = parse_path_arg(&args, "--dump-config") {
        config.save(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    let registry = match parse_path_arg(&args, "--blocks") {
        Some(path) => BlockRegistry::load(&path)?,
        None => BlockRegistry::default(),
    };
    let archetypes = match parse_path_arg(&args, "--archetypes") {
        Some(path) => ArchetypeTable::load(&path)?,
        None => ArchetypeTable::default(),
    };
    archetypes.validate_blocks(&registry)?;
    let steps = parse_usize_arg(&args, "--steps").unwrap_or(40);
    let step = parse_f32_arg(&args, "--step").unwrap_or(64.0);

    println!("=== Asteria Sector Generator ===");
    println!("Seed:        {:#x}", config.generation.seed);
    println!("Sector size: {}", config.sector.size);
    println!("Archetypes:  {}", archetypes.len());
    println!();

    let size = config.sector.size;
    let started = Instant::now();
    let mut world = World::new(config, Arc::new(registry), Arc::new(archetypes));
    println!(
        "Planned sector {:?}: {} placements in {:.1} ms",
        world.sector().coord().0,
        world.sector().pending_count(),
        started.elapsed().as_secs_f64() * 1000.0
    );
    let histogram = world.sector().biome_field().histogram();
    println!("Biome cells: {:?}", histogram);
    println!();

    // Fly along +x through the middle of the first sector and beyond.
    let start = Vec3::new(size * 0.5, size * 0.5, size * 0.5);
    let mut recorder = DrawRecorder::default();
    let mut hooks = RecordingHooks::default();
    let mut totals = (0usize, 0usize, 0usize);
    for i in 0..steps {
        let observer = start + Vec3::X * step * i as f32;
        world.set_observer(observer);
        let report = world.update();
        totals.0 += report.realized;
        totals.1 += report.lod_applied;
        totals.2 += report.lod_dropped;
        if report.transitioned {
            println!(
                "step {:>3}: entered sector {:?} (prefetched: {})",
                i,
                world.sector().coord().0,
                report.prefetch_hit
            );
        }

        // Mine whatever lies straight ahead.
        let ray = Ray::new(observer, Vec3::X);
        let target = world.sector().raycast(&ray, step).and_then(|(sid, hit)| {
            let center = world.sector().structure(sid)?.voxel_center(hit.voxel);
            Some((sid, center, hit.normal.as_vec3()))
        });
        if let Some((sid, center, normal)) = target {
            world
                .sector_mut()
                .try_remove_block(sid, center, normal, true, &mut hooks);
        }

        recorder.clear();
        let view = world.view();
        world.render(&view, &mut recorder, MaterialHandle(0));
    }
    let applied = world.flush();

    println!();
    println!("Structures realized: {}", totals.0);
    println!("Live structures:     {}", world.sector().structure_count());
    println!("Pending placements:  {}", world.sector().pending_count());
    println!("Blocks mined:        {}", hooks.drops.len());
    println!("LOD meshes applied:  {} (+{} on flush), dropped: {}", totals.1, applied, totals.2);
    println!("Last frame:          {} draws, {} quads", recorder.draws.len(), recorder.total_quads());
    println!("Archived sectors:    {}", world.archived_sectors());
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_path_arg(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}
