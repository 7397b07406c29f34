//! The world: one active sector around the observer.
//!
//! Everything here runs on the authority thread. Background work (neighbour
//! plans, downsampled meshes) only ever reaches the world through
//! [`World::update`], which checks that each result still answers a current
//! request before using it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use crate::core::jobs::JobQueue;
use crate::generation::archetype::ArchetypeTable;
use crate::persist::archive::SectorArchive;
use crate::sector::coord::SectorCoord;
use crate::sector::render::{ChunkRenderer, MaterialHandle, ViewState};
use crate::sector::sector::{Sector, SectorContext, SectorPlan};
use crate::voxel::block::BlockRegistry;
use crate::voxel::lod::LodBuilder;
use crate::world::config::WorldConfig;

/// What one [`World::update`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// The observer changed sector this tick
    pub transitioned: bool,
    /// The new sector came from a prefetched plan
    pub prefetch_hit: bool,
    /// Structures realized near the observer
    pub realized: usize,
    /// Sector whose plan is being prefetched
    pub prefetching: Option<SectorCoord>,
    pub lod_applied: usize,
    pub lod_dropped: usize,
}

pub struct World {
    config: WorldConfig,
    context: Arc<SectorContext>,
    observer: Vec3,
    sector: Sector,
    /// Edits of sectors the observer has left
    archives: HashMap<SectorCoord, SectorArchive>,
    plans: JobQueue<SectorPlan>,
    requested_plan: Option<SectorCoord>,
    ready_plan: Option<SectorPlan>,
    lod_builder: LodBuilder,
}

impl World {
    /// Build a world with the observer at the origin.
    ///
    /// Archetypes that fill with unregistered blocks are logged here; their
    /// placements are dropped when realized.
    pub fn new(config: WorldConfig, registry: Arc<BlockRegistry>, archetypes: Arc<ArchetypeTable>) -> Self {
        if let Err(e) = archetypes.validate_blocks(&registry) {
            log::error!("{}", e);
        }
        let context = Arc::new(SectorContext {
            generation: config.generation.clone(),
            sector: config.sector.clone(),
            structure: config.structure.clone(),
            lod: config.lod.clone(),
            octree: config.octree,
            registry: Arc::clone(&registry),
            archetypes,
        });
        let observer = Vec3::ZERO;
        let sector = Sector::new(
            SectorCoord::from_world(observer, config.sector.size),
            Arc::clone(&context),
        );
        log::info!(
            "world seed {:#x}, starting in sector {:?}",
            config.generation.seed,
            sector.coord().0
        );

        Self {
            config,
            context,
            observer,
            sector,
            archives: HashMap::new(),
            plans: JobQueue::new(),
            requested_plan: None,
            ready_plan: None,
            lod_builder: LodBuilder::new(registry),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn observer(&self) -> Vec3 {
        self.observer
    }

    /// Move the observer. Takes effect on the next [`World::update`].
    pub fn set_observer(&mut self, position: Vec3) {
        self.observer = position;
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    /// Gameplay edits go through the active sector.
    pub fn sector_mut(&mut self) -> &mut Sector {
        &mut self.sector
    }

    pub fn archive(&self, coord: SectorCoord) -> Option<&SectorArchive> {
        self.archives.get(&coord)
    }

    pub fn archived_sectors(&self) -> usize {
        self.archives.len()
    }

    pub fn ready_plan_coord(&self) -> Option<SectorCoord> {
        self.ready_plan.as_ref().map(|p| p.coord)
    }

    /// View from the observer with the configured view distance.
    pub fn view(&self) -> ViewState {
        ViewState::new(self.observer, self.config.render.view_distance)
    }

    /// One authority-thread tick.
    pub fn update(&mut self) -> UpdateReport {
        let mut report = UpdateReport::default();
        for plan in self.plans.drain() {
            self.accept_plan(plan);
        }

        let size = self.config.sector.size;
        let coord = SectorCoord::from_world(self.observer, size);
        if coord != self.sector.coord() {
            report.prefetch_hit = self.transition(coord);
            report.transitioned = true;
        }

        report.prefetching = self.prefetch();
        report.realized = self.sector.update(self.observer);

        for result in self.lod_builder.drain() {
            if self.sector.apply_lod_result(result) {
                report.lod_applied += 1;
            } else {
                report.lod_dropped += 1;
            }
        }
        report
    }

    /// Draw the active sector. Returns the number of chunk draws.
    pub fn render(&mut self, view: &ViewState, renderer: &mut dyn ChunkRenderer, material: MaterialHandle) -> usize {
        let lighting = self.config.render.lighting_level();
        self.sector
            .render(view, lighting, &mut self.lod_builder, renderer, material)
    }

    /// Block until all background work has finished and apply what is still
    /// wanted. Returns the number of LOD meshes applied.
    pub fn flush(&mut self) -> usize {
        while let Some(plan) = self.plans.wait_one() {
            self.accept_plan(plan);
        }
        let mut applied = 0;
        while let Some(result) = self.lod_builder.wait_one() {
            if self.sector.apply_lod_result(result) {
                applied += 1;
            }
        }
        applied
    }

    fn accept_plan(&mut self, plan: SectorPlan) {
        if self.requested_plan == Some(plan.coord) {
            log::debug!("plan for sector {:?} is ready", plan.coord.0);
            self.ready_plan = Some(plan);
        } else {
            log::debug!("dropping stale plan for sector {:?}", plan.coord.0);
        }
    }

    /// Start planning the sector the observer is heading into.
    fn prefetch(&mut self) -> Option<SectorCoord> {
        let sector = &self.config.sector;
        let next = self
            .sector
            .coord()
            .approaching(self.observer, sector.size, sector.prefetch_margin)?;
        let already = self.requested_plan == Some(next) || self.ready_plan_coord() == Some(next);
        if !already {
            let context = Arc::clone(&self.context);
            self.plans.submit(move || {
                SectorPlan::generate(next, &context.generation, &context.sector, &context.archetypes)
            });
            self.requested_plan = Some(next);
            log::debug!("prefetching sector {:?}", next.0);
        }
        Some(next)
    }

    /// Swap the active sector. Blocks for the whole swap; returns whether a
    /// prefetched plan was used.
    fn transition(&mut self, coord: SectorCoord) -> bool {
        let started = Instant::now();
        let previous = self.sector.coord();
        match self.sector.archive() {
            Ok(archive) if archive.is_empty() => {
                self.archives.remove(&previous);
            }
            Ok(archive) => {
                log::debug!(
                    "archived sector {:?}: {} structures, {} bytes",
                    previous.0,
                    archive.structure_count(),
                    archive.byte_size()
                );
                self.archives.insert(previous, archive);
            }
            Err(e) => log::error!("failed to archive sector {:?}: {}", previous.0, e),
        }

        let (plan, prefetched) = match self.ready_plan.take() {
            Some(plan) if plan.coord == coord => (plan, true),
            _ => {
                let ctx = &self.context;
                let plan = SectorPlan::generate(coord, &ctx.generation, &ctx.sector, &ctx.archetypes);
                (plan, false)
            }
        };
        self.requested_plan = None;

        let mut sector = Sector::from_plan(plan, Arc::clone(&self.context));
        if let Some(archive) = self.archives.get(&coord) {
            if let Err(e) = sector.restore(archive) {
                log::error!("failed to restore sector {:?}: {}", coord.0, e);
            }
        }
        self.sector = sector;
        // Results still in flight refer to the old sector's handles.
        self.lod_builder = LodBuilder::new(Arc::clone(&self.context.registry));

        log::info!(
            "entered sector {:?} from {:?} in {:.1} ms ({} placements, prefetched: {})",
            coord.0,
            previous.0,
            started.elapsed().as_secs_f64() * 1000.0,
            self.sector.pending_count(),
            prefetched
        );
        prefetched
    }
}
