//! Establish event links and placement conditions from geometry overlap.
//!
//! Candidate pairs are found in parallel over a read-only registry, then
//! written one by one through the registry so every link passes the same
//! checks as a hand-entered one.

use mvgrid_core::{
    EventLink, EventRef, GeoLayer, Geometry, GridRegistry, GridResult, LayerRef,
    PlacementCondition, SharedRegistry, SpatialOverlap, SubsectionId,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Only link subsections already in service on the event's last day.
    pub require_temporal_overlap: bool,
    /// Also derive placement conditions from static layers.
    pub link_layers: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            require_temporal_overlap: true,
            link_layers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub events_scanned: usize,
    pub event_links_added: usize,
    /// Spatial hits dropped because the subsection was not yet in service.
    pub not_in_service: usize,
    pub layers_scanned: usize,
    pub placements_added: usize,
}

impl std::fmt::Display for LinkReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} event links from {} events ({} outside service life), {} placement conditions from {} layers",
            self.event_links_added,
            self.events_scanned,
            self.not_in_service,
            self.placements_added,
            self.layers_scanned
        )
    }
}

fn lined_subsections(registry: &GridRegistry) -> Vec<(SubsectionId, &Geometry)> {
    registry
        .subsections()
        .filter_map(|(_, s)| s.geometry.as_ref().map(|g| (s.id, g)))
        .collect()
}

/// Pairs (subsection, event) that intersect and are not linked yet, plus the
/// number of spatial hits rejected by the service-life check.
pub fn event_candidates(
    registry: &GridRegistry,
    overlap: &dyn SpatialOverlap,
    options: &LinkOptions,
) -> GridResult<(Vec<(SubsectionId, EventRef)>, usize)> {
    let subsections = lined_subsections(registry);
    let per_event: Vec<(Vec<(SubsectionId, EventRef)>, usize)> = registry
        .events()
        .collect::<Vec<_>>()
        .par_iter()
        .filter_map(|event| event.geometry().map(|area| (*event, area)))
        .map(|(event, area)| -> GridResult<(Vec<_>, usize)> {
            let key = event.event_ref();
            let end = event.window().end();
            let mut hits = Vec::new();
            let mut skipped = 0;
            for (id, line) in &subsections {
                if registry.has_event_link(*id, key) || !overlap.intersects(area, line)? {
                    continue;
                }
                if options.require_temporal_overlap && !registry.in_service_on(*id, end)? {
                    skipped += 1;
                    continue;
                }
                hits.push((*id, key));
            }
            Ok((hits, skipped))
        })
        .collect::<GridResult<_>>()?;

    let skipped: usize = per_event.iter().map(|(_, s)| s).sum();
    let pairs = per_event.into_iter().flat_map(|(hits, _)| hits).collect();
    Ok((pairs, skipped))
}

/// Pairs (subsection, layer) that intersect and have no placement condition.
pub fn layer_candidates(
    registry: &GridRegistry,
    overlap: &dyn SpatialOverlap,
) -> GridResult<Vec<(SubsectionId, LayerRef)>> {
    let subsections = lined_subsections(registry);
    let layers: Vec<&GeoLayer> = registry.layers().collect();
    let per_layer: Vec<Vec<(SubsectionId, LayerRef)>> = layers
        .par_iter()
        .filter_map(|layer| layer.geometry.as_ref().map(|g| (layer.layer_ref(), g)))
        .map(|(key, shape)| -> GridResult<Vec<_>> {
            let mut hits = Vec::new();
            for (id, line) in &subsections {
                if !registry.has_placement(*id, key) && overlap.intersects(shape, line)? {
                    hits.push((*id, key));
                }
            }
            Ok(hits)
        })
        .collect::<GridResult<_>>()?;
    Ok(per_layer.into_iter().flatten().collect())
}

/// Link every event and (optionally) static layer to the subsections it
/// overlaps. Running it twice adds nothing the second time.
pub fn link_overlaps(
    registry: &mut GridRegistry,
    overlap: &dyn SpatialOverlap,
    options: &LinkOptions,
) -> GridResult<LinkReport> {
    let mut report = LinkReport {
        events_scanned: registry.events().count(),
        ..LinkReport::default()
    };

    let (events, skipped) = event_candidates(registry, overlap, options)?;
    report.not_in_service = skipped;
    for (subsection, event) in events {
        let id = registry.next_event_link_id();
        registry.link_event(EventLink::new(id, subsection, event))?;
        report.event_links_added += 1;
    }

    if options.link_layers {
        report.layers_scanned = registry.layers().count();
        for (subsection, layer) in layer_candidates(registry, overlap)? {
            let id = registry.next_placement_condition_id();
            registry.add_placement_condition(PlacementCondition::new(id, subsection, layer))?;
            report.placements_added += 1;
        }
    }

    debug!(
        "overlap linking: {} candidate links, {} placements",
        report.event_links_added, report.placements_added
    );
    info!("{}", report);
    Ok(report)
}

/// [`link_overlaps`] as one all-or-nothing transaction.
pub fn link_shared(
    shared: &SharedRegistry,
    overlap: &dyn SpatialOverlap,
    options: &LinkOptions,
) -> GridResult<LinkReport> {
    shared.transaction(|grid| link_overlaps(grid, overlap, options))
}
