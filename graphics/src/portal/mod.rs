//! Discovery of the views seen through portals.
//!
//! The cull kernel writes, for every view, the distance of each portal from
//! the view origin (`-1` when culled). After the frame is read back,
//! [`resolve_portal_views`] walks the portal graph depth first, nearest
//! portal first, and assigns a view id of the next frame to every portal
//! worth rendering. Nested portals are found by reading the distances the
//! matching sub-view produced in the frame just culled.
//!
//! The walk uses an explicit stack and a visited set of data views, so it
//! stops even when portals see each other in a cycle.

use std::collections::HashSet;

use umbra_core::math::Sphere;

use crate::MAX_VIEWS;
use crate::culling::{FrameRing, ViewFrame, ViewParams, partition};
use crate::material::SceneSurface;
use crate::types::GpuPortalSurface;

/// A portal surface of the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalSurface {
    /// Index of the surface in the scene list; also its GPU surface id.
    pub scene_index: usize,
    pub sphere: Sphere,
}

impl PortalSurface {
    pub fn surface_id(&self) -> u32 {
        self.scene_index as u32
    }

    /// GPU entry with the distance marked as culled.
    pub fn to_gpu(&self) -> GpuPortalSurface {
        GpuPortalSurface {
            origin: [self.sphere.center.x, self.sphere.center.y, self.sphere.center.z],
            radius: self.sphere.radius,
            surface_id: self.surface_id(),
            distance: -1.0,
            _pad: [0; 2],
        }
    }
}

/// Bounding spheres of the portal surfaces: centered on the average of the
/// portal points, reaching the farthest one. Portals without points fall
/// back to the surface bounds.
pub fn portal_bounding_spheres(scene: &[SceneSurface], portals: &[usize]) -> Vec<PortalSurface> {
    portals
        .iter()
        .filter_map(|&index| scene.get(index).map(|surface| (index, surface)))
        .map(|(scene_index, surface)| PortalSurface {
            scene_index,
            sphere: Sphere::from_points(&surface.portal_points).unwrap_or(surface.bounds),
        })
        .collect()
}

/// Decides which of the portals that survived GPU culling are rendered.
pub trait PortalVisibility {
    /// Whether no part of the portal is on screen from `view`.
    fn is_off_screen(&mut self, portal: &PortalSurface, view: &ViewParams) -> bool;

    /// Whether the portal is too far away to be rendered.
    fn is_out_of_range(&mut self, portal: &PortalSurface, distance: f32) -> bool;
}

/// Trusts the GPU frustum test and rejects portals beyond a fixed distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalRange {
    pub max_distance: f32,
}

impl PortalVisibility for PortalRange {
    fn is_off_screen(&mut self, _portal: &PortalSurface, _view: &ViewParams) -> bool {
        false
    }

    fn is_out_of_range(&mut self, _portal: &PortalSurface, distance: f32) -> bool {
        distance > self.max_distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Every visible portal got a view.
    Complete,
    /// The view budget ran out; remaining portals were dropped.
    Truncated,
}

/// A view of the next frame opened through a portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalView {
    pub view_id: u32,
    pub parent_view: u32,
    pub portal: PortalSurface,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalResolution {
    pub outcome: ResolveOutcome,
    /// Views in assignment order; ids are consecutive from 1.
    pub views: Vec<PortalView>,
}

/// One node of the walk: a view of the next frame whose portals are taken
/// from the distances `data_view` produced in the frame just culled.
struct Level {
    output_view: u32,
    data_view: u32,
    /// Portal indices with their distances, nearest first.
    candidates: Vec<(usize, f32)>,
    cursor: usize,
}

/// Assign views of the next frame to the portals seen from the current one.
///
/// `readback` holds every (frame, view) partition of the portal buffer.
pub fn resolve_portal_views(
    ring: &mut FrameRing,
    portals: &[PortalSurface],
    readback: &[GpuPortalSurface],
    visibility: &mut dyn PortalVisibility,
) -> PortalResolution {
    umbra_core::profile_function!();

    let frame = ring.current_frame();
    let data: [ViewFrame; MAX_VIEWS] = ring.current().views;
    let data_view_count = ring.current().view_count;

    let mut views = Vec::new();
    let next = ring.next_mut();
    // Links from an earlier walk must not outlive it.
    for view in &mut next.views {
        view.portal_view_count = 0;
        view.portal_surface_id = None;
    }

    let mut collect = |data_view: u32| -> Vec<(usize, f32)> {
        let base = partition(frame, data_view) * portals.len();
        let view = &data[data_view as usize].params;
        let mut candidates: Vec<_> = portals
            .iter()
            .enumerate()
            .filter_map(|(index, portal)| {
                let distance = readback.get(base + index)?.distance;
                if distance < 0.0
                    || visibility.is_off_screen(portal, view)
                    || visibility.is_out_of_range(portal, distance)
                {
                    return None;
                }
                Some((index, distance))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates
    };

    if data_view_count == 0 {
        return PortalResolution {
            outcome: ResolveOutcome::Complete,
            views,
        };
    }

    let mut visited = HashSet::from([0u32]);
    let mut stack = vec![Level {
        output_view: 0,
        data_view: 0,
        candidates: collect(0),
        cursor: 0,
    }];
    let mut assigned = 0u32;

    while let Some(level) = stack.last_mut() {
        let Some(&(index, distance)) = level.candidates.get(level.cursor) else {
            stack.pop();
            continue;
        };
        level.cursor += 1;

        let view_id = assigned + 1;
        if view_id as usize >= MAX_VIEWS {
            log::warn!(
                "Portal view budget of {MAX_VIEWS} exhausted, {} portal views assigned",
                views.len()
            );
            return PortalResolution {
                outcome: ResolveOutcome::Truncated,
                views,
            };
        }
        assigned = view_id;

        let portal = portals[index];
        let parent = &mut next.views[level.output_view as usize];
        parent.portal_views[parent.portal_view_count as usize] = view_id;
        parent.portal_view_count += 1;

        let child = &mut next.views[view_id as usize];
        child.portal_surface_id = Some(portal.surface_id());

        views.push(PortalView {
            view_id,
            parent_view: level.output_view,
            portal,
            distance,
        });

        // The sub-view that looked through this portal last frame holds the
        // distances of the portals behind it.
        let data_view = data[level.data_view as usize]
            .portal_views()
            .iter()
            .copied()
            .filter(|&v| v < data_view_count)
            .find(|&v| data[v as usize].portal_surface_id == Some(portal.surface_id()));

        if let Some(data_view) = data_view
            && visited.insert(data_view)
        {
            let candidates = collect(data_view);
            stack.push(Level {
                output_view: view_id,
                data_view,
                candidates,
                cursor: 0,
            });
        }
    }

    log::trace!("Resolved {} portal views", views.len());
    PortalResolution {
        outcome: ResolveOutcome::Complete,
        views,
    }
}
