//! Frames in flight and the views culled in each of them.

use umbra_core::math::{Frustum, Mat4, Vec3};

use crate::error::GraphicsError;
use crate::sync::Fence;
use crate::{MAX_FRAMES, MAX_VIEWS};

/// Index of the (frame, view) partition in every per-view GPU buffer.
pub fn partition(frame: usize, view: u32) -> usize {
    MAX_VIEWS * frame + view as usize
}

/// Camera of one view as the cull kernel sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub origin: Vec3,
    pub frustum: Frustum,
    /// World to view space.
    pub view_matrix: Mat4,
    pub projection: Mat4,
}

impl ViewParams {
    /// Derive the frustum from the camera matrices.
    pub fn from_camera(origin: Vec3, view_matrix: Mat4, projection: Mat4) -> Self {
        Self {
            origin,
            frustum: Frustum::from_view_projection(&(projection * view_matrix)),
            view_matrix,
            projection,
        }
    }
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            origin: Vec3::zeros(),
            frustum: Frustum::default(),
            view_matrix: Mat4::identity(),
            projection: Mat4::identity(),
        }
    }
}

/// One view of a frame and the portal views opened from it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewFrame {
    pub params: ViewParams,
    /// View ids reached through portals of this view, in discovery order.
    pub portal_views: [u32; MAX_VIEWS],
    pub portal_view_count: u32,
    /// Portal surface this view looks through; `None` for the root view.
    pub portal_surface_id: Option<u32>,
}

impl ViewFrame {
    pub fn portal_views(&self) -> &[u32] {
        &self.portal_views[..self.portal_view_count as usize]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub views: [ViewFrame; MAX_VIEWS],
    pub view_count: u32,
    /// Signaled when the GPU has finished the frame.
    pub fence: Option<Fence>,
}

impl Frame {
    pub fn active_views(&self) -> &[ViewFrame] {
        &self.views[..self.view_count as usize]
    }
}

/// Ring of `MAX_FRAMES` frames. Views are queued into the next frame while
/// the current one is still being drawn.
#[derive(Debug, Clone)]
pub struct FrameRing {
    frames: [Frame; MAX_FRAMES],
    current: usize,
    next: usize,
    /// Views captured when the PVS lock was engaged.
    locked_views: Option<[ViewParams; MAX_VIEWS]>,
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRing {
    pub fn new() -> Self {
        Self {
            frames: Default::default(),
            current: 0,
            next: 1 % MAX_FRAMES,
            locked_views: None,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn next_frame(&self) -> usize {
        self.next
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.current]
    }

    pub fn next(&self) -> &Frame {
        &self.frames[self.next]
    }

    pub fn next_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.next]
    }

    /// Forget the views queued for the next frame.
    pub fn start_frame(&mut self) {
        self.frames[self.next].view_count = 0;
    }

    /// Set view `view_id` of the next frame.
    pub fn queue_view(&mut self, view_id: u32, params: ViewParams) -> Result<(), GraphicsError> {
        if view_id as usize >= MAX_VIEWS {
            return Err(GraphicsError::InvalidParameter(format!(
                "view id {view_id} exceeds the {MAX_VIEWS} views of a frame"
            )));
        }
        let frame = &mut self.frames[self.next];
        let view = &mut frame.views[view_id as usize];
        // Portal links were set by the resolver and survive queueing.
        view.params = params;
        if view_id == 0 {
            view.portal_surface_id = None;
        }
        frame.view_count = frame.view_count.max(view_id + 1);
        Ok(())
    }

    /// Camera used to cull each view of the next frame.
    ///
    /// Engaging the lock captures the queued views; while it stays engaged the
    /// captured cameras replace the live ones.
    pub fn cull_views(&mut self, lock_pvs: bool) -> Vec<ViewParams> {
        let frame = &self.frames[self.next];
        if lock_pvs && self.locked_views.is_none() {
            let mut captured = [ViewParams::default(); MAX_VIEWS];
            for (slot, view) in captured.iter_mut().zip(&frame.views) {
                *slot = view.params;
            }
            log::debug!("PVS locked with {} views", frame.view_count);
            self.locked_views = Some(captured);
        } else if !lock_pvs && self.locked_views.take().is_some() {
            log::debug!("PVS unlocked");
        }

        match &self.locked_views {
            Some(locked) => locked[..frame.view_count as usize].to_vec(),
            None => frame.active_views().iter().map(|v| v.params).collect(),
        }
    }

    pub fn is_pvs_locked(&self) -> bool {
        self.locked_views.is_some()
    }

    /// Attach the fence of the frame just submitted and advance the ring.
    pub fn end_frame(&mut self, fence: Fence) {
        self.frames[self.next].fence = Some(fence);
        self.current = self.next;
        self.next = (self.next + 1) % MAX_FRAMES;
        log::trace!("Frame ring: current {} next {}", self.current, self.next);
    }

    /// Block until every frame in flight has completed.
    pub fn wait_idle(&self) {
        for fence in self.frames.iter().filter_map(|f| f.fence.as_ref()) {
            fence.wait();
        }
    }

    /// Back to the initial state, dropping fences and the PVS lock.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
