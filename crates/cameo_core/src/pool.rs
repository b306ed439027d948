//! Offscreen render target pool
//!
//! Targets are matched exactly by pixel size and alpha requirement. The free
//! list grows to the high-water mark of simultaneously used targets and is
//! never evicted while the device is alive.

use crate::backend::{RenderBackend, TargetId, TextureId};
use crate::geometry::PixelSize;
use crate::texture_cache::TextureCache;

/// Texture + framebuffer pair handed out by the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub target: TargetId,
    pub texture: TextureId,
    pub size: PixelSize,
    pub alpha: bool,
}

impl RenderTarget {
    /// Estimate memory usage in bytes (RGBA8 = 4 bytes per pixel)
    pub fn estimated_bytes(&self) -> u64 {
        self.size.area() * 4
    }
}

/// Statistics for pool usage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub dequeues: u64,
    pub enqueues: u64,
    /// Targets created because no free target matched
    pub allocations: u64,
    /// Targets currently on the free list
    pub free: usize,
    /// Targets dequeued and not yet returned
    pub in_use: usize,
    /// Estimated memory of every target the pool created (bytes)
    pub memory_bytes: u64,
}

impl PoolStats {
    /// Fraction of dequeues served from the free list (0.0 - 1.0)
    pub fn reuse_rate(&self) -> f64 {
        if self.dequeues == 0 {
            0.0
        } else {
            (self.dequeues - self.allocations) as f64 / self.dequeues as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct RenderTargetPool {
    free: Vec<RenderTarget>,
    in_use: usize,
    dequeues: u64,
    enqueues: u64,
    allocations: u64,
    memory_bytes: u64,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a target of exactly `size`, allocating one when none is free.
    /// Returns `None` when the backend cannot allocate.
    pub fn dequeue(
        &mut self,
        backend: &mut dyn RenderBackend,
        size: PixelSize,
        alpha: bool,
    ) -> Option<RenderTarget> {
        if let Some(index) = self
            .free
            .iter()
            .position(|t| t.size == size && t.alpha == alpha)
        {
            let target = self.free.swap_remove(index);
            self.dequeues += 1;
            self.in_use += 1;
            return Some(target);
        }

        match backend.create_render_target(size, alpha) {
            Ok(handles) => {
                let target = RenderTarget {
                    target: handles.target,
                    texture: handles.texture,
                    size,
                    alpha,
                };
                tracing::debug!(
                    "Allocated render target {}x{} (alpha: {}), {} free",
                    size.width,
                    size.height,
                    alpha,
                    self.free.len()
                );
                self.dequeues += 1;
                self.allocations += 1;
                self.in_use += 1;
                self.memory_bytes += target.estimated_bytes();
                Some(target)
            }
            Err(err) => {
                tracing::error!(
                    "Failed to allocate render target {}x{}: {}",
                    size.width,
                    size.height,
                    err
                );
                None
            }
        }
    }

    /// Return a target to the free list. Texture cache entries that borrowed
    /// its texture are dropped, since the next user will overwrite it.
    pub fn enqueue(&mut self, target: RenderTarget, textures: &mut TextureCache) {
        let invalidated = textures.invalidate_texture(target.texture);
        if invalidated > 0 {
            tracing::trace!("Invalidated {} texture alias(es) on enqueue", invalidated);
        }
        self.enqueues += 1;
        self.in_use = self.in_use.saturating_sub(1);
        self.free.push(target);
    }

    /// Destroy every free target
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for target in self.free.drain(..) {
            self.memory_bytes = self.memory_bytes.saturating_sub(target.estimated_bytes());
            backend.destroy_render_target(target.target);
        }
    }

    /// Drop every target without touching the device, after context loss
    pub fn forget(&mut self) {
        self.free.clear();
        self.in_use = 0;
        self.memory_bytes = 0;
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            dequeues: self.dequeues,
            enqueues: self.enqueues,
            allocations: self.allocations,
            free: self.free.len(),
            in_use: self.in_use,
            memory_bytes: self.memory_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;

    #[test]
    fn test_dequeue_reuses_exact_match() {
        let mut backend = HeadlessBackend::new();
        let mut textures = TextureCache::new();
        let mut pool = RenderTargetPool::new();

        let a = pool.dequeue(&mut backend, PixelSize::new(64, 64), true).unwrap();
        pool.enqueue(a, &mut textures);
        let b = pool.dequeue(&mut backend, PixelSize::new(64, 64), true).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.stats().allocations, 1);
        assert_eq!(pool.stats().reuse_rate(), 0.5);
    }

    #[test]
    fn test_alpha_and_size_must_match() {
        let mut backend = HeadlessBackend::new();
        let mut textures = TextureCache::new();
        let mut pool = RenderTargetPool::new();

        let a = pool.dequeue(&mut backend, PixelSize::new(64, 64), true).unwrap();
        pool.enqueue(a, &mut textures);
        let opaque = pool.dequeue(&mut backend, PixelSize::new(64, 64), false).unwrap();
        let larger = pool.dequeue(&mut backend, PixelSize::new(65, 64), true).unwrap();
        assert_ne!(opaque.target, a.target);
        assert_ne!(larger.target, a.target);
        assert_eq!(pool.stats().allocations, 3);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_clear_destroys_free_targets() {
        let mut backend = HeadlessBackend::new();
        let mut textures = TextureCache::new();
        let mut pool = RenderTargetPool::new();

        let a = pool.dequeue(&mut backend, PixelSize::new(8, 8), true).unwrap();
        assert_eq!(pool.stats().memory_bytes, 256);
        pool.enqueue(a, &mut textures);
        pool.clear(&mut backend);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(backend.live_targets(), 0);
        assert_eq!(pool.stats().memory_bytes, 0);
    }
}
