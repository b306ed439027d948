//! Timestamp-query timers
//!
//! A timer owns a two-entry timestamp set. The start and end stamps are
//! written into the frame encoder, resolved into a readback buffer when the
//! timer ends, and mapped after the encoder is submitted.

use std::sync::{Arc, Mutex};

use cameo_core::QueryStatus;

const RESULT_SIZE: u64 = 2 * std::mem::size_of::<u64>() as u64;

#[derive(Clone, Copy, Debug, PartialEq)]
enum MapState {
    Recording,
    /// Resolve recorded, waiting for submission
    Resolved,
    Mapping,
    Mapped,
    Done(QueryStatus),
}

pub(crate) struct TimestampTimer {
    set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    state: Arc<Mutex<MapState>>,
}

impl TimestampTimer {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            set: device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("Cameo Timer"),
                ty: wgpu::QueryType::Timestamp,
                count: 2,
            }),
            resolve: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cameo Timer Resolve"),
                size: RESULT_SIZE,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cameo Timer Readback"),
                size: RESULT_SIZE,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            state: Arc::new(Mutex::new(MapState::Recording)),
        }
    }

    fn state(&self) -> MapState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(MapState::Done(QueryStatus::Disjoint))
    }

    fn set_state(&self, state: MapState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }

    pub fn begin(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.write_timestamp(&self.set, 0);
    }

    pub fn end(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.write_timestamp(&self.set, 1);
        encoder.resolve_query_set(&self.set, 0..2, &self.resolve, 0);
        encoder.copy_buffer_to_buffer(&self.resolve, 0, &self.readback, 0, RESULT_SIZE);
        self.set_state(MapState::Resolved);
    }

    /// Start mapping once the resolve has been submitted
    pub fn after_submit(&self) {
        if self.state() != MapState::Resolved {
            return;
        }
        self.set_state(MapState::Mapping);
        let state = self.state.clone();
        self.readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                if let Ok(mut s) = state.lock() {
                    *s = if result.is_ok() {
                        MapState::Mapped
                    } else {
                        MapState::Done(QueryStatus::Disjoint)
                    };
                }
            });
    }

    pub fn status(&self, period_ns: f32) -> QueryStatus {
        match self.state() {
            MapState::Recording | MapState::Resolved | MapState::Mapping => QueryStatus::Pending,
            MapState::Done(status) => status,
            MapState::Mapped => {
                let [start, end]: [u64; 2] = {
                    let view = self.readback.slice(..).get_mapped_range();
                    bytemuck::pod_read_unaligned(&view[..RESULT_SIZE as usize])
                };
                self.readback.unmap();
                let status = if end < start {
                    QueryStatus::Disjoint
                } else {
                    QueryStatus::Ready(((end - start) as f64 * f64::from(period_ns)) as u64)
                };
                self.set_state(MapState::Done(status));
                status
            }
        }
    }
}
