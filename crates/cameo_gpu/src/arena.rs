//! Per-submission uniform and vertex storage
//!
//! Every draw gets its own uniform block, parameter block and vertices.
//! Blocks are appended to CPU-side chunks at the device's uniform offset
//! alignment and written to their GPU buffers right before the encoder is
//! submitted, so later draws never overwrite data an earlier draw in the same
//! submission reads.

const CHUNK_SIZE: u64 = 64 * 1024;

const fn align_to(v: u64, alignment: u64) -> u64 {
    (v + alignment - 1) / alignment * alignment
}

struct Chunk {
    buffer: wgpu::Buffer,
    data: Vec<u8>,
}

/// Location of one block
#[derive(Clone, Copy, Debug)]
pub(crate) struct Slot {
    pub chunk: usize,
    pub offset: u64,
    pub size: u64,
}

pub(crate) struct UniformArena {
    chunks: Vec<Chunk>,
    current: usize,
    alignment: u64,
}

impl UniformArena {
    pub fn new(alignment: u32) -> Self {
        Self {
            chunks: Vec::new(),
            current: 0,
            alignment: u64::from(alignment.max(4)),
        }
    }

    /// Append `bytes`, zero-padded to at least `min_size` bytes
    pub fn push(&mut self, device: &wgpu::Device, bytes: &[u8], min_size: u64) -> Slot {
        let size = align_to((bytes.len() as u64).max(min_size), 16);

        let fits = |chunk: &Chunk| {
            align_to(chunk.data.len() as u64, self.alignment) + size <= chunk.buffer.size()
        };
        while self.current < self.chunks.len() && !fits(&self.chunks[self.current]) {
            self.current += 1;
        }
        if self.current == self.chunks.len() {
            let capacity = CHUNK_SIZE.max(size);
            tracing::debug!("Allocating uniform arena chunk {} ({} bytes)", self.chunks.len(), capacity);
            self.chunks.push(Chunk {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Cameo Draw Arena"),
                    size: capacity,
                    usage: wgpu::BufferUsages::UNIFORM
                        | wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                data: Vec::with_capacity(capacity as usize),
            });
        }

        let chunk = &mut self.chunks[self.current];
        let offset = align_to(chunk.data.len() as u64, self.alignment);
        chunk.data.resize(offset as usize, 0);
        chunk.data.extend_from_slice(bytes);
        chunk.data.resize((offset + size) as usize, 0);
        Slot {
            chunk: self.current,
            offset,
            size,
        }
    }

    pub fn buffer(&self, slot: &Slot) -> &wgpu::Buffer {
        &self.chunks[slot.chunk].buffer
    }

    pub fn binding(&self, slot: &Slot) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: self.buffer(slot),
            offset: slot.offset,
            size: wgpu::BufferSize::new(slot.size),
        })
    }

    /// Write pending blocks to the GPU and start over
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        for chunk in &mut self.chunks {
            if !chunk.data.is_empty() {
                queue.write_buffer(&chunk.buffer, 0, &chunk.data);
                chunk.data.clear();
            }
        }
        self.current = 0;
    }

    /// Drop every buffer, after the device they belong to is gone
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.current = 0;
    }
}
