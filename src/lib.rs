//! Device-parallel LSD radix sort, exclusive scan and histogram primitives
//! for `u32` keys on wgpu compute devices.
//!
//! ```no_run
//! let ctx = gpu_radix::GpuContext::new_blocking()?;
//! let mut keys = vec![5u32, 3, 5, 1, 3, 2];
//! gpu_radix::sort(&ctx, &mut keys)?;
//! assert_eq!(keys, [1, 2, 3, 3, 5, 5]);
//! # Ok::<(), gpu_radix::SortError>(())
//! ```

use std::mem;

use bytemuck::Pod;
use wgpu::util::DeviceExt;

pub mod bitonic;
pub mod context;
pub mod error;
pub mod histogram;
pub mod host;
pub mod pipeline;
pub mod radix_sort;
pub mod rank;
pub mod scan;
pub mod scatter;
pub mod value_histogram;

pub use context::{ContextConfig, GpuContext};
pub use error::{Result, SortError};
pub use radix_sort::{sort, KeyBuffer, PassState, RadixSorter, SortConfig};
pub use rank::RankStrategy;
pub use scan::exclusive_scan;
pub use value_histogram::histogram;

/// Width of a key in bits.
pub const KEY_BITS: u32 = 32;

/// Bits per digit examined in one pass.
pub const RADIX_BITS: u32 = 8;

/// Number of buckets per pass.
pub const RADIX: u32 = 1 << RADIX_BITS;

pub const NUM_PASSES: u32 = KEY_BITS / RADIX_BITS;

/// Lanes per work-group, shared by every kernel.
pub const GROUP_WIDTH: u32 = 256;

/// 32-bit words in one bucket's rank bitmask.
pub const MASK_WORDS: u32 = GROUP_WIDTH / 32;

const _: () = assert!(KEY_BITS % RADIX_BITS == 0);
const _: () = assert!(GROUP_WIDTH % 32 == 0);
// Wider groups would make ballot ranks collide.
const _: () = assert!(GROUP_WIDTH <= 32 * MASK_WORDS);

///////////////////////////////////////////////////////////////////////////////////////

/// Buffer.
pub struct Buffer {
    pub buffer: wgpu::Buffer,
    pub capacity: usize,
    pub capacity_used: Option<usize>,
    pub label: Option<String>,
}

impl Buffer {
    pub fn create_buffer_from_data<T: Pod>(
        device: &wgpu::Device,
        t: &[T],
        usage: wgpu::BufferUsages,
        label: Option<String>,
    ) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: label.as_deref(),
            contents: bytemuck::cast_slice(t),
            usage,
        });
        let capacity = mem::size_of::<T>() * t.len();
        let capacity_used = Some(capacity);
        Self {
            buffer,
            capacity,
            capacity_used,
            label,
        }
    }

    pub fn create_buffer(
        device: &wgpu::Device,
        capacity: u64,
        usage: wgpu::BufferUsages,
        label: Option<&str>,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size: capacity,
            usage,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity: capacity as usize,
            capacity_used: None,
            label: label.map(String::from),
        }
    }

    /// Usage of every buffer the kernels read or write.
    pub fn storage_usage() -> wgpu::BufferUsages {
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
    }

    /// Method for copying the content of the buffer into a vector.
    pub async fn to_vec<T: Pod>(&self, ctx: &GpuContext, whole_buffer: bool) -> Result<Vec<T>> {
        let size = match whole_buffer {
            true => self.capacity,
            false => self.capacity_used.ok_or_else(|| {
                SortError::precondition(
                    "whole_buffer",
                    "capacity_used is None; define it or read the whole buffer",
                )
            })?,
        };
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging buffer"),
            size: size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging_buffer, 0, size as wgpu::BufferAddress);
        ctx.submit(encoder);

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = ctx.device.poll(wgpu::Maintain::Wait);

        receiver
            .await
            .map_err(|_| SortError::Execution("map_async callback was dropped".into()))??;

        let res = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::pod_collect_to_vec(&data[..])
        };
        staging_buffer.unmap();
        Ok(res)
    }
}
