//! Compute pipeline descriptions, kernel compilation and dispatch helpers.

use bytemuck::Pod;
use log::debug;
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error::Result;
use crate::{GROUP_WIDTH, MASK_WORDS, RADIX, RADIX_BITS};

#[derive(Clone, Copy)]
pub struct ShaderModuleInfo {
    pub name: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
}

/// One entry of a kernel's bind group. Resources are supplied at bind time
/// in binding order.
#[derive(Clone, Copy)]
pub struct BindGroupInfo {
    pub binding: u32,
    pub binding_type: wgpu::BindingType,
}

impl BindGroupInfo {
    pub fn storage(binding: u32, read_only: bool) -> Self {
        Self {
            binding,
            binding_type: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    pub fn uniform(binding: u32) -> Self {
        Self {
            binding,
            binding_type: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }
}

pub struct ComputePipelineInfo {
    pub compute_shader: ShaderModuleInfo,
    pub bind_group: Vec<BindGroupInfo>,
}

/// A compiled compute pipeline and the layout of its bind group.
pub struct Kernel {
    pub name: &'static str,
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Prefixes a kernel body with the compile-time constants shared with the host.
pub fn shader_source(body: &str) -> String {
    format!(
        "const RADIX_BITS: u32 = {}u;\n\
         const RADIX: u32 = {}u;\n\
         const GROUP_WIDTH: u32 = {}u;\n\
         const MASK_WORDS: u32 = {}u;\n\n{}",
        RADIX_BITS, RADIX, GROUP_WIDTH, MASK_WORDS, body
    )
}

pub fn create_compute_kernel(device: &wgpu::Device, info: &ComputePipelineInfo) -> Kernel {
    let shader = info.compute_shader;
    debug!("Creating compute pipeline '{}' ({})", shader.name, shader.entry_point);

    let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = info
        .bind_group
        .iter()
        .map(|x| wgpu::BindGroupLayoutEntry {
            binding: x.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: x.binding_type,
            count: None,
        })
        .collect();

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(shader.name),
        entries: &layout_entries,
    });

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(shader.name),
        source: wgpu::ShaderSource::Wgsl(shader_source(shader.source).into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(shader.name),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(shader.name),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some(shader.entry_point),
        compilation_options: Default::default(),
        cache: None,
    });

    Kernel {
        name: shader.name,
        pipeline,
        bind_group_layout,
    }
}

impl Kernel {
    /// Binds `buffers` to bindings 0, 1, 2, ... in order.
    pub fn bind(&self, device: &wgpu::Device, buffers: &[&wgpu::Buffer]) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.name),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }

    /// A ready-to-record launch of `groups` work-groups over `buffers`.
    pub fn pass(&self, ctx: &GpuContext, buffers: &[&wgpu::Buffer], groups: u32) -> ComputePass<'_> {
        let (dispatch_x, dispatch_y) =
            dispatch_size(groups, ctx.limits().max_compute_workgroups_per_dimension);
        ComputePass {
            kernel: self,
            bind_group: self.bind(&ctx.device, buffers),
            dispatch_x,
            dispatch_y,
            dispatch_z: 1,
        }
    }
}

/// One kernel launch. Every launch records its own compute pass, so
/// consecutive launches see each other's storage writes.
pub struct ComputePass<'a> {
    pub kernel: &'a Kernel,
    pub bind_group: wgpu::BindGroup,
    pub dispatch_x: u32,
    pub dispatch_y: u32,
    pub dispatch_z: u32,
}

impl ComputePass<'_> {
    pub fn execute(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.kernel.name),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.kernel.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(self.dispatch_x, self.dispatch_y, self.dispatch_z);
    }
}

/// Number of work-groups needed to cover `len` elements.
pub fn group_count(len: usize) -> usize {
    len.div_ceil(GROUP_WIDTH as usize)
}

/// Folds a linear group count into a 2-D grid when it exceeds the
/// per-dimension limit. Kernels recover the linear group index as
/// `wid.y * num_workgroups.x + wid.x` and drop surplus groups.
pub fn dispatch_size(groups: u32, max_per_dimension: u32) -> (u32, u32) {
    if groups <= max_per_dimension {
        (groups, 1)
    } else {
        (max_per_dimension, groups.div_ceil(max_per_dimension))
    }
}

/// Fails when `groups` work-groups cannot be folded into a 2-D grid.
pub fn check_dispatch(ctx: &GpuContext, resource: &'static str, groups: usize) -> Result<()> {
    let max = ctx.limits().max_compute_workgroups_per_dimension as u64;
    GpuContext::check_capacity(resource, groups as u64, (max * max).min(u32::MAX as u64))
}

/// Creates a uniform buffer holding `value`.
pub fn create_uniform<T: Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_dispatch_is_one_dimensional() {
        assert_eq!(dispatch_size(1, 65535), (1, 1));
        assert_eq!(dispatch_size(65535, 65535), (65535, 1));
    }

    #[test]
    fn large_dispatch_folds_into_rows() {
        assert_eq!(dispatch_size(65536, 65535), (65535, 2));
        let (x, y) = dispatch_size(1_000_000, 65535);
        assert!(x as u64 * y as u64 >= 1_000_000);
        assert!((x as u64) * (y as u64 - 1) < 1_000_000);
    }

    #[test]
    fn group_count_rounds_up() {
        assert_eq!(group_count(0), 0);
        assert_eq!(group_count(1), 1);
        assert_eq!(group_count(GROUP_WIDTH as usize), 1);
        assert_eq!(group_count(GROUP_WIDTH as usize + 1), 2);
    }

    #[test]
    fn shader_header_carries_constants() {
        let source = shader_source("fn main() {}");
        assert!(source.contains(&format!("const RADIX: u32 = {}u;", RADIX)));
        assert!(source.contains(&format!("const GROUP_WIDTH: u32 = {}u;", GROUP_WIDTH)));
        assert!(source.ends_with("fn main() {}"));
    }
}
