//! Hierarchical exclusive prefix scan over `u32` device buffers.

use bytemuck::{Pod, Zeroable};
use futures::executor::block_on;
use log::debug;

use crate::context::GpuContext;
use crate::error::Result;
use crate::pipeline::{
    check_dispatch, create_compute_kernel, create_uniform, group_count, BindGroupInfo,
    ComputePass, ComputePipelineInfo, Kernel, ShaderModuleInfo,
};
use crate::Buffer;

static SCAN_SHADER: &str = include_str!("shaders/scan.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ScanParams {
    len: u32,
    num_groups: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Lengths of the arrays scanned at each level, finest first. Level `j + 1`
/// is the group-sum array of level `j`. Levels whose group sums would fit in
/// a single element end the list.
pub fn scan_levels(len: usize) -> Vec<usize> {
    let mut levels = Vec::new();
    let mut len = len;
    while len > 1 {
        levels.push(len);
        len = group_count(len);
    }
    levels
}

/// The two scan kernels, compiled once.
pub struct ExclusiveScan {
    local: Kernel,
    add: Kernel,
}

impl ExclusiveScan {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group = vec![
            BindGroupInfo::storage(0, false),
            BindGroupInfo::storage(1, false),
            BindGroupInfo::uniform(2),
        ];
        let local = create_compute_kernel(
            device,
            &ComputePipelineInfo {
                compute_shader: ShaderModuleInfo {
                    name: "scan_local",
                    source: SCAN_SHADER,
                    entry_point: "scan_local",
                },
                bind_group: bind_group.clone(),
            },
        );
        let add = create_compute_kernel(
            device,
            &ComputePipelineInfo {
                compute_shader: ShaderModuleInfo {
                    name: "scan_add",
                    source: SCAN_SHADER,
                    entry_point: "scan_add",
                },
                bind_group,
            },
        );
        Self { local, add }
    }

    /// Allocates the scratch levels for scanning the first `len` elements of
    /// `data` and prepares every launch.
    pub fn plan<'a>(&'a self, ctx: &GpuContext, data: &wgpu::Buffer, len: usize) -> Result<ScanPlan<'a>> {
        let levels = scan_levels(len);
        check_dispatch(ctx, "scan work-groups", group_count(len))?;
        debug!("Scan of {} elements over levels {:?}", len, levels);

        // sums[j] receives the group totals of level j.
        let sums: Vec<Buffer> = levels
            .iter()
            .map(|&level| {
                Buffer::create_buffer(
                    &ctx.device,
                    (group_count(level) * std::mem::size_of::<u32>()) as u64,
                    Buffer::storage_usage(),
                    Some("scan group sums"),
                )
            })
            .collect();

        let params: Vec<wgpu::Buffer> = levels
            .iter()
            .map(|&level| {
                create_uniform(
                    &ctx.device,
                    "scan params",
                    &ScanParams {
                        len: level as u32,
                        num_groups: group_count(level) as u32,
                        _pad0: 0,
                        _pad1: 0,
                    },
                )
            })
            .collect();

        let level_data = |j: usize| if j == 0 { data } else { &sums[j - 1].buffer };

        let mut passes = Vec::with_capacity(2 * levels.len());
        for (j, &level) in levels.iter().enumerate() {
            passes.push(self.local.pass(
                ctx,
                &[level_data(j), &sums[j].buffer, &params[j]],
                group_count(level) as u32,
            ));
        }
        // The coarsest level's sums hold a single total; nothing to add back.
        for (j, &level) in levels.iter().enumerate().rev().skip(1) {
            passes.push(self.add.pass(
                ctx,
                &[level_data(j), &sums[j].buffer, &params[j]],
                group_count(level) as u32,
            ));
        }

        Ok(ScanPlan {
            levels,
            _sums: sums,
            passes,
        })
    }

    /// Records an exclusive scan of the first `len` elements of `data`.
    pub fn encode(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        data: &wgpu::Buffer,
        len: usize,
    ) -> Result<()> {
        self.plan(ctx, data, len)?.encode(encoder);
        Ok(())
    }
}

/// Scratch buffers and launches of one scan, in the order they must run:
/// every local scan finest first, then the add passes coarsest first.
pub struct ScanPlan<'a> {
    levels: Vec<usize>,
    _sums: Vec<Buffer>,
    passes: Vec<ComputePass<'a>>,
}

impl ScanPlan<'_> {
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        for pass in self.passes.iter() {
            pass.execute(encoder);
        }
    }
}

/// Replaces `values` with its exclusive prefix sum, wrapping on overflow.
pub fn exclusive_scan(ctx: &GpuContext, values: &mut [u32]) -> Result<()> {
    if values.len() <= 1 {
        if let Some(first) = values.first_mut() {
            *first = 0;
        }
        return Ok(());
    }
    block_on(scan_slice(ctx, values))
}

async fn scan_slice(ctx: &GpuContext, values: &mut [u32]) -> Result<()> {
    ctx.check_storage_size("scan input", std::mem::size_of_val(values) as u64)?;

    let data = Buffer::create_buffer_from_data::<u32>(
        &ctx.device,
        values,
        Buffer::storage_usage(),
        Some("scan data".to_string()),
    );

    ctx.scoped(|ctx| -> Result<()> {
        let scan = ExclusiveScan::new(&ctx.device);
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("exclusive scan") });
        scan.encode(ctx, &mut encoder, &data.buffer, values.len())?;
        ctx.submit(encoder);
        Ok(())
    })
    .await??;

    let result = data.to_vec::<u32>(ctx, false).await?;
    values.copy_from_slice(&result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GROUP_WIDTH;

    const W: usize = GROUP_WIDTH as usize;

    #[test]
    fn trivial_lengths_have_no_levels() {
        assert!(scan_levels(0).is_empty());
        assert!(scan_levels(1).is_empty());
    }

    #[test]
    fn single_group_is_one_level() {
        assert_eq!(scan_levels(2), vec![2]);
        assert_eq!(scan_levels(W), vec![W]);
    }

    #[test]
    fn levels_shrink_by_group_width() {
        assert_eq!(scan_levels(W + 1), vec![W + 1, 2]);
        assert_eq!(scan_levels(W * W), vec![W * W, W]);
        assert_eq!(scan_levels(W * W + 1), vec![W * W + 1, W + 1, 2]);
    }
}
