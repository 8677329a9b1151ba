//! Bitonic sorting network over a power-of-two device buffer.

use bytemuck::{Pod, Zeroable};
use log::trace;

use crate::context::GpuContext;
use crate::error::{Result, SortError};
use crate::pipeline::{
    check_dispatch, create_compute_kernel, create_uniform, group_count, BindGroupInfo,
    ComputePipelineInfo, Kernel, ShaderModuleInfo,
};

static BITONIC_SHADER: &str = include_str!("shaders/bitonic.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BitonicParams {
    half_len: u32,
    stage: u32,
    distance_shift: u32,
    _pad: u32,
}

/// `(stage, distance_shift)` of every compare-exchange step for `len`
/// elements, in launch order.
pub fn network_steps(len: usize) -> Vec<(u32, u32)> {
    if len < 2 {
        return Vec::new();
    }
    let stages = len.trailing_zeros();
    let mut steps = Vec::new();
    for stage in 0..stages {
        for pass in 0..=stage {
            steps.push((stage, stage - pass));
        }
    }
    steps
}

pub struct BitonicSorter {
    kernel: Kernel,
}

impl BitonicSorter {
    pub fn new(device: &wgpu::Device) -> Self {
        let kernel = create_compute_kernel(
            device,
            &ComputePipelineInfo {
                compute_shader: ShaderModuleInfo {
                    name: "bitonic",
                    source: BITONIC_SHADER,
                    entry_point: "main",
                },
                bind_group: vec![BindGroupInfo::storage(0, false), BindGroupInfo::uniform(1)],
            },
        );
        Self { kernel }
    }

    /// Records an ascending sort of the `len` elements of `data`. `len` must
    /// be a power of two.
    pub fn encode(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        data: &wgpu::Buffer,
        len: usize,
    ) -> Result<()> {
        if !len.is_power_of_two() {
            return Err(SortError::precondition(
                "len",
                format!("bitonic networks need a power of two, got {}", len),
            ));
        }
        let half_len = len / 2;
        let groups = group_count(half_len);
        check_dispatch(ctx, "bitonic work-groups", groups)?;

        for (stage, distance_shift) in network_steps(len) {
            trace!("Bitonic step: stage {} distance {}", stage, 1u32 << distance_shift);
            let params = create_uniform(
                &ctx.device,
                "bitonic params",
                &BitonicParams {
                    half_len: half_len as u32,
                    stage,
                    distance_shift,
                    _pad: 0,
                },
            );
            self.kernel.pass(ctx, &[data, &params], groups as u32).execute(encoder);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_networks_are_empty() {
        assert!(network_steps(0).is_empty());
        assert!(network_steps(1).is_empty());
    }

    #[test]
    fn eight_elements() {
        assert_eq!(
            network_steps(8),
            vec![(0, 0), (1, 1), (1, 0), (2, 2), (2, 1), (2, 0)]
        );
    }

    #[test]
    fn step_count_is_triangular() {
        let k = 10;
        assert_eq!(network_steps(1 << k).len(), (k * (k + 1) / 2) as usize);
    }
}
