//! Stable destination indices for the keys of one radix pass.
//!
//! A key's destination is the scanned histogram entry of its digit and
//! group plus the number of keys with the same digit on lower lanes of the
//! same group. Two kernels compute the second term.

use crate::context::GpuContext;
use crate::pipeline::{
    create_compute_kernel, BindGroupInfo, ComputePass, ComputePipelineInfo, Kernel, ShaderModuleInfo,
};
use crate::{MASK_WORDS, RADIX};

static RANK_BALLOT_SHADER: &str = include_str!("shaders/rank_ballot.wgsl");
static RANK_ATOMIC_SHADER: &str = include_str!("shaders/rank_atomic.wgsl");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankStrategy {
    /// Lanes publish their digit in a per-bucket bitmask and count the set
    /// bits below them. No lane waits for another.
    #[default]
    Ballot,
    /// Lanes take turns drawing from a per-bucket atomic counter.
    AtomicCounter,
}

impl RankStrategy {
    fn shader(self) -> ShaderModuleInfo {
        match self {
            RankStrategy::Ballot => ShaderModuleInfo {
                name: "rank_ballot",
                source: RANK_BALLOT_SHADER,
                entry_point: "main",
            },
            RankStrategy::AtomicCounter => ShaderModuleInfo {
                name: "rank_atomic",
                source: RANK_ATOMIC_SHADER,
                entry_point: "main",
            },
        }
    }

    /// Bytes of work-group memory the kernel declares.
    pub fn workgroup_storage(self) -> u32 {
        let words = match self {
            RankStrategy::Ballot => RADIX * MASK_WORDS,
            RankStrategy::AtomicCounter => RADIX,
        };
        words * std::mem::size_of::<u32>() as u32
    }
}

pub struct RankKernel {
    kernel: Kernel,
}

impl RankKernel {
    pub fn new(device: &wgpu::Device, strategy: RankStrategy) -> Self {
        let kernel = create_compute_kernel(
            device,
            &ComputePipelineInfo {
                compute_shader: strategy.shader(),
                bind_group: vec![
                    BindGroupInfo::storage(0, true),
                    BindGroupInfo::storage(1, true),
                    BindGroupInfo::storage(2, false),
                    BindGroupInfo::uniform(3),
                ],
            },
        );
        Self { kernel }
    }

    /// Writes the destination of `keys[i]` to `dest[i]`, reading bucket
    /// bases from the exclusively scanned table `hist`.
    pub fn pass<'a>(
        &'a self,
        ctx: &GpuContext,
        keys: &wgpu::Buffer,
        hist: &wgpu::Buffer,
        dest: &wgpu::Buffer,
        params: &wgpu::Buffer,
        num_groups: u32,
    ) -> ComputePass<'a> {
        self.kernel.pass(ctx, &[keys, hist, dest, params], num_groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballot_is_the_default() {
        assert_eq!(RankStrategy::default(), RankStrategy::Ballot);
    }

    #[test]
    fn storage_fits_default_limits() {
        let limit = wgpu::Limits::default().max_compute_workgroup_storage_size;
        assert_eq!(RankStrategy::Ballot.workgroup_storage(), RADIX * MASK_WORDS * 4);
        assert!(RankStrategy::Ballot.workgroup_storage() <= limit);
        assert!(RankStrategy::AtomicCounter.workgroup_storage() <= limit);
    }
}
