//! Per-group digit counts for one radix pass.

use crate::context::GpuContext;
use crate::pipeline::{
    create_compute_kernel, BindGroupInfo, ComputePass, ComputePipelineInfo, Kernel, ShaderModuleInfo,
};
use crate::RADIX;

static HISTOGRAM_SHADER: &str = include_str!("shaders/histogram.wgsl");

/// Number of entries in the bucket-major histogram table of `num_groups` groups.
pub fn table_len(num_groups: usize) -> usize {
    RADIX as usize * num_groups
}

/// Index of `(bucket, group)` in the table.
pub fn table_index(bucket: u32, group: usize, num_groups: usize) -> usize {
    bucket as usize * num_groups + group
}

pub struct DigitHistogram {
    kernel: Kernel,
}

impl DigitHistogram {
    pub fn new(device: &wgpu::Device) -> Self {
        let kernel = create_compute_kernel(
            device,
            &ComputePipelineInfo {
                compute_shader: ShaderModuleInfo {
                    name: "digit_histogram",
                    source: HISTOGRAM_SHADER,
                    entry_point: "main",
                },
                bind_group: vec![
                    BindGroupInfo::storage(0, true),
                    BindGroupInfo::storage(1, false),
                    BindGroupInfo::uniform(2),
                ],
            },
        );
        Self { kernel }
    }

    /// Counts the digits of `keys` into `hist`. Every entry of the table is
    /// overwritten, so `hist` needs no clearing between passes.
    pub fn pass<'a>(
        &'a self,
        ctx: &GpuContext,
        keys: &wgpu::Buffer,
        hist: &wgpu::Buffer,
        params: &wgpu::Buffer,
        num_groups: u32,
    ) -> ComputePass<'a> {
        self.kernel.pass(ctx, &[keys, hist, params], num_groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_bucket_major() {
        assert_eq!(table_len(3), 3 * RADIX as usize);
        assert_eq!(table_index(0, 2, 3), 2);
        assert_eq!(table_index(1, 0, 3), 3);
        assert_eq!(table_index(RADIX - 1, 2, 3), table_len(3) - 1);
    }
}
