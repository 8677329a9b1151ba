//! Moves every key to the destination assigned by the rank pass.

use crate::context::GpuContext;
use crate::pipeline::{
    create_compute_kernel, BindGroupInfo, ComputePass, ComputePipelineInfo, Kernel, ShaderModuleInfo,
};

static SCATTER_SHADER: &str = include_str!("shaders/scatter.wgsl");

pub struct Scatter {
    kernel: Kernel,
}

impl Scatter {
    pub fn new(device: &wgpu::Device) -> Self {
        let kernel = create_compute_kernel(
            device,
            &ComputePipelineInfo {
                compute_shader: ShaderModuleInfo {
                    name: "scatter",
                    source: SCATTER_SHADER,
                    entry_point: "main",
                },
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

    /// `output[dest[i]] = input[i]`. `output` must not alias `input`.
    pub fn pass<'a>(
        &'a self,
        ctx: &GpuContext,
        input: &wgpu::Buffer,
        dest: &wgpu::Buffer,
        output: &wgpu::Buffer,
        params: &wgpu::Buffer,
        num_groups: u32,
    ) -> ComputePass<'a> {
        self.kernel.pass(ctx, &[input, dest, output, params], num_groups)
    }
}
