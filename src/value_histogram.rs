//! Counts of small integer values: sort a copy, then binary search each
//! bucket's bounds.

use bytemuck::{Pod, Zeroable};
use futures::executor::block_on;
use log::debug;

use crate::bitonic::BitonicSorter;
use crate::context::GpuContext;
use crate::error::{Result, SortError};
use crate::pipeline::{
    check_dispatch, create_compute_kernel, create_uniform, group_count, BindGroupInfo,
    ComputePipelineInfo, Kernel, ShaderModuleInfo,
};
use crate::Buffer;

static BUCKET_COUNT_SHADER: &str = include_str!("shaders/bucket_count.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BucketParams {
    len: u32,
    buckets: u32,
    _pad0: u32,
    _pad1: u32,
}

fn create_bucket_kernel(device: &wgpu::Device) -> Kernel {
    create_compute_kernel(
        device,
        &ComputePipelineInfo {
            compute_shader: ShaderModuleInfo {
                name: "bucket_count",
                source: BUCKET_COUNT_SHADER,
                entry_point: "main",
            },
            bind_group: vec![
                BindGroupInfo::storage(0, true),
                BindGroupInfo::storage(1, false),
                BindGroupInfo::uniform(2),
            ],
        },
    )
}

/// `hist_out[k]` becomes the number of elements of `values_in` equal to `k`.
/// Values of `hist_out.len()` or more are not counted.
pub fn histogram(ctx: &GpuContext, hist_out: &mut [u32], values_in: &[u32]) -> Result<()> {
    if hist_out.is_empty() {
        return Ok(());
    }
    u32::try_from(hist_out.len())
        .map_err(|_| SortError::precondition("hist_out", "more than u32::MAX buckets"))?;
    u32::try_from(values_in.len())
        .map_err(|_| SortError::precondition("values_in", "more than u32::MAX values"))?;
    if values_in.is_empty() {
        hist_out.fill(0);
        return Ok(());
    }
    block_on(count_buckets(ctx, hist_out, values_in))
}

async fn count_buckets(ctx: &GpuContext, hist_out: &mut [u32], values_in: &[u32]) -> Result<()> {
    let n = values_in.len();
    let buckets = hist_out.len();
    let padded_len = n
        .checked_next_power_of_two()
        .ok_or_else(|| SortError::precondition("values_in", "too many values to pad"))?;
    ctx.check_storage_size("padded values", (padded_len * std::mem::size_of::<u32>()) as u64)?;
    ctx.check_storage_size("histogram", (buckets * std::mem::size_of::<u32>()) as u64)?;
    check_dispatch(ctx, "bucket work-groups", group_count(buckets))?;
    debug!("Histogram of {} values into {} buckets (padded to {})", n, buckets, padded_len);

    // Padding sorts behind every real value, which the searches never pass.
    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(values_in);
    padded.resize(padded_len, u32::MAX);

    let sorted = Buffer::create_buffer_from_data::<u32>(
        &ctx.device,
        &padded,
        Buffer::storage_usage(),
        Some("histogram values".to_string()),
    );
    let counts = Buffer::create_buffer(
        &ctx.device,
        (buckets * std::mem::size_of::<u32>()) as u64,
        Buffer::storage_usage(),
        Some("histogram counts"),
    );

    ctx.scoped(|ctx| -> Result<()> {
        let bitonic = BitonicSorter::new(&ctx.device);
        let bucket_count = create_bucket_kernel(&ctx.device);
        let params = create_uniform(
            &ctx.device,
            "bucket params",
            &BucketParams {
                len: n as u32,
                buckets: buckets as u32,
                _pad0: 0,
                _pad1: 0,
            },
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("histogram") });
        bitonic.encode(ctx, &mut encoder, &sorted.buffer, padded_len)?;
        bucket_count
            .pass(ctx, &[&sorted.buffer, &counts.buffer, &params], group_count(buckets) as u32)
            .execute(&mut encoder);
        ctx.submit(encoder);
        Ok(())
    })
    .await??;

    let result = counts.to_vec::<u32>(ctx, true).await?;
    hist_out.copy_from_slice(&result);
    Ok(())
}
