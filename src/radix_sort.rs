//! LSD radix sort of `u32` keys: one histogram, scan, rank and scatter
//! launch per digit, ping-ponging between two key buffers.

use bytemuck::{Pod, Zeroable};
use futures::executor::block_on;
use log::{debug, trace};

use crate::context::GpuContext;
use crate::error::{Result, SortError};
use crate::histogram::{table_len, DigitHistogram};
use crate::pipeline::{check_dispatch, create_uniform, group_count};
use crate::rank::{RankKernel, RankStrategy};
use crate::scan::{ExclusiveScan, ScanPlan};
use crate::scatter::Scatter;
use crate::{Buffer, GROUP_WIDTH, NUM_PASSES, RADIX_BITS};

/// Uniform block shared by the per-pass kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PassParams {
    pub n: u32,
    pub shift: u32,
    pub num_groups: u32,
    pub _pad: u32,
}

/// Where the scheduler is. Passes run least significant digit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Pass(u32),
    Done,
}

impl PassState {
    pub fn first() -> Self {
        PassState::Pass(0)
    }

    pub fn next(self) -> Self {
        match self {
            PassState::Pass(p) if p + 1 < NUM_PASSES => PassState::Pass(p + 1),
            _ => PassState::Done,
        }
    }

    /// Bit offset of the digit examined in this state.
    pub fn shift(self) -> Option<u32> {
        match self {
            PassState::Pass(p) => Some(p * RADIX_BITS),
            PassState::Done => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SortConfig {
    pub rank_strategy: RankStrategy,
}

///////////////////////////////////////////////////////////////////////////////////////

/// Keys resident in device memory.
pub struct KeyBuffer {
    inner: Buffer,
    len: usize,
}

impl KeyBuffer {
    /// Uploads `keys`. Device buffers cannot be empty.
    pub fn from_keys(ctx: &GpuContext, keys: &[u32]) -> Result<Self> {
        if keys.is_empty() {
            return Err(SortError::precondition("keys", "a key buffer needs at least one key"));
        }
        check_key_count(ctx, keys.len())?;
        let inner = Buffer::create_buffer_from_data::<u32>(
            &ctx.device,
            keys,
            Buffer::storage_usage(),
            Some("keys".to_string()),
        );
        Ok(Self { inner, len: keys.len() })
    }

    fn with_len(device: &wgpu::Device, len: usize, label: &str) -> Self {
        let inner = Buffer::create_buffer(
            device,
            (len * std::mem::size_of::<u32>()) as u64,
            Buffer::storage_usage(),
            Some(label),
        );
        Self { inner, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.inner.buffer
    }

    pub async fn read(&self, ctx: &GpuContext) -> Result<Vec<u32>> {
        self.inner.to_vec::<u32>(ctx, true).await
    }
}

fn check_key_count(ctx: &GpuContext, n: usize) -> Result<()> {
    GpuContext::check_capacity("key count", n as u64, u32::MAX as u64)?;
    ctx.check_storage_size("key buffer", (n * std::mem::size_of::<u32>()) as u64)?;
    let num_groups = group_count(n);
    check_dispatch(ctx, "key work-groups", num_groups)?;
    ctx.check_storage_size(
        "histogram table",
        (table_len(num_groups) * std::mem::size_of::<u32>()) as u64,
    )
}

/// Scratch of one sort call.
struct RadixBuffers {
    swap: KeyBuffer,
    histogram: Buffer,
    dest: Buffer,
    num_groups: usize,
}

/// Create the swap buffer, the histogram table and the destination indices
/// for sorting `n` keys.
fn create_radix_buffers(device: &wgpu::Device, n: usize) -> RadixBuffers {
    let num_groups = group_count(n);

    let swap = KeyBuffer::with_len(device, n, "swap keys");

    let histogram = Buffer::create_buffer(
        device,
        (std::mem::size_of::<u32>() * table_len(num_groups)) as u64,
        Buffer::storage_usage(),
        Some("histogram table"),
    );

    let dest = Buffer::create_buffer(
        device,
        (std::mem::size_of::<u32>() * n) as u64,
        Buffer::storage_usage(),
        Some("destinations"),
    );

    RadixBuffers {
        swap,
        histogram,
        dest,
        num_groups,
    }
}

///////////////////////////////////////////////////////////////////////////////////////

/// Compiled kernels of the sort. Holds no key data; one sorter serves any
/// number of calls on the context it was made for.
pub struct RadixSorter {
    histogram: DigitHistogram,
    scan: ExclusiveScan,
    rank: RankKernel,
    scatter: Scatter,
    config: SortConfig,
}

impl RadixSorter {
    pub async fn new(ctx: &GpuContext) -> Result<Self> {
        Self::with_config(ctx, SortConfig::default()).await
    }

    pub async fn with_config(ctx: &GpuContext, config: SortConfig) -> Result<Self> {
        check_device_limits(ctx, config.rank_strategy)?;
        debug!("Compiling radix sort kernels ({:?} ranking)", config.rank_strategy);
        ctx.scoped(|ctx| Self {
            histogram: DigitHistogram::new(&ctx.device),
            scan: ExclusiveScan::new(&ctx.device),
            rank: RankKernel::new(&ctx.device, config.rank_strategy),
            scatter: Scatter::new(&ctx.device),
            config,
        })
        .await
    }

    pub fn config(&self) -> SortConfig {
        self.config
    }

    /// Sorts `keys` in place.
    pub async fn sort(&self, ctx: &GpuContext, keys: &mut [u32]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let buffer = KeyBuffer::from_keys(ctx, keys)?;
        self.sort_buffer(ctx, &buffer).await?;
        let sorted = buffer.read(ctx).await?;
        keys.copy_from_slice(&sorted);
        Ok(())
    }

    /// Sorts the device keys in place. All passes go out in one submission.
    pub async fn sort_buffer(&self, ctx: &GpuContext, keys: &KeyBuffer) -> Result<()> {
        let n = keys.len();
        check_key_count(ctx, n)?;
        let scratch = create_radix_buffers(&ctx.device, n);
        debug!(
            "Radix sort of {} keys in {} groups, {} passes",
            n, scratch.num_groups, NUM_PASSES
        );

        ctx.scoped(|ctx| -> Result<()> {
            let scan = self.scan.plan(ctx, &scratch.histogram.buffer, table_len(scratch.num_groups))?;
            trace!("Histogram table scanned over {} levels", scan.levels().len());
            let ping_pong = [keys.buffer(), scratch.swap.buffer()];

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("radix sort") });

            let mut state = PassState::first();
            while let PassState::Pass(p) = state {
                let input = ping_pong[p as usize % 2];
                let output = ping_pong[(p as usize + 1) % 2];
                self.encode_pass(ctx, &mut encoder, state, n, input, output, &scratch, &scan);
                state = state.next();
            }

            // An odd pass count leaves the result in the swap buffer.
            if NUM_PASSES % 2 == 1 {
                encoder.copy_buffer_to_buffer(
                    scratch.swap.buffer(),
                    0,
                    keys.buffer(),
                    0,
                    (n * std::mem::size_of::<u32>()) as wgpu::BufferAddress,
                );
            }

            ctx.submit(encoder);
            Ok(())
        })
        .await?
    }

    /// Runs the single digit pass `pass` over `keys` and returns the reordered
    /// keys in a new buffer. `keys` is not modified.
    pub async fn run_pass(&self, ctx: &GpuContext, keys: &KeyBuffer, pass: u32) -> Result<KeyBuffer> {
        if pass >= NUM_PASSES {
            return Err(SortError::precondition(
                "pass",
                format!("{} is out of range, there are {} passes", pass, NUM_PASSES),
            ));
        }
        let n = keys.len();
        check_key_count(ctx, n)?;
        let scratch = create_radix_buffers(&ctx.device, n);
        let output = KeyBuffer::with_len(&ctx.device, n, "pass output");

        ctx.scoped(|ctx| -> Result<()> {
            let scan = self.scan.plan(ctx, &scratch.histogram.buffer, table_len(scratch.num_groups))?;
            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("radix pass") });
            self.encode_pass(
                ctx,
                &mut encoder,
                PassState::Pass(pass),
                n,
                keys.buffer(),
                output.buffer(),
                &scratch,
                &scan,
            );
            ctx.submit(encoder);
            Ok(())
        })
        .await??;

        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_pass(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        state: PassState,
        n: usize,
        input: &wgpu::Buffer,
        output: &wgpu::Buffer,
        scratch: &RadixBuffers,
        scan: &ScanPlan,
    ) {
        let shift = state.shift().unwrap_or(0);
        let num_groups = scratch.num_groups as u32;
        trace!("Encoding {:?}: shift {}, {} groups of {}", state, shift, num_groups, GROUP_WIDTH);

        let params = create_uniform(
            &ctx.device,
            "pass params",
            &PassParams {
                n: n as u32,
                shift,
                num_groups,
                _pad: 0,
            },
        );
        let histogram = &scratch.histogram.buffer;
        let dest = &scratch.dest.buffer;

        self.histogram
            .pass(ctx, input, histogram, &params, num_groups)
            .execute(encoder);
        scan.encode(encoder);
        self.rank
            .pass(ctx, input, histogram, dest, &params, num_groups)
            .execute(encoder);
        self.scatter
            .pass(ctx, input, dest, output, &params, num_groups)
            .execute(encoder);
    }
}

fn check_device_limits(ctx: &GpuContext, strategy: RankStrategy) -> Result<()> {
    let limits = ctx.limits();
    GpuContext::check_capacity(
        "work-group width",
        GROUP_WIDTH as u64,
        limits.max_compute_workgroup_size_x as u64,
    )?;
    GpuContext::check_capacity(
        "work-group invocations",
        GROUP_WIDTH as u64,
        limits.max_compute_invocations_per_workgroup as u64,
    )?;
    GpuContext::check_capacity(
        "work-group storage",
        strategy.workgroup_storage() as u64,
        limits.max_compute_workgroup_storage_size as u64,
    )
}

/// Sorts `keys` in place on the device, blocking until the result is back.
pub fn sort(ctx: &GpuContext, keys: &mut [u32]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    block_on(async {
        let sorter = RadixSorter::new(ctx).await?;
        sorter.sort(ctx, keys).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_run_in_order_then_stop() {
        let mut state = PassState::first();
        let mut seen = Vec::new();
        while let PassState::Pass(p) = state {
            seen.push(p);
            state = state.next();
        }
        assert_eq!(seen, (0..NUM_PASSES).collect::<Vec<_>>());
        assert_eq!(state, PassState::Done);
        assert_eq!(PassState::Done.next(), PassState::Done);
    }

    #[test]
    fn shifts_walk_the_key() {
        assert_eq!(PassState::Pass(0).shift(), Some(0));
        assert_eq!(PassState::Pass(NUM_PASSES - 1).shift(), Some(crate::KEY_BITS - RADIX_BITS));
        assert_eq!(PassState::Done.shift(), None);
    }

    #[test]
    fn pass_params_match_the_uniform_layout() {
        assert_eq!(std::mem::size_of::<PassParams>(), 16);
    }
}
