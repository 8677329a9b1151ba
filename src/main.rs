use std::time::Instant;

use log::{error, info, warn};
use rand::Rng;

use gpu_radix::{host, GpuContext, KeyBuffer, RadixSorter, RankStrategy, SortConfig, SortError};

static DEFAULT_KEY_COUNT: usize = 4 << 20;

async fn run(n: usize) -> Result<(), SortError> {
    let ctx = GpuContext::new().await?;
    let adapter = ctx.adapter_info();
    info!("Sorting on '{}' ({:?})", adapter.name, adapter.backend);

    let mut rng = rand::thread_rng();
    let keys: Vec<u32> = (0..n).map(|_| rng.gen()).collect();

    let start = Instant::now();
    let mut expected = keys.clone();
    host::radix_sort(&mut expected, RankStrategy::Ballot);
    info!("Host reference sort of {} keys: {:?}", n, start.elapsed());

    for rank_strategy in [RankStrategy::Ballot, RankStrategy::AtomicCounter] {
        let sorter = RadixSorter::with_config(&ctx, SortConfig { rank_strategy }).await?;
        let buffer = KeyBuffer::from_keys(&ctx, &keys)?;

        let start = Instant::now();
        sorter.sort_buffer(&ctx, &buffer).await?;
        let elapsed = start.elapsed();

        let sorted = buffer.read(&ctx).await?;
        if sorted == expected {
            info!(
                "{:?}: sorted {} keys in {:?} ({:.1} Mkeys/s)",
                sorter.config().rank_strategy,
                n,
                elapsed,
                n as f64 / elapsed.as_secs_f64() / 1.0e6
            );
        } else {
            let first_bad = sorted.iter().zip(&expected).position(|(a, b)| a != b);
            error!("{:?}: result differs from the host reference at {:?}", rank_strategy, first_bad);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let n = match std::env::args().nth(1) {
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            warn!("Could not parse key count '{}', using {}", arg, DEFAULT_KEY_COUNT);
            DEFAULT_KEY_COUNT
        }),
        None => DEFAULT_KEY_COUNT,
    };
    if n == 0 {
        info!("Nothing to sort");
        return;
    }

    if let Err(e) = futures::executor::block_on(run(n)) {
        error!("{}", e);
        std::process::exit(1);
    }
}
