//! tiermem soak run
//!
//! Writes the hex form of every `step`-th address across the whole address
//! space, reads it back, overwrites shifted by five bytes and verifies again.
//! Sizing comes from `TIERMEM_*` variables (see `VmmConfig::from_env`).
//!
//! Usage:
//!   tiermem-soak [step]

use anyhow::{bail, Context, Result};
use tiermem_core::{Vmm, VmmConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn pass(vmm: &mut Vmm, step: u64, shift: u64) -> Result<u64> {
    let limit = vmm.maximum_size();
    let mut written = 0;

    let mut address = 0;
    while address < limit {
        let text = format!("{:x}", address);
        let at = address + shift;
        if at + text.len() as u64 <= limit {
            vmm.write(at, text.as_bytes())
                .with_context(|| format!("write at 0x{:x}", at))?;
            written += 1;
        }
        address += step;
    }

    let mut address = 0;
    while address < limit {
        let text = format!("{:x}", address);
        let at = address + shift;
        if at + text.len() as u64 <= limit {
            let mut buf = vec![0u8; text.len()];
            vmm.read(at, &mut buf)
                .with_context(|| format!("read at 0x{:x}", at))?;
            if buf != text.as_bytes() {
                bail!(
                    "mismatch at 0x{:x}: expected {:?}, found {:?}",
                    at,
                    text,
                    String::from_utf8_lossy(&buf)
                );
            }
        }
        address += step;
    }

    Ok(written)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiermem_soak=info,tiermem_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let step: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("step must be a positive integer")?,
        None => 10,
    };
    if step == 0 {
        bail!("step must be a positive integer");
    }

    let config = VmmConfig::from_env()?;
    tracing::info!("soak config: {}", serde_json::to_string(&config)?);

    let mut vmm = Vmm::create(config)?;
    for shift in [0, 5] {
        let written = pass(&mut vmm, step, shift)?;
        tracing::info!("pass with shift {} verified {} strings", shift, written);
    }
    vmm.flush()?;

    println!("{}", serde_json::to_string_pretty(&vmm.stats())?);
    vmm.destroy()?;
    Ok(())
}
