//! Probe a grid of locations in a synthetic scalar volume and write the
//! answers as a CBOR dump.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use rayon::prelude::*;

use volprobe::dump::{ItemColumn, ProbeDump};
use volprobe::{
    BindingId, KernelRole, KernelSpec, Kind, ProbeContext, ScalarItem, Volume, VolumeBinding,
    SCALAR,
};

#[derive(Parser, Debug)]
#[command(about = "Probe a synthetic scalar volume over a regular grid")]
struct Args {
    /// Output CBOR file
    #[arg(short, long)]
    output: PathBuf,

    /// Volume resolution per axis
    #[arg(long, default_value_t = 32)]
    size: usize,

    /// Probe grid resolution per axis
    #[arg(long, default_value_t = 24)]
    grid: usize,

    /// Items to probe (names like value, gradvec, meancurv)
    #[arg(short, long, default_values_t = ["value".to_string(), "gradmag".to_string(), "meancurv".to_string()])]
    item: Vec<String>,

    /// Probe z-slabs in parallel, one context copy per worker
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let items: Vec<ScalarItem> = args
        .item
        .iter()
        .map(|s| s.parse::<ScalarItem>().map_err(|e| anyhow!(e)))
        .collect::<Result<_>>()?;

    let volume = synthetic_blob(args.size)?;
    let mut binding =
        VolumeBinding::new(&SCALAR, volume).context("Failed to bind synthetic volume")?;
    for &item in &items {
        binding
            .item_on(item as usize)
            .with_context(|| format!("Failed to enable item {item:?}"))?;
    }

    let mut ctx = ProbeContext::new();
    let id = ctx.attach(binding)?;
    ctx.set_kernel(KernelRole::Value00, KernelSpec::catmull_rom())?;
    ctx.set_kernel(KernelRole::D1Measure11, KernelSpec::bc_cubic_d(0.0, 0.5))?;
    ctx.set_kernel(KernelRole::D2Measure22, KernelSpec::bc_cubic_dd(0.0, 0.5))?;
    ctx.update()?;
    info!(
        "probing {} items on a {}^3 grid, filter radius {}",
        items.len(),
        args.grid,
        ctx.radius()
    );

    let slabs: Vec<Vec<Vec<f64>>> = if args.parallel {
        (0..args.grid)
            .into_par_iter()
            .map_init(
                || ctx.copy(),
                |ctx, zi| probe_slab(ctx, id, &items, args.grid, args.size, zi),
            )
            .collect::<Result<_>>()?
    } else {
        (0..args.grid)
            .map(|zi| probe_slab(&mut ctx, id, &items, args.grid, args.size, zi))
            .collect::<Result<_>>()?
    };

    let size32 = args.size as u32;
    let grid32 = args.grid as u32;
    let mut dump = ProbeDump::new([size32; 3], [grid32; 3]);
    for (ii, &item) in items.iter().enumerate() {
        let len = ctx.answer(id, item as usize)?.len();
        let mut column = ItemColumn::new(SCALAR.item_str(item as usize), len as u32);
        for slab in &slabs {
            column.values.extend_from_slice(&slab[ii]);
        }
        dump.add_item(column);
    }
    dump.save(&args.output)?;
    info!("wrote {}", args.output.display());
    Ok(())
}

/// Probe one z-slab of the grid, returning one value run per item.
fn probe_slab(
    ctx: &mut ProbeContext,
    id: BindingId,
    items: &[ScalarItem],
    grid: usize,
    size: usize,
    zi: usize,
) -> Result<Vec<Vec<f64>>> {
    let mut out: Vec<Vec<f64>> = items.iter().map(|_| Vec::new()).collect();
    let span = (size - 1) as f64;
    let at = |gi: usize| span * gi as f64 / (grid - 1) as f64;
    let z = at(zi);
    for yi in 0..grid {
        let y = at(yi);
        for xi in 0..grid {
            ctx.probe(at(xi), y, z)?;
            for (ii, &item) in items.iter().enumerate() {
                out[ii].extend_from_slice(ctx.answer(id, item as usize)?);
            }
        }
    }
    Ok(out)
}

/// A smooth blob: superposition of a centered Gaussian bump and a gentle
/// sinusoid, so gradients and curvatures are nontrivial everywhere.
fn synthetic_blob(size: usize) -> Result<Volume> {
    let c = (size - 1) as f64 / 2.0;
    let w = size as f64 / 4.0;
    let mut data = Vec::with_capacity(size * size * size);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let dx = (x as f64 - c) / w;
                let dy = (y as f64 - c) / w;
                let dz = (z as f64 - c) / w;
                let bump = (-(dx * dx + dy * dy + dz * dz)).exp();
                let ripple = 0.1 * (0.9 * x as f64).sin() * (0.7 * y as f64).cos();
                data.push(bump + ripple);
            }
        }
    }
    Volume::new(data, 1, [size, size, size]).context("Failed to build synthetic volume")
}
