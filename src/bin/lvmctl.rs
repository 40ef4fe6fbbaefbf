// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A thin `clap` dispatcher over `lvmcore`, in the spirit of
//! `tools/<cmd>.c`: each subcommand bootstraps a [`ToolContext`], runs
//! one `process_each_*`-style pass, and maps the result onto the three
//! documented exit codes (`ECMD_PROCESSED` / `ECMD_FAILED` / bad
//! arguments). It does not attempt activation, locking across
//! processes, or a command surface as wide as `tools/`; it exists to
//! exercise the library end to end.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use lvmcore::config::ConfigTree;
use lvmcore::context::ToolContext;
use lvmcore::device::cache::RealDirProbe;
use lvmcore::device::io::{BlockDevice, FileDevice};
use lvmcore::error::{Error, ErrorKind};
use lvmcore::metadata::{AllocPolicy, Pv, Vg};
use lvmcore::uuid::Uuid;

#[derive(Parser)]
#[command(name = "lvmctl", author, version, about = "LVM2-style metadata core CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan configured device directories and report what the label
    /// scanner and device filter let through, as `pvscan` would.
    Pvscan,
    /// List the VGs the in-memory cache currently knows about.
    Vgs,
    /// Create a VG in memory from one or more PV paths and print its
    /// summary; the result is not persisted (`lvmcore` leaves the format
    /// handler's `write_vg` to its caller).
    Vgcreate {
        name: String,
        #[arg(required = true)]
        devices: Vec<String>,
        #[arg(long, default_value_t = 4096)]
        extent_size: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let ctx = match ToolContext::new(ConfigTree::new()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("lvmctl: failed to initialise: {}", e);
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Commands::Pvscan => cmd_pvscan(ctx),
        Commands::Vgs => cmd_vgs(ctx),
        Commands::Vgcreate { name, devices, extent_size } => cmd_vgcreate(ctx, &name, &devices, extent_size),
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) if e.kind() == ErrorKind::InvalidArgument => {
            eprintln!("lvmctl: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("lvmctl: {}", e);
            ExitCode::from(1)
        }
    }
}

fn cmd_pvscan(mut ctx: ToolContext) -> lvmcore::Result<()> {
    let probe = RealDirProbe;
    ctx.devices.scan(false, &probe)?;

    let mut seen = 0;
    for dev in ctx.devices.iter_filtered(&ctx.filter) {
        println!("  {}", dev.name());
        seen += 1;
    }
    if seen == 0 {
        println!("  no devices found (ran against {})", ctx.dev_dir);
    }
    Ok(())
}

fn cmd_vgs(ctx: ToolContext) -> lvmcore::Result<()> {
    for name in ctx.cache.vgnames() {
        if name.is_empty() {
            continue;
        }
        println!("  {}", name);
    }
    Ok(())
}

fn cmd_vgcreate(_ctx: ToolContext, name: &str, devices: &[String], extent_size: u64) -> lvmcore::Result<()> {
    let id = Uuid::create()?;
    let mut vg = Vg::create(id, name, extent_size);
    vg.set_alloc_policy(AllocPolicy::Normal)?;

    for (i, path) in devices.iter().enumerate() {
        let mut dev = FileDevice::open(std::path::Path::new(path), true)?;
        let size = dev.size_bytes()?;
        if size < extent_size {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} is smaller than one extent", path),
            ));
        }
        let dev_id = lvmcore::device::DevId::new(8, i as u32);
        let pv = Pv::new(Uuid::create()?, dev_id, size, extent_size, extent_size);
        vg.pv_add(pv)?;
    }

    vg.check_invariants()?;
    println!("vg \"{}\" created with {} PV(s), {} extents free", vg.name, vg.pvs.len(), vg.free_count());
    Ok(())
}
