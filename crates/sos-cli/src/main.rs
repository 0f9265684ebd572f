//! `sos` binary: boot a kernel over a host directory, start every app
//! bundle, optionally run a kernel entry point, and report what happened.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use sos_engine::ProgramLibrary;
use sos_kernel::{Kernel, KernelConfig};
use sos_kmod::{FilesModule, LoggerModule};
use sos_vfs::{OsFs, SharedVfs};

#[derive(Parser, Debug)]
#[command(name = "sos", version, about = "Multi-tenant script runtime kernel")]
struct Cli {
    /// Host directory backing the kernel filesystem (env: SOS_ROOT)
    #[arg(short = 'r', long, env = "SOS_ROOT")]
    root: PathBuf,

    /// Kernel entry-point script, resolved against the kernel filesystem
    #[arg(short = 'e', long)]
    entrypoint: Option<String>,

    /// Verbose kernel load tracing
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let filesystem: SharedVfs = Rc::new(OsFs::new(&cli.root));

    let mut config = KernelConfig::new(sos_engine::factory(ProgramLibrary::new()))
        .with_kernel_module(LoggerModule::new())
        .with_kernel_module(FilesModule::new());
    config.kernel_debug = cli.debug;

    let kernel = Kernel::boot(filesystem, config)
        .with_context(|| format!("boot kernel over {}", cli.root.display()))?;

    kernel.start().context("start bundles")?;

    if let Some(entrypoint) = &cli.entrypoint {
        kernel
            .run_entry_point(entrypoint)
            .with_context(|| format!("run entry point {entrypoint}"))?;
    }

    for bundle in kernel.bundles() {
        info!(
            "sos: bundle '{}' ({}) is {}",
            bundle.name(),
            bundle.id(),
            bundle.status()
        );
    }

    kernel.stop().context("stop kernel")?;
    Ok(())
}
