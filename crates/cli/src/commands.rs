use std::sync::Arc;

use anyhow::{Context, Result};

use datashed_cas::ChunkStore;
use datashed_store::{LocalStore, ObjectStore};
use datashed_vfs::Bundle;

use crate::cli::{BundleCommand, Cli, Command, MountArgs};

pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Bundle(bundle) => match bundle.command {
            BundleCommand::Mount(args) => run_mount(args),
        },
    }
}

fn run_mount(args: MountArgs) -> Result<()> {
    // The FUSE callbacks block on this runtime from their own threads, so
    // the mount itself must be driven from outside the async context.
    let runtime: tokio::runtime::Runtime =
        tokio::runtime::Runtime::new().context("starting runtime")?;

    if !args.meta.exists() {
        anyhow::bail!("metadata store not found: {}", args.meta.display());
    }
    if !args.blob.exists() {
        anyhow::bail!("blob store not found: {}", args.blob.display());
    }

    let meta = LocalStore::new(&args.meta);
    let blob: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(&args.blob));
    let cas: ChunkStore = ChunkStore::new(blob);

    let bundle: Bundle = runtime
        .block_on(Bundle::load(&meta, cas, &args.repo, args.bundle.as_deref()))
        .with_context(|| format!("loading bundle from repo {}", args.repo))?;

    tracing::info!(
        repo = %args.repo,
        bundle = %bundle.descriptor().id,
        entries = bundle.descriptor().entries.len(),
        destination = %args.destination.display(),
        "mounting bundle"
    );

    mount_and_wait(bundle, &args, &runtime)
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
fn mount_and_wait(
    bundle: Bundle,
    args: &MountArgs,
    runtime: &tokio::runtime::Runtime,
) -> Result<()> {
    use datashed_vfs::{mount_read_only, BundleFs, MountOptions};

    if !args.destination.exists() {
        std::fs::create_dir_all(&args.destination).with_context(|| {
            format!("creating mountpoint {}", args.destination.display())
        })?;
    }

    let options: MountOptions = MountOptions::default().with_owner(args.uid, args.gid);
    let fs: BundleFs =
        BundleFs::new(bundle, options, runtime.handle().clone()).context("building filesystem")?;
    let handle = mount_read_only(fs, &args.destination).context("mounting filesystem")?;

    tracing::info!(
        destination = %args.destination.display(),
        "bundle mounted, press ctrl-c to unmount"
    );
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for interrupt")?;

    handle.unmount();
    Ok(())
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
fn mount_and_wait(
    _bundle: Bundle,
    _args: &MountArgs,
    _runtime: &tokio::runtime::Runtime,
) -> Result<()> {
    anyhow::bail!("this build has no FUSE support; rebuild with --features fuse on Linux")
}
