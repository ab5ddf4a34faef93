//! The skymount daemon: parse the command line, load the namespace,
//! and serve it over FUSE until unmounted.
//!
//! Exit codes: 0 on clean unmount, 1 on setup failure (bad manifest,
//! missing credentials, database trouble), 2 on a runtime panic.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skymount_client::{ApiConfig, HttpPlatformClient, PlatformClient};
use skymount_model::Manifest;
use skymount_vfs::{prepare, MountOptions, SkyFilesystem};

#[derive(Parser, Debug)]
#[command(
    name = "skymount",
    version,
    about = "Mount remote projects as a local filesystem"
)]
struct Args {
    /// Directory to attach the filesystem at.
    mountpoint: PathBuf,

    /// Projects to mount, each at /<ProjectName>.
    #[arg(conflicts_with = "manifest")]
    projects: Vec<String>,

    /// Mount the namespace described by a JSON manifest instead.
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Verbosity: 0 warnings, 1 info, 2 debug, 3+ trace.
    #[arg(long, short, default_value_t = 0)]
    verbose: u8,

    /// Owner uid reported for every node (default: the daemon's).
    #[arg(long)]
    uid: Option<u32>,

    /// Owner gid reported for every node (default: the daemon's).
    #[arg(long)]
    gid: Option<u32>,

    /// Refuse all writes regardless of project access levels.
    #[arg(long = "read-only")]
    read_only: bool,

    /// Ask the FUSE library to log protocol traffic.
    #[arg(long = "debug-fuse")]
    debug_fuse: bool,

    /// Metadata database location.
    #[arg(long, value_name = "FILE")]
    db_path: Option<PathBuf>,
}

fn init_logging(verbose: u8, debug_fuse: bool) {
    let mut default: String = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
    .to_string();
    if debug_fuse {
        default.push_str(",fuser=debug");
    }
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn load_manifest(args: &Args, client: &dyn PlatformClient) -> anyhow::Result<Manifest> {
    let mut manifest: Manifest = match &args.manifest {
        Some(path) => Manifest::from_file(path)
            .with_context(|| format!("loading manifest {}", path.display()))?,
        None => {
            if args.projects.is_empty() {
                bail!("nothing to mount: give project ids or --manifest");
            }
            Manifest::from_project_ids(client, &args.projects)
                .await
                .context("describing projects")?
        }
    };
    manifest
        .fill_missing(client)
        .await
        .context("filling in manifest fields")?;
    Ok(manifest)
}

async fn setup(args: &Args) -> anyhow::Result<SkyFilesystem> {
    let config: ApiConfig = ApiConfig::from_env().context("platform credentials")?;
    let client: Arc<dyn PlatformClient> =
        Arc::new(HttpPlatformClient::new(config).context("building HTTP client")?);

    let manifest: Manifest = load_manifest(args, client.as_ref()).await?;

    let mut options: MountOptions = MountOptions::default().with_read_only(args.read_only);
    if let Some(uid) = args.uid {
        options.uid = uid;
    }
    if let Some(gid) = args.gid {
        options.gid = gid;
    }
    options.debug_fuse = args.debug_fuse;
    if let Some(db_path) = &args.db_path {
        options.db_path = db_path.clone();
    }

    prepare(&manifest, client, options).await.context("preparing mount")
}

fn main() {
    // A panic anywhere in the daemon is exit code 2, distinct from
    // setup failures (1) and clean unmounts (0).
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        process::exit(2);
    }));

    let args: Args = Args::parse();
    init_logging(args.verbose, args.debug_fuse);

    let runtime: tokio::runtime::Runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("skymount: failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    let fs: SkyFilesystem = match runtime.block_on(setup(&args)) {
        Ok(fs) => fs,
        Err(e) => {
            error!("mount setup failed: {:#}", e);
            eprintln!("skymount: {:#}", e);
            process::exit(1);
        }
    };

    info!(mountpoint = %args.mountpoint.display(), "mounting");
    // The FUSE loop owns this thread until unmount; callbacks bridge
    // into the runtime kept alive above.
    if let Err(e) = skymount_vfs::mount(fs, &args.mountpoint) {
        error!("mount failed: {}", e);
        eprintln!("skymount: {}", e);
        process::exit(1);
    }
    info!("unmounted cleanly");
}
