use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rba_cts::{config, LogSink, RunConfig};
use rba_gl::ApiType;
use rba_soft::{
    OutOfBoundsRead, OutOfBoundsWrite, Robustness, SoftConfig, SoftGl, ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR,
    KHR_ROBUST_BUFFER_ACCESS_BEHAVIOR,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Profile {
    /// Zero for every out-of-bounds read, every out-of-bounds write discarded.
    Conformant,
    /// Out-of-bounds accesses land on the nearest in-bounds element.
    ClampToEdge,
    /// Out-of-bounds indices wrap around the resource.
    Wrap,
    /// Accesses far past the end of a resource lose the context.
    LoseContext,
}

impl Profile {
    fn robustness(self) -> Robustness {
        let conformant = Robustness::conformant();
        match self {
            Self::Conformant => conformant,
            Self::ClampToEdge => Robustness {
                vertex_fetch: OutOfBoundsRead::ClampToEdge,
                texel_fetch: OutOfBoundsRead::ClampToEdge,
                image_load: OutOfBoundsRead::ClampToEdge,
                image_store: OutOfBoundsWrite::ClampToEdge,
                storage_load: OutOfBoundsRead::ClampToEdge,
                storage_store: OutOfBoundsWrite::ClampToEdge,
                uniform_load: OutOfBoundsRead::ClampToEdge,
                lose_context_beyond: None,
            },
            Self::Wrap => Robustness {
                vertex_fetch: OutOfBoundsRead::Wrap,
                texel_fetch: OutOfBoundsRead::Wrap,
                image_load: OutOfBoundsRead::Wrap,
                image_store: OutOfBoundsWrite::Wrap,
                storage_load: OutOfBoundsRead::Wrap,
                storage_store: OutOfBoundsWrite::Wrap,
                uniform_load: OutOfBoundsRead::Wrap,
                lose_context_beyond: None,
            },
            Self::LoseContext => Robustness {
                lose_context_beyond: Some(1 << 20),
                ..conformant
            },
        }
    }
}

/// Run the robust buffer access behavior tests against the software GL device.
#[derive(Parser, Debug)]
#[command(name = "rba-cts", about = "Robust buffer access behavior conformance tests")]
struct Args {
    /// Out-of-bounds behaviour of the software device.
    #[arg(long, value_enum, default_value_t = Profile::Conformant)]
    profile: Profile,

    /// Reported core profile version, e.g. `4.3`.
    #[arg(long, value_name = "MAJOR.MINOR", default_value = "4.5")]
    core: String,

    /// Do not advertise GL_KHR_robust_buffer_access_behavior.
    #[arg(long)]
    without_khr: bool,

    /// Do not advertise GL_ARB_robust_buffer_access_behavior.
    #[arg(long)]
    without_arb: bool,

    /// Only run tests whose name contains one of these substrings (comma separated).
    #[arg(long, value_name = "TERMS")]
    filter: Option<String>,

    /// Write a JSON report to this path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Exit with an error if any test fails.
    #[arg(long)]
    require_pass: bool,
}

fn parse_version(text: &str) -> anyhow::Result<(u32, u32)> {
    let (major, minor) = text
        .split_once('.')
        .with_context(|| format!("expected MAJOR.MINOR, got {text:?}"))?;
    Ok((
        major.trim().parse().context("invalid major version")?,
        minor.trim().parse().context("invalid minor version")?,
    ))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (major, minor) = parse_version(&args.core)?;

    let mut extensions = Vec::new();
    if !args.without_khr {
        extensions.push(KHR_ROBUST_BUFFER_ACCESS_BEHAVIOR.to_string());
    }
    if !args.without_arb {
        extensions.push(ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR.to_string());
    }
    let gl = SoftGl::new(SoftConfig {
        api: ApiType::core(major, minor),
        extensions,
        robustness: args.profile.robustness(),
        ..SoftConfig::default()
    });

    // Command line settings win over the environment.
    let mut run_config = RunConfig::from_env();
    if let Some(filter) = &args.filter {
        run_config.filter = config::parse_filter(filter);
    }
    if args.report.is_some() {
        run_config.report_path = args.report.clone();
    }
    run_config.require_pass |= args.require_pass;

    let report = rba_cts::run(&gl, &run_config, &mut LogSink)?;
    report.print_summary();

    if run_config.require_pass && report.failed() > 0 {
        bail!("{} of {} tests failed", report.failed(), report.tests.len());
    }
    Ok(())
}
