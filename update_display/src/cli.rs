//! Command line handling shared by both executables.

use std::{ffi::OsString, fs::File, path::PathBuf, str::FromStr};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::format::ImageSource;

#[derive(Debug, Parser)]
#[command(disable_help_flag = true, args_override_self = true)]
struct Args {
    #[arg(short = 'v', value_name = "VOLTAGE", allow_hyphen_values = true)]
    vcom: Option<String>,

    #[arg(short = 'f', value_name = "FILE", allow_hyphen_values = true)]
    file: Option<PathBuf>,

    #[arg(short = 'h')]
    help: bool,
}

/// VCOM code in millivolts, as the controller expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vcom(u16);

impl Vcom {
    pub fn millivolts(self) -> u16 {
        self.0
    }
}

impl FromStr for Vcom {
    type Err = ArgError;

    /// The sign is dropped, `-1.48` and `1.48` are both 1480 mV.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let volts: f64 = s.trim().parse().map_err(|_| ArgError::InvalidVcom)?;
        if volts == 0.0 || !volts.is_finite() {
            return Err(ArgError::InvalidVcom);
        }
        Ok(Self((volts.abs() * 1000.0) as u16))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArgError {
    #[error("{0}")]
    Syntax(String),
    #[error("No VCOM value specified.")]
    MissingVcom,
    #[error("Invalid VCOM value specified.")]
    InvalidVcom,
    #[error("Specified file does not exist or insufficient permissions ({}).", .0.display())]
    Unreadable(PathBuf),
}

impl ArgError {
    fn shows_usage(&self) -> bool {
        matches!(self, Self::Syntax(_) | Self::MissingVcom)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Update { vcom: Vcom, source: ImageSource },
}

/// Parses `args`, the first item being the program name.
pub fn parse<I, T>(args: I) -> Result<Command, ArgError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::try_parse_from(args).map_err(|e| {
        let rendered = e.to_string();
        let first = rendered.lines().next().unwrap_or_default();
        ArgError::Syntax(first.trim_start_matches("error: ").to_owned())
    })?;
    if args.help {
        return Ok(Command::Help);
    }

    let vcom: Vcom = args.vcom.ok_or(ArgError::MissingVcom)?.parse()?;
    if let Some(path) = &args.file {
        if File::open(path).is_err() {
            return Err(ArgError::Unreadable(path.clone()));
        }
    }
    Ok(Command::Update {
        vcom,
        source: ImageSource::new(args.file),
    })
}

/// Installs the stderr log subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}

/// Resolves the command line into either an exit status or work to do.
#[cfg(feature = "linux")]
fn resolve(
    profile: &crate::config::Profile,
    args: impl IntoIterator<Item = OsString>,
) -> Result<(Vcom, ImageSource), crate::display::ExitStatus> {
    use crate::display::ExitStatus;

    match parse(args) {
        Ok(Command::Help) => {
            print!("{}", profile.usage());
            Err(ExitStatus::Success)
        }
        Ok(Command::Update { vcom, source }) => Ok((vcom, source)),
        Err(e) => {
            eprintln!("{e}");
            if e.shows_usage() {
                eprint!("{}", profile.usage());
            }
            Err(ExitStatus::ArgumentError)
        }
    }
}

/// Entry point of both executables.
#[cfg(feature = "linux")]
pub fn main(profile: &crate::config::Profile) -> std::process::ExitCode {
    use tracing::{debug, error};

    use crate::{
        config::DeviceConfig,
        display::{self, ExitStatus},
        it8951::LinuxIt8951,
    };

    init_tracing();
    let (vcom, source) = match resolve(profile, std::env::args_os()) {
        Ok(work) => work,
        Err(status) => return status.into(),
    };
    debug!(vcom = vcom.millivolts(), ?source, "starting");

    let config = DeviceConfig::default();
    let mut epd = match LinuxIt8951::open(&config, vcom.millivolts()) {
        Ok(epd) => epd,
        Err(e) => {
            error!("failed to open the e-paper device: {e:#}");
            return ExitStatus::InitFailed.into();
        }
    };
    display::update(&mut epd, profile, &source).into()
}
