use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datafile::{ErrorPolicy, HeaderVersion};
use flash::{BlockDevice, DirFlash, EraseTiming, LogIndicator, MemFlash, SystemClock};
use tracing::{error, info};

mod config;
mod engine;
mod logging;

use config::LoggerConfig;
use engine::Logger;

#[derive(Parser, Debug)]
#[command(author, version, about = "Monthly sensor data files on serial flash", long_about = None)]
struct Cli {
    /// RON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory emulating the flash chip
    #[arg(long, global = true)]
    flash_dir: Option<PathBuf>,

    /// What to do when a record fails to transfer
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    /// Header revision of the files
    #[arg(long, global = true, value_enum)]
    header: Option<HeaderArg>,

    /// Dump every record
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print chip identification and size
    Info,
    /// Erase the whole chip
    Erase,
    /// Write one month of self-test records
    Write {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
        month: u8,
        /// Two-digit year
        #[arg(long, value_parser = clap::value_parser!(u16).range(0..=99))]
        year: u16,
    },
    /// Read a data file back and validate it
    Read { name: String },
    /// List files on the chip and validate each
    #[command(alias = "ls")]
    List,
    /// Write, read back and validate every month of the configured years
    Selftest {
        /// Erase the chip first
        #[arg(long)]
        erase: bool,
        /// Run against an in-memory chip instead of the flash directory
        #[arg(long)]
        memory: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Continue,
    Abort,
}

impl From<PolicyArg> for ErrorPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Continue => ErrorPolicy::ContinueOnError,
            PolicyArg::Abort => ErrorPolicy::AbortOnError,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HeaderArg {
    V1,
    V2,
}

impl From<HeaderArg> for HeaderVersion {
    fn from(arg: HeaderArg) -> Self {
        match arg {
            HeaderArg::V1 => HeaderVersion::V1,
            HeaderArg::V2 => HeaderVersion::V2,
        }
    }
}

impl Cli {
    /// Loads the config file (if any) and layers the command-line flags on top.
    fn load_config(&self) -> Result<LoggerConfig> {
        let mut cfg = match &self.config {
            Some(path) => LoggerConfig::from_file(path)?,
            None => LoggerConfig::default(),
        };
        if let Some(dir) = &self.flash_dir {
            cfg.flash_dir = dir.clone();
        }
        if let Some(policy) = self.policy {
            cfg.policy = policy.into();
        }
        if let Some(header) = self.header {
            cfg.layout.version = header.into();
        }
        cfg.verbose |= self.verbose;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = match cli.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("flashlog: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(cfg.verbose) {
        eprintln!("flashlog: {e:#}");
        return ExitCode::FAILURE;
    }

    match dispatch(&cli.command, &cfg) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Picks the chip and runs the command. `Ok(false)` means validation failed.
fn dispatch(command: &Command, cfg: &LoggerConfig) -> Result<bool> {
    if let Command::Selftest { memory: true, .. } = command {
        let mut chip = MemFlash::new(cfg.capacity, cfg.block_size);
        return run(&mut chip, command, cfg);
    }
    let mut chip = DirFlash::open(&cfg.flash_dir, cfg.capacity, cfg.block_size)?;
    run(&mut chip, command, cfg)
}

fn run<D: BlockDevice + ?Sized>(device: &mut D, command: &Command, cfg: &LoggerConfig) -> Result<bool> {
    let mut logger = Logger::new(device, cfg.layout, cfg.policy, cfg.filler);
    let chip = logger.bring_up()?;

    match command {
        Command::Info => {
            println!("Read Chip Identification:\n{chip}");
            Ok(true)
        }
        Command::Erase => {
            erase(&mut logger)?;
            Ok(true)
        }
        Command::Write { month, year } => {
            let summary = logger.write_test_month(*month, *year)?;
            println!(
                "{}: {} records at 0x{:08x}",
                summary.name, summary.records_written, summary.address
            );
            Ok(summary.failed_records.is_empty())
        }
        Command::Read { name } => {
            let report = logger.check_file(name)?;
            println!(
                "{}: {} records checked, {} mismatches, {} unreadable, {} missing",
                report.name,
                report.records_checked,
                report.mismatches.len(),
                report.failed_records.len(),
                report.missing_records
            );
            Ok(report.is_clean())
        }
        Command::List => {
            let checks = logger.check_all()?;
            let mut clean = true;
            for check in &checks {
                let status = match &check.report {
                    Ok(r) if r.is_clean() => "ok".to_string(),
                    Ok(r) => format!("{} mismatches", r.mismatches.len() + r.failed_records.len()),
                    Err(e) => e.clone(),
                };
                clean &= check.is_clean();
                println!(
                    "{:>20}: {:>8} bytes at 0x{:08x}  {}",
                    check.entry.name, check.entry.size, check.entry.address, status
                );
            }
            Ok(clean)
        }
        Command::Selftest { erase: wipe, .. } => {
            if *wipe {
                erase(&mut logger)?;
            }
            let report = logger.self_test(cfg.years())?;
            info!(
                files = report.written.len(),
                mismatches = report.mismatch_count(),
                "self test finished"
            );
            if !report.write_failures.is_empty() {
                bail!("self test could not write: {}", report.write_failures.join(", "));
            }
            Ok(report.is_clean())
        }
    }
}

fn erase<D: BlockDevice + ?Sized>(logger: &mut Logger<'_, D>) -> Result<()> {
    let mut led = LogIndicator::new(true);
    let mut clock = SystemClock::new();
    let stats = logger.erase(&mut led, &mut clock, EraseTiming::default())?;
    println!("erased in {} ms", stats.elapsed_ms);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() -> Result<()> {
        let cli = Cli::try_parse_from([
            "flashlog",
            "--policy",
            "abort",
            "--header",
            "v1",
            "--flash-dir",
            "/tmp/x",
            "write",
            "--month",
            "2",
            "--year",
            "24",
        ])?;
        let cfg = cli.load_config()?;
        assert_eq!(cfg.policy, ErrorPolicy::AbortOnError);
        assert_eq!(cfg.layout.version, HeaderVersion::V1);
        assert_eq!(cfg.flash_dir, PathBuf::from("/tmp/x"));
        assert!(matches!(cli.command, Command::Write { month: 2, year: 24 }));
        Ok(())
    }

    #[test]
    fn month_range_is_checked() {
        assert!(Cli::try_parse_from(["flashlog", "write", "--month", "13", "--year", "24"]).is_err());
        assert!(Cli::try_parse_from(["flashlog", "write", "--month", "1", "--year", "100"]).is_err());
    }

    #[test]
    fn in_memory_self_test_passes() -> Result<()> {
        let cli = Cli::try_parse_from(["flashlog", "selftest", "--memory"])?;
        let cfg = cli.load_config()?;
        assert!(dispatch(&cli.command, &cfg)?);
        Ok(())
    }
}
