//! `tclab` command-line tool: list ports, scan, drive heaters and log runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tclab::config::{LabConfig, DEFAULT_CONFIG_PATH};
use tclab::discovery;
use tclab::{Historian, Lab, SystemClock, TCLab, TCLabModel, Ticker};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tclab")]
#[command(about = "Temperature Control Lab client - read sensors, drive heaters, log runs", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port name (or pattern) of the board; overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Use the simulated lab instead of hardware
    #[arg(long)]
    sim: bool,

    /// Simulation speedup factor; overrides the config file
    #[arg(long)]
    speedup: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and identify TCLab boards
    Ports,
    /// Print one scan: T1 T2 Q1 Q2
    Scan,
    /// Set heater outputs, then print a scan
    Heat {
        /// Heater 1 output in percent
        #[arg(long)]
        q1: Option<f64>,
        /// Heater 2 output in percent
        #[arg(long)]
        q2: Option<f64>,
    },
    /// Drive the LED at a percentage
    Led {
        /// LED level in percent
        value: f64,
    },
    /// Hold heater outputs and record scans at a fixed period
    Log {
        /// Run length in seconds of lab time
        #[arg(short, long, default_value_t = 60.0)]
        duration: f64,
        /// Sampling period in seconds of lab time
        #[arg(long, default_value_t = 1.0)]
        period: f64,
        /// Heater 1 output in percent
        #[arg(long, default_value_t = 0.0)]
        q1: f64,
        /// Heater 2 output in percent
        #[arg(long, default_value_t = 0.0)]
        q2: f64,
        /// CSV file to write the record to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<LabConfig> {
    let mut config = LabConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    if let Some(port) = &cli.port {
        config.connection.port = port.clone();
    }
    if let Some(speedup) = cli.speedup {
        config.model.speedup = speedup;
    }
    config.validate().context("Invalid command-line overrides")?;
    Ok(config)
}

fn check_log_timing(duration: f64, period: f64) -> Result<()> {
    anyhow::ensure!(
        period.is_finite() && period > 0.0,
        "--period must be a positive number of seconds, got {period}"
    );
    anyhow::ensure!(
        duration.is_finite() && duration >= 0.0,
        "--duration must be a non-negative number of seconds, got {duration}"
    );
    Ok(())
}

fn open_lab(cli: &Cli, config: &LabConfig) -> Result<(Box<dyn Lab>, SystemClock)> {
    if cli.sim {
        let model = TCLabModel::from_config(config);
        let clock = model.clock().clone();
        Ok((Box::new(model), clock))
    } else {
        let lab = TCLab::from_config(config).context("Failed to connect to TCLab")?;
        println!("{} ({}) on {}", lab.device(), lab.version(), lab.port());
        Ok((Box::new(lab), SystemClock::new()))
    }
}

fn list_ports() -> Result<()> {
    let ports = discovery::available()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        let label = match &port.usb {
            Some(_) => discovery::find_arduino(Some(&port.name), &ports)?.device,
            None => "not a USB device".to_string(),
        };
        println!("{}\t{}", port.name, label);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    match &cli.command {
        Commands::Ports => return list_ports(),
        Commands::Log {
            duration, period, ..
        } => check_log_timing(*duration, *period)?,
        _ => {}
    }

    let (mut lab, clock) = open_lab(&cli, &config)?;

    match &cli.command {
        Commands::Ports => {}
        Commands::Scan => {
            let scan = lab.scan()?;
            println!("{} {} {} {}", scan.t1, scan.t2, scan.q1, scan.q2);
        }
        Commands::Heat { q1, q2 } => {
            if let Some(q1) = q1 {
                println!("Q1 = {}", lab.set_q1(*q1)?);
            }
            if let Some(q2) = q2 {
                println!("Q2 = {}", lab.set_q2(*q2)?);
            }
            let scan = lab.scan()?;
            println!("{} {} {} {}", scan.t1, scan.t2, scan.q1, scan.q2);
        }
        Commands::Led { value } => {
            println!("LED = {}", lab.led(*value)?);
        }
        Commands::Log {
            duration,
            period,
            q1,
            q2,
            output,
        } => {
            lab.set_q1(*q1)?;
            lab.set_q2(*q2)?;
            info!("Logging for {} s every {} s", duration, period);

            let mut historian = Historian::new();
            println!("Time\tT1\tT2\tQ1\tQ2");
            for t in Ticker::new(&clock, *period).until(*duration) {
                let scan = historian.update(&mut lab, t)?;
                println!(
                    "{:.1}\t{:.2}\t{:.2}\t{:.1}\t{:.1}",
                    t, scan.t1, scan.t2, scan.q1, scan.q2
                );
            }

            if let Some(path) = output {
                historian
                    .to_csv(path)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Wrote {} records to {}", historian.len(), path.display());
            }
        }
    }

    lab.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_timing_rejects_non_positive_period() {
        assert!(check_log_timing(60.0, 1.0).is_ok());
        assert!(check_log_timing(0.0, 0.5).is_ok());
        assert!(check_log_timing(60.0, 0.0).is_err());
        assert!(check_log_timing(60.0, -1.0).is_err());
        assert!(check_log_timing(60.0, f64::NAN).is_err());
    }

    #[test]
    fn test_log_timing_rejects_negative_duration() {
        let err = check_log_timing(-5.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("--duration"));
    }

    #[test]
    fn test_cli_parses_log_options() {
        let cli = Cli::try_parse_from([
            "tclab", "--sim", "log", "--period", "0", "--duration", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Log {
                duration, period, ..
            } => assert!(check_log_timing(duration, period).is_err()),
            _ => panic!("expected log subcommand"),
        }
    }
}
