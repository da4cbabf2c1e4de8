use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use light_protocol::light::{control_addr, send_report, set_light};
use light_schedule::point::{HOURS_PER_DAY, MAX_BRIGHTNESS};
use light_schedule::{compute_target, default_points, AnchorPoint};

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a brightness command to a fixture
    Set {
        /// Fixture address (host or host:port)
        host: String,
        /// Brightness 0..=100, or "off"
        #[arg(value_parser = parse_level)]
        level: u8,
    },
    /// Send a state report to the scheduler server, as a fixture would
    Report {
        /// Report listener address (host:port)
        server: String,
        #[arg(long)]
        id: u32,
        #[arg(long, value_parser = parse_level)]
        brightness: u8,
        #[arg(long, default_value_t = 0)]
        seq: u8,
    },
    /// Print the brightness curve of a schedule over one day
    Curve {
        /// Points as HOUR=BRIGHTNESS, the default schedule when omitted
        #[arg(value_parser = parse_point)]
        points: Vec<AnchorPoint>,
        /// Hours between printed rows
        #[arg(long, default_value_t = 1.0)]
        step: f64,
    },
}

fn parse_level(s: &str) -> Result<u8, String> {
    if s.eq_ignore_ascii_case("off") {
        return Ok(0);
    }
    match s.parse::<u8>() {
        Ok(level) if level <= MAX_BRIGHTNESS => Ok(level),
        _ => Err(format!("expected 0..=100 or \"off\", got {:?}", s)),
    }
}

fn parse_point(s: &str) -> Result<AnchorPoint, String> {
    let (hour, brightness) = s
        .split_once('=')
        .ok_or_else(|| format!("expected HOUR=BRIGHTNESS, got {:?}", s))?;
    let hour: f64 = hour.trim().parse().map_err(|_| format!("bad hour: {:?}", hour))?;
    let brightness: i64 = brightness
        .trim()
        .parse()
        .map_err(|_| format!("bad brightness: {:?}", brightness))?;
    AnchorPoint::validated(hour, brightness).map_err(|e| e.to_string())
}

fn print_curve(points: &[AnchorPoint], step: f64) -> Result<()> {
    if !step.is_finite() || step <= 0.0 {
        bail!("step must be positive, got {}", step);
    }
    let mut hour = 0.0;
    while hour < HOURS_PER_DAY {
        let brightness = compute_target(hour, points);
        println!(
            "{:5.2}h {:3}% {}",
            hour,
            brightness,
            "#".repeat(usize::from(brightness / 2))
        );
        hour += step;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Set { host, level } => {
            set_light(&host, level)?;
            if level == 0 {
                println!("Set off -> {}", control_addr(&host));
            } else {
                println!("Set {}% -> {}", level, control_addr(&host));
            }
        }
        Command::Report {
            server,
            id,
            brightness,
            seq,
        } => {
            send_report(&server, seq, id, brightness)?;
            println!("Reported device {} at {}% -> {}", id, brightness, server);
        }
        Command::Curve { points, step } => {
            let points = if points.is_empty() {
                default_points()
            } else {
                points
            };
            print_curve(&points, step)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(parse_level("off"), Ok(0));
        assert_eq!(parse_level("OFF"), Ok(0));
        assert_eq!(parse_level("0"), Ok(0));
        assert_eq!(parse_level("100"), Ok(100));
        assert!(parse_level("101").is_err());
        assert!(parse_level("-1").is_err());
        assert!(parse_level("dim").is_err());
    }

    #[test]
    fn points() {
        assert_eq!(parse_point("6.5=30"), Ok(AnchorPoint::new(6.5, 30)));
        assert_eq!(parse_point(" 23 = 15 "), Ok(AnchorPoint::new(23.0, 15)));
        assert!(parse_point("6.5").is_err());
        assert!(parse_point("25=10").is_err());
        assert!(parse_point("6=101").is_err());
    }

    #[test]
    fn curve_needs_positive_step() {
        assert!(print_curve(&default_points(), 0.0).is_err());
        assert!(print_curve(&default_points(), 6.0).is_ok());
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["light-set", "set", "esp-light0.local", "off"]).unwrap();
        assert!(matches!(args.command, Command::Set { level: 0, .. }));

        let args = Args::try_parse_from(["light-set", "curve", "0=10", "12=90", "--step", "0.5"]).unwrap();
        match args.command {
            Command::Curve { points, step } => {
                assert_eq!(points.len(), 2);
                assert_eq!(step, 0.5);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
