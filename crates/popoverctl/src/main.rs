use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use popover_core::config::{self, Config};
use popover_core::geometry::{compute_position, FALLBACK_SIZE};
use popover_core::ipc::{self, ClientMsg, DaemonMsg};
use popover_core::router::InputEvent;
use popover_core::{Mode, Placement, Rect, Size};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "popoverctl", about = "Compute placements and drive the popoverd daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve where an overlay lands next to a trigger
    Place {
        /// Trigger bounds as TOP,LEFT,WIDTH,HEIGHT
        #[arg(long, value_parser = parse_rect)]
        trigger: Rect,
        /// Preferred side (top, left, right, bottom)
        #[arg(long, default_value = "top")]
        placement: Placement,
        /// Overlay size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size, default_value = "200x40")]
        overlay: Size,
        #[arg(long, default_value_t = 8.0)]
        offset: f64,
        /// Viewport size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size, default_value = "1024x768")]
        viewport: Size,
        /// Keep the preferred side even if it overflows
        #[arg(long)]
        no_flip: bool,
        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file (defaults to the user config)
    Check {
        path: Option<PathBuf>,
    },
    /// Mount a trigger on the daemon and forward JSON input events from stdin
    Send {
        #[arg(long, default_value = "popoverctl")]
        id: String,
        /// Trigger bounds as TOP,LEFT,WIDTH,HEIGHT
        #[arg(long, value_parser = parse_rect)]
        trigger: Rect,
        /// Viewport size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size, default_value = "1024x768")]
        viewport: Size,
        /// Configuration file to mount with instead of the daemon's
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep the session open this long after stdin ends, for delayed timers
        #[arg(long, default_value_t = 500)]
        linger_ms: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Place {
            trigger,
            placement,
            overlay,
            offset,
            viewport,
            no_flip,
            json,
        } => {
            let layout = compute_position(&trigger, overlay, placement, offset, viewport, !no_flip);
            if json {
                println!("{}", serde_json::to_string(&layout).context("serializing layout")?);
            } else {
                println!("placement: {}", layout.placement);
                println!("  top:  {}", layout.position.top);
                println!("  left: {}", layout.position.left);
            }
        }
        Command::Check { path } => check(path)?,
        Command::Send {
            id,
            trigger,
            viewport,
            config,
            linger_ms,
        } => send(id, trigger, viewport, config, Duration::from_millis(linger_ms))?,
    }

    Ok(())
}

fn check(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&path)?;

    println!("{}", path.display());
    println!(
        "  offset: {}  flip: {}  fallback: {}x{}",
        config.general.offset,
        if config.general.disable_flip { "off" } else { "on" },
        config.general.fallback_width,
        config.general.fallback_height,
    );
    if config.placements.is_empty() {
        println!("  no popups defined");
        return Ok(());
    }

    let first_hover = config.placements.first_hover();
    for (placement, mode) in config.placements.pairs() {
        let note = match mode {
            Mode::Hover if Some(placement) != first_hover => "  (unreachable: only the first hover placement opens)",
            _ => "",
        };
        println!("  {:<6} {}{}", placement, mode, note);
    }

    let clicks = config.placements.placements_for(Mode::Click).count();
    if clicks > 1 {
        println!("  note: {} click placements, a click shows only the last one", clicks);
    }
    Ok(())
}

fn send(id: String, trigger: Rect, viewport: Size, config: Option<PathBuf>, linger: Duration) -> Result<()> {
    let config = config
        .map(|path| {
            std::fs::read_to_string(&path).with_context(|| format!("reading config from {}", path.display()))
        })
        .transpose()?;

    let socket_path = config::socket_path();
    let stream = UnixStream::connect(&socket_path)
        .with_context(|| format!("connecting to popoverd at {}\nIs the daemon running?", socket_path.display()))?;

    let mut writer = stream.try_clone().context("cloning stream")?;
    let reader = BufReader::new(stream);

    let replies = std::thread::spawn(move || -> Result<bool> {
        let mut ok = true;
        for line in reader.lines() {
            let line = line.context("reading response")?;
            match ipc::decode_daemon(&line) {
                Some(DaemonMsg::Ack { ok: false, message }) => {
                    eprintln!("error: {}", message);
                    ok = false;
                }
                Some(_) => println!("{}", line.trim()),
                None => {}
            }
        }
        Ok(ok)
    });

    let mount = ClientMsg::Mount {
        id,
        trigger,
        viewport,
        config,
    };
    writer.write_all(ipc::encode(&mount).as_bytes()).context("sending mount")?;

    for (n, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: InputEvent =
            serde_json::from_str(&line).with_context(|| format!("stdin line {}: not an input event", n + 1))?;
        writer
            .write_all(ipc::encode(&ClientMsg::Input { event }).as_bytes())
            .context("sending input")?;
    }

    std::thread::sleep(linger);
    writer.write_all(ipc::encode(&ClientMsg::Unmount).as_bytes()).context("sending unmount")?;
    writer.shutdown(std::net::Shutdown::Write).context("closing session")?;

    match replies.join() {
        Ok(result) => {
            if !result? {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(_) => bail!("reply reader panicked"),
    }
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in '{}': {}", s, e))?;
    match parts.as_slice() {
        [top, left, width, height] => Ok(Rect::new(*top, *left, *width, *height)),
        _ => Err(format!("expected TOP,LEFT,WIDTH,HEIGHT, got '{}'", s)),
    }
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = w.trim().parse::<f64>().map_err(|e| format!("invalid width '{}': {}", w, e))?;
    let height = h.trim().parse::<f64>().map_err(|e| format!("invalid height '{}': {}", h, e))?;
    if width < 0.0 || height < 0.0 {
        return Err(format!("negative size '{}'", s));
    }
    Ok(Size::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_parses_four_numbers() {
        assert_eq!(parse_rect("10, 20,80,30"), Ok(Rect::new(10.0, 20.0, 80.0, 30.0)));
        assert!(parse_rect("10,20,80").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn size_parses_w_by_h() {
        assert_eq!(parse_size("1024x768"), Ok(Size::new(1024.0, 768.0)));
        assert_eq!(parse_size("200X40"), Ok(FALLBACK_SIZE));
        assert!(parse_size("1024").is_err());
        assert!(parse_size("-1x10").is_err());
    }

    #[test]
    fn cli_defaults_match_library_defaults() {
        let cli = Cli::parse_from(["popoverctl", "place", "--trigger", "10,400,80,30"]);
        let Command::Place { overlay, offset, placement, .. } = cli.command else {
            panic!("expected place");
        };
        assert_eq!(overlay, FALLBACK_SIZE);
        assert_eq!(offset, Config::default().general.offset);
        assert_eq!(placement, Placement::Top);
    }
}
