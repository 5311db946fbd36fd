//! cadence CLI: terminal player for a single track.
//!
//! Commands:
//!   cadence play <locator>     Load + play a file or URL, interactive
//!   cadence info <file>        Show tags and duration
//!   cadence check <locator>    Load without a device, print the outcome as JSON
//!
//! Options:
//!   --config <path>            Config file (default ~/.cadence/config.json)
//!
//! While playing, stdin takes one command per line:
//!   p  pause    r  resume    s  stop    g  play from start
//!   seek <secs>              q  quit

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::effects::decode::SymphoniaDecoder;
use cadence_core::effects::is_http_url;
use cadence_core::effects::manual::ManualEngine;
use cadence_core::effects::source::LocatorSource;
use cadence_core::metadata;
use cadence_core::{LoadOutcome, PlaybackController, PlaybackState, PlayerConfig};

fn main() {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = take_option(&mut args, "--config").map(PathBuf::from);
    if args.is_empty() {
        print_usage();
        return;
    }

    let config = PlayerConfig::load_or_default(config_path.unwrap_or_else(default_config_path))
        .with_env_overrides();

    let code = match args[0].as_str() {
        "play" => cmd_play(&config, &args[1..]),
        "info" => cmd_info(&args[1..]),
        "check" => cmd_check(&config, &args[1..]),
        other => {
            eprintln!("unknown command: {}", other);
            print_usage();
            2
        }
    };
    std::process::exit(code);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_play(config: &PlayerConfig, args: &[String]) -> i32 {
    let Some(locator) = args.first() else {
        eprintln!("usage: cadence play <locator>");
        return 2;
    };

    let player = PlaybackController::native(config);
    player.on_state_change(|state| log::debug!("cadence: state {}", state));

    match player.load_audio(locator).wait() {
        LoadOutcome::Loaded { .. } => {}
        LoadOutcome::Failed(e) => {
            eprintln!("load failed: {}", e);
            return 1;
        }
        LoadOutcome::Superseded => return 1,
    }

    let title = if is_http_url(locator) {
        locator.clone()
    } else {
        metadata::read_tags(locator).title
    };

    if let Err(e) = player.play(0.0) {
        eprintln!("play failed: {}", e);
        return 1;
    }

    let commands = spawn_stdin_reader();
    loop {
        match commands.recv_timeout(Duration::from_millis(250)) {
            Ok(line) => {
                if !run_command(&player, line.trim()) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // stdin closed: keep playing until the track ends.
                if player.state() != PlaybackState::Playing {
                    break;
                }
                std::thread::sleep(Duration::from_millis(250));
            }
        }

        print_progress(&title, &player);
        if player.state() == PlaybackState::Finished {
            break;
        }
    }
    println!();

    player.shutdown();
    0
}

fn cmd_info(args: &[String]) -> i32 {
    let Some(path) = args.first() else {
        eprintln!("usage: cadence info <file>");
        return 2;
    };
    if !std::path::Path::new(path).is_file() {
        eprintln!("not a file: {}", path);
        return 1;
    }

    let tags = metadata::read_tags(path);
    println!(
        "{} — {}",
        tags.title,
        tags.artist.as_deref().unwrap_or("Unknown")
    );
    if let Some(album) = &tags.album {
        println!("  album: {}", album);
    }
    if let Some(genre) = &tags.genre {
        println!("  genre: {}", genre);
    }
    match tags.duration_secs {
        Some(secs) => println!("  duration: {}", fmt_time(secs)),
        None => println!("  duration: unknown"),
    }
    0
}

/// Loads through the real source and decoder against a manual clock, so
/// it works without an output device.
fn cmd_check(config: &PlayerConfig, args: &[String]) -> i32 {
    let Some(locator) = args.first() else {
        eprintln!("usage: cadence check <locator>");
        return 2;
    };

    let player = PlaybackController::new(
        Arc::new(ManualEngine::new()),
        Arc::new(LocatorSource::new(config)),
        Arc::new(SymphoniaDecoder::new()),
        config,
    );
    let outcome = player.load_audio(locator).wait();

    let mut value = outcome.to_value();
    value["locator"] = serde_json::json!(locator);
    value["state"] = serde_json::json!(player.state());
    println!(
        "{}",
        serde_json::to_string_pretty(&value).unwrap_or_default()
    );

    if outcome.is_loaded() {
        0
    } else {
        1
    }
}

// ---------------------------------------------------------------------------
// Interactive
// ---------------------------------------------------------------------------

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Apply one stdin command. Returns false to quit.
fn run_command(player: &PlaybackController, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let result = match (parts.next(), parts.next()) {
        (None, _) => Ok(()),
        (Some("q"), _) => return false,
        (Some("p"), _) => player.pause(),
        (Some("r"), _) => player.resume(),
        (Some("s"), _) => player.stop(),
        (Some("g"), _) => player.play(0.0),
        (Some("seek"), Some(secs)) => match secs.parse::<f64>() {
            Ok(secs) => player.seek(secs),
            Err(_) => {
                eprintln!("\ninvalid seconds: {}", secs);
                Ok(())
            }
        },
        (Some(other), _) => {
            eprintln!("\nunknown command: {} (p r s g seek q)", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("\n{}", e);
    }
    true
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Remove `name <value>` from `args`, returning the value.
fn take_option(args: &mut Vec<String>, name: &str) -> Option<String> {
    let idx = args.iter().position(|a| a == name)?;
    if idx + 1 >= args.len() {
        args.remove(idx);
        eprintln!("{} needs a value", name);
        return None;
    }
    let value = args.remove(idx + 1);
    args.remove(idx);
    Some(value)
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".cadence").join("config.json")
}

fn print_progress(title: &str, player: &PlaybackController) {
    let bar_width = 30;
    let filled = ((player.progress() * bar_width as f64) as usize).min(bar_width);
    let empty = bar_width - filled;

    print!(
        "\r  {}  [{}{}] {} / {}  {}    ",
        title,
        "=".repeat(filled),
        " ".repeat(empty),
        fmt_time(player.elapsed()),
        fmt_time(player.duration()),
        player.state(),
    );
    std::io::stdout().flush().ok();
}

fn fmt_time(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn print_usage() {
    println!("cadence - terminal audio player");
    println!();
    println!("usage: cadence [--config <path>] <command> [args]");
    println!();
    println!("commands:");
    println!("  play <locator>         Load + play a file or URL");
    println!("  info <file>            Show tags and duration");
    println!("  check <locator>        Load and print the outcome as JSON");
    println!();
    println!("while playing: p pause, r resume, s stop, g restart, seek <secs>, q quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn take_option_extracts_value() {
        let mut a = args(&["--config", "c.json", "play", "x.mp3"]);
        assert_eq!(take_option(&mut a, "--config"), Some("c.json".into()));
        assert_eq!(a, args(&["play", "x.mp3"]));
    }

    #[test]
    fn take_option_missing_value() {
        let mut a = args(&["play", "--config"]);
        assert_eq!(take_option(&mut a, "--config"), None);
        assert_eq!(a, args(&["play"]));
        assert_eq!(take_option(&mut a, "--config"), None);
    }

    #[test]
    fn time_formatting() {
        assert_eq!(fmt_time(0.0), "0:00");
        assert_eq!(fmt_time(61.9), "1:01");
        assert_eq!(fmt_time(-3.0), "0:00");
    }
}
