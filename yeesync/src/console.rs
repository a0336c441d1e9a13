//! Line-oriented console over a [`DeviceSession`].

use std::sync::Arc;

use tracing::{info, warn};

use yeesync_core::{DeviceSession, ExecOutcome, SkipReason};

pub const HELP: &str = "\
commands:
  on | off | toggle        switch the bulb
  bright <1-100>           brightness (sync ceiling while syncing)
  ct <1700-6500>           colour temperature in kelvin
  sync on|off|toggle       ambient screen sync
  screen <name>            sync screen (empty = primary)
  screens                  list screens
  smooth <ms>              sync transition time
  fps <n>                  sync frames per second
  step <n>                 sync pixel sample step
  status                   show current state
  help                     this text
  quit                     stop sync and exit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Power(bool),
    TogglePower,
    Brightness(u8),
    ColorTemperature(u16),
    Sync(Option<bool>),
    Screen(String),
    Screens,
    Smooth(i64),
    Fps(u32),
    Step(u32),
    Status,
    Help,
    Quit,
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse a user-entered line. Blank lines yield `Ok(None)`.
pub fn parse_command(input: &str) -> Result<Option<ConsoleCommand>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "on" => ConsoleCommand::Power(true),
        "off" => ConsoleCommand::Power(false),
        "toggle" => ConsoleCommand::TogglePower,
        "bright" | "brightness" => ConsoleCommand::Brightness(number(word, rest)?),
        "ct" => ConsoleCommand::ColorTemperature(number(word, rest)?),
        "sync" => match rest.to_ascii_lowercase().as_str() {
            "on" | "start" => ConsoleCommand::Sync(Some(true)),
            "off" | "stop" => ConsoleCommand::Sync(Some(false)),
            "" | "toggle" => ConsoleCommand::Sync(None),
            other => return Err(format!("sync expects on, off or toggle, got '{other}'")),
        },
        "screen" => ConsoleCommand::Screen(rest.to_string()),
        "screens" => ConsoleCommand::Screens,
        "smooth" => ConsoleCommand::Smooth(number(word, rest)?),
        "fps" => ConsoleCommand::Fps(number(word, rest)?),
        "step" => ConsoleCommand::Step(number(word, rest)?),
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => return Err(format!("unknown command: '{word}' (try 'help')")),
    };
    Ok(Some(command))
}

fn number<T: std::str::FromStr>(word: &str, arg: &str) -> Result<T, String> {
    if arg.is_empty() {
        return Err(format!("{word} requires a number"));
    }
    arg.parse()
        .map_err(|_| format!("{word}: '{arg}' is not a valid number"))
}

/// Run `command` against `session`.
///
/// Setters are spawned and not awaited, the way a UI binding fires
/// them, so a command issued while another is in flight is dropped by
/// the session's gate.
pub fn dispatch(session: &Arc<DeviceSession>, command: ConsoleCommand) -> Flow {
    match command {
        ConsoleCommand::Power(on) => fire(session, move |s| async move { s.set_power(on).await }),
        ConsoleCommand::TogglePower => fire(session, |s| async move { s.toggle_power().await }),
        ConsoleCommand::Brightness(n) => fire(session, move |s| async move { s.set_brightness(n).await }),
        ConsoleCommand::ColorTemperature(k) => {
            fire(session, move |s| async move { s.set_color_temperature(k).await })
        }
        ConsoleCommand::Sync(Some(on)) => fire(session, move |s| async move { s.set_sync_running(on).await }),
        ConsoleCommand::Sync(None) => fire(session, |s| async move { s.toggle_sync().await }),
        ConsoleCommand::Screen(name) => fire(session, move |s| async move { s.set_screen(name).await }),
        ConsoleCommand::Smooth(ms) => fire(session, move |s| async move { s.set_smooth(ms).await }),
        ConsoleCommand::Fps(fps) => fire(session, move |s| async move { s.set_fps(fps).await }),
        ConsoleCommand::Step(step) => fire(session, move |s| async move { s.set_sample_step(step).await }),
        ConsoleCommand::Screens => {
            let screens = session.screens();
            if screens.is_empty() {
                println!("no screens available");
            }
            for screen in screens {
                let marker = if screen.primary { " (primary)" } else { "" };
                println!("  {}{marker}", screen.name);
            }
        }
        ConsoleCommand::Status => println!("{}", status(session)),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn fire<F, Fut>(session: &Arc<DeviceSession>, f: F)
where
    F: FnOnce(Arc<DeviceSession>) -> Fut,
    Fut: std::future::Future<Output = ExecOutcome> + Send + 'static,
{
    let fut = f(Arc::clone(session));
    tokio::spawn(async move {
        match fut.await {
            ExecOutcome::Skipped(SkipReason::Busy) => info!("busy, command dropped"),
            ExecOutcome::Skipped(SkipReason::NotReady) => warn!("session is not ready"),
            ExecOutcome::Done | ExecOutcome::Failed(_) => {}
        }
    });
}

/// One-line summary of session, light and sync state.
pub fn status(session: &DeviceSession) -> String {
    let light = session.light();
    let mut line = format!(
        "session {:?} | power {} | brightness {} | ct {}K",
        session.state(),
        if light.power { "on" } else { "off" },
        light.brightness,
        light.color_temperature,
    );
    if let Some(sync) = session.sync() {
        let cfg = sync.config();
        let screen = if cfg.screen.is_empty() { "primary" } else { cfg.screen.as_str() };
        line.push_str(&format!(
            " | sync {:?} on {screen} @ {} fps, {}% ceiling, {} ms smooth, step {}",
            sync.state(),
            cfg.fps,
            cfg.brightness,
            cfg.smoothing.as_millis(),
            cfg.sample_step,
        ));
    }
    line
}
