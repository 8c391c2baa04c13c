//! Interactive bench console
//!
//! Reads commands from stdin and plays the remote side of the simulated
//! engine (and, in `--simulate` mode, the button). Lines are read on a plain
//! thread so a pending read never holds up runtime shutdown.

use std::io::BufRead;
use std::str::FromStr;
use std::time::Duration;

use doorbell_core::sim::{ScriptedPin, SimulatedEngine};
use doorbell_core::{DoorbellEvent, SignalingEngine, TimedEvent};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long `tap` holds the button down
const TAP_HOLD: Duration = Duration::from_millis(100);

const HELP: &str = "\
commands:
  call <address>   a remote party calls the doorbell
  answer           the owner picks up the doorbell's call
  hangup           the remote party hangs up
  fail [reason]    the active call fails in the engine
  press            hold the doorbell button down
  release          let go of the button
  tap              press and release the button
  status           show engine and button state
  quit             shut the doorbell down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Call(String),
    Answer,
    Hangup,
    Fail(Option<String>),
    Press,
    Release,
    Tap,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match (word.to_lowercase().as_str(), rest) {
            ("call", "") => Err("usage: call <address>".to_string()),
            ("call", address) => Ok(Command::Call(address.to_string())),
            ("answer", "") => Ok(Command::Answer),
            ("hangup", "") => Ok(Command::Hangup),
            ("fail", "") => Ok(Command::Fail(None)),
            ("fail", reason) => Ok(Command::Fail(Some(reason.to_string()))),
            ("press", "") => Ok(Command::Press),
            ("release", "") => Ok(Command::Release),
            ("tap", "") => Ok(Command::Tap),
            ("status", "") => Ok(Command::Status),
            ("help" | "?", "") => Ok(Command::Help),
            ("quit" | "exit", "") => Ok(Command::Quit),
            _ => Err(format!("unknown command: {} (try 'help')", line)),
        }
    }
}

/// Console driving the simulated collaborators
pub struct Console {
    engine: SimulatedEngine,
    button: Option<ScriptedPin>,
    shutdown: CancellationToken,
}

impl Console {
    pub fn new(engine: SimulatedEngine, button: Option<ScriptedPin>, shutdown: CancellationToken) -> Self {
        Self {
            engine,
            button,
            shutdown,
        }
    }

    /// Read and execute commands until `quit`, end of input or shutdown
    pub async fn run(self) {
        let mut lines = spawn_stdin_reader();
        println!("{}", HELP);

        loop {
            let line = tokio::select! {
                line = lines.recv() => line,
                _ = self.shutdown.cancelled() => break,
            };
            let Some(line) = line else {
                debug!("Console input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<Command>() {
                Ok(Command::Quit) => {
                    self.shutdown.cancel();
                    break;
                }
                Ok(command) => self.execute(command).await,
                Err(message) => println!("{}", message),
            }
        }
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Call(address) => {
                let call_id = self.engine.incoming_call(address.clone());
                println!("{} is calling ({})", address, call_id);
            }
            Command::Answer => report(self.engine.remote_answer(), "no outbound call to answer"),
            Command::Hangup => report(self.engine.remote_hangup(), "no active call"),
            Command::Fail(reason) => {
                let reason = reason.unwrap_or_else(|| "simulated failure".to_string());
                report(self.engine.fail_active_call(reason), "no active call");
            }
            Command::Press => self.with_button(|pin| pin.press()),
            Command::Release => self.with_button(|pin| pin.release()),
            Command::Tap => {
                self.with_button(|pin| pin.press());
                tokio::time::sleep(TAP_HOLD).await;
                self.with_button(|pin| pin.release());
            }
            Command::Status => self.print_status(),
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    fn with_button(&self, action: impl FnOnce(&ScriptedPin)) {
        match &self.button {
            Some(pin) => action(pin),
            None => println!("the button is wired to hardware; run with --simulate to script it"),
        }
    }

    fn print_status(&self) {
        for line in self.status_lines() {
            println!("{}", line);
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let call = self
            .engine
            .active_remote()
            .unwrap_or_else(|| "none".to_string());
        let mut lines = vec![
            format!("identity: {}", self.engine.identity().unwrap_or("(not configured)")),
            format!("in call: {} (remote: {})", self.engine.is_in_call(), call),
            format!("invites: {:?}", self.engine.invites()),
            format!("messages: {}", self.engine.messages().len()),
            format!("declined: {}", self.engine.declined().len()),
        ];
        if let Some(pin) = &self.button {
            use doorbell_core::InputPin;
            lines.push(match pin.read_level() {
                Ok(level) => format!("button: {:?}", level),
                Err(e) => format!("button: {}", e),
            });
        }
        lines
    }
}

fn report(done: bool, otherwise: &str) {
    if !done {
        println!("{}", otherwise);
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print doorbell events to the console as they happen
pub async fn print_events(mut events: broadcast::Receiver<TimedEvent>) {
    loop {
        match events.recv().await {
            Ok(timed) => println!("[{}] {}", timed.timestamp.format("%H:%M:%S%.3f"), describe(&timed.event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => println!("({} events missed)", missed),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(event: &DoorbellEvent) -> String {
    match event {
        DoorbellEvent::ButtonPressed { count } => format!("button pressed (#{})", count + 1),
        DoorbellEvent::PressIgnored => "button pressed during a call; ignored".to_string(),
        DoorbellEvent::OutboundCallPlaced { callee, .. } => format!("calling {}", callee),
        DoorbellEvent::InboundAdmitted { caller, .. } => format!("accepted call from {}", caller),
        DoorbellEvent::InboundDeclined { caller, .. } => format!("declined call from {}", caller),
        DoorbellEvent::OwnerNotified { recipient, caller } => {
            format!("told {} about {}", recipient, caller)
        }
        DoorbellEvent::NotificationFailed { recipient, reason } => {
            format!("could not notify {}: {}", recipient, reason)
        }
        DoorbellEvent::CallStateObserved { state, .. } => format!("engine: {}", state),
        DoorbellEvent::CallEnded { outcome, .. } => format!("call {}", outcome),
        DoorbellEvent::CueFinished { clip, ok } => {
            format!("ring cue {} {}", clip.display(), if *ok { "played" } else { "failed" })
        }
        DoorbellEvent::ShuttingDown => "shutting down".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "call sip:stranger@x".parse::<Command>(),
            Ok(Command::Call("sip:stranger@x".to_string()))
        );
        assert_eq!("  TAP ".parse::<Command>(), Ok(Command::Tap));
        assert_eq!("fail".parse::<Command>(), Ok(Command::Fail(None)));
        assert_eq!(
            "fail 486 Busy Here".parse::<Command>(),
            Ok(Command::Fail(Some("486 Busy Here".to_string())))
        );
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("call".parse::<Command>().is_err());
        assert!("press hard".parse::<Command>().is_err());
        assert!("ring".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn test_execute_drives_simulated_engine() {
        let engine = SimulatedEngine::new();
        let pin = ScriptedPin::new(17);
        let console = Console::new(engine.clone(), Some(pin.clone()), CancellationToken::new());

        console.execute(Command::Call("friend@x".to_string())).await;
        assert_eq!(engine.active_remote().as_deref(), Some("friend@x"));

        console.execute(Command::Hangup).await;
        assert!(engine.active_remote().is_none());

        console.execute(Command::Press).await;
        assert_eq!(
            doorbell_core::InputPin::read_level(&pin).unwrap(),
            doorbell_core::Level::Asserted
        );
        console.execute(Command::Tap).await;
        assert_eq!(
            doorbell_core::InputPin::read_level(&pin).unwrap(),
            doorbell_core::Level::Released
        );
    }

    #[test]
    fn test_status_reports_identity() {
        let settings = doorbell_core::EngineSettings {
            identity: Some("sip:doorbell@sip.example.org".to_string()),
            ..Default::default()
        };
        let console = Console::new(SimulatedEngine::with_settings(settings), None, CancellationToken::new());
        let lines = console.status_lines();
        assert_eq!(lines[0], "identity: sip:doorbell@sip.example.org");
        assert_eq!(lines.len(), 5);

        let console = Console::new(SimulatedEngine::new(), Some(ScriptedPin::new(17)), CancellationToken::new());
        let lines = console.status_lines();
        assert_eq!(lines[0], "identity: (not configured)");
        assert_eq!(lines.last().map(String::as_str), Some("button: Released"));
    }
}
