use anyhow::{Context, Result};
use crossterm::{
    cursor::Show,
    event::{DisableBracketedPaste, EnableBracketedPaste, Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use crate::api::ChatBackend;
use crate::config::Config;
use crate::ui::conversation::{ConversationAction, ConversationManager};

type Tui = Terminal<CrosstermBackend<Stdout>>;

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).context("Failed to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Send panic reports to the log. A renderer panic is caught per entry and
/// must not print over the alternate screen.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "panic");
    }));
}

/// Leaves the alternate screen if `run` unwinds
struct TerminalGuard {
    log_path: PathBuf,
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableBracketedPaste, Show);
            eprintln!("parley crashed; details are in {}", self.log_path.display());
        }
    }
}

/// Run the interactive chat until the user quits
pub async fn run(config: Config, backend: Arc<dyn ChatBackend>) -> Result<()> {
    let mut terminal = setup_terminal()?;
    install_panic_hook();
    let guard = TerminalGuard {
        log_path: config.log_path(),
    };

    let result = event_loop(&mut terminal, &config, backend).await;

    drop(guard);
    let _ = panic::take_hook();
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(terminal: &mut Tui, config: &Config, backend: Arc<dyn ChatBackend>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut manager = ConversationManager::new(config, backend, tx);
    let mut input = EventStream::new();
    let mut ticker = interval(Duration::from_millis(300));

    tracing::info!(endpoint = %config.base_url, "chat session started");

    loop {
        terminal
            .draw(|frame| manager.render(frame))
            .context("Failed to draw frame")?;

        tokio::select! {
            maybe_event = input.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if manager.handle_key(key) == ConversationAction::Exit {
                            break;
                        }
                    }
                    Some(Ok(Event::Paste(text))) => manager.handle_paste(&text),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("Failed to read terminal event"),
                    None => break,
                }
            }
            Some(event) = rx.recv() => manager.handle_event(event),
            _ = ticker.tick() => manager.tick(),
        }
    }

    tracing::info!("chat session ended");
    Ok(())
}
