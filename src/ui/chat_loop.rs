//! Main chat event loop.
//!
//! The session controller lives behind an async mutex. Each turn runs in its
//! own task holding that lock and reports back over a channel, so the loop
//! keeps drawing and reading keys while a reply streams in.

use std::{error::Error, io, sync::Arc, time::Duration};

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::backend::BackendRegistry;
use crate::core::config::settings::Settings;
use crate::core::session::{SessionController, SessionEvent, SessionOptions};
use crate::ui::app::ChatView;
use crate::ui::renderer::ui;

const SCROLL_STEP: u16 = 1;

struct ChatLoop {
    controller: Arc<Mutex<SessionController>>,
    view: ChatView,
    tx: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
    /// Turns handed to the controller so far. Each spawned submit takes the
    /// next turn id, so this is an upper bound on ids already in flight.
    issued_turns: u64,
    turn_task: Option<JoinHandle<()>>,
}

impl ChatLoop {
    fn new(
        controller: SessionController,
        view: ChatView,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let issued_turns = controller.turn();
        let chat = Self {
            controller: Arc::new(Mutex::new(controller)),
            view,
            tx,
            cancel: CancellationToken::new(),
            issued_turns,
            turn_task: None,
        };
        (chat, rx)
    }

    fn submit(&mut self) {
        if self.view.busy {
            self.view.status = Some("Still replying, press Esc to stop".to_string());
            return;
        }
        let Some(text) = self.view.take_input() else {
            return;
        };

        self.view.busy = true;
        self.issued_turns += 1;
        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let controller = Arc::clone(&self.controller);
        let tx = self.tx.clone();
        self.turn_task = Some(tokio::spawn(async move {
            let mut controller = controller.lock_owned().await;
            let outcome = controller
                .submit(
                    &text,
                    &mut |event: SessionEvent| {
                        let _ = tx.send(event);
                    },
                    &cancel,
                )
                .await;
            debug!(turn = outcome.turn, cancelled = outcome.cancelled, "turn done");
        }));
    }

    fn stop(&mut self) {
        if self.view.busy {
            info!("stopping the current reply");
            self.cancel.cancel();
        }
    }

    /// Stops any reply in flight, then lets `action` change the session.
    ///
    /// A turn spawned but not yet started sees its token cancelled and
    /// writes nothing; its events fall under the reset's turn bound.
    async fn restart<F>(&mut self, action: F)
    where
        F: FnOnce(&mut SessionController) -> Option<String>,
    {
        self.cancel.cancel();
        let mut controller = self.controller.lock().await;
        let status = action(&mut *controller);
        self.view.reset(
            self.issued_turns.max(controller.turn()),
            controller.selected_backend(),
            controller.selected_display_name(),
        );
        self.view.status = status;
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => self.view.exit_requested = true,
            KeyCode::Char('l') if ctrl => {
                self.restart(|controller| {
                    controller.clear();
                    Some("Conversation cleared".to_string())
                })
                .await
            }
            KeyCode::Tab => {
                self.restart(|controller| match controller.select_next_backend() {
                    Ok(key) => Some(format!("Switched to {key}")),
                    Err(err) => Some(format!("❌ {err}")),
                })
                .await
            }
            KeyCode::Esc => self.stop(),
            KeyCode::Enter => self.submit(),
            KeyCode::Up => self.view.scroll_up(SCROLL_STEP),
            KeyCode::Down => self.view.scroll_down(SCROLL_STEP),
            KeyCode::PageUp => self.view.scroll_up(SCROLL_STEP * 10),
            KeyCode::PageDown => self.view.scroll_down(SCROLL_STEP * 10),
            KeyCode::Backspace => {
                self.view.input.pop();
            }
            KeyCode::Char(c) => self.view.input.push(c),
            _ => {}
        }
    }
}

pub async fn run_chat(settings: Settings) -> Result<(), Box<dyn Error>> {
    let registry = BackendRegistry::builtin(&settings);
    let mut controller = SessionController::new(registry, SessionOptions::from_settings(&settings))?;
    controller.mount();

    let view = ChatView::new(
        controller.selected_backend(),
        controller.selected_display_name(),
        controller.actor_label(),
        settings.avatar.clone(),
    );
    let (mut chat, mut rx) = ChatLoop::new(controller, view);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result: Result<(), Box<dyn Error>> = 'main_loop: loop {
        if chat.view.exit_requested {
            break 'main_loop Ok(());
        }
        if let Err(err) = terminal.draw(|f| ui(f, &chat.view)) {
            break 'main_loop Err(err.into());
        }

        match event::poll(Duration::from_millis(50)) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    chat.handle_key(key).await;
                }
                Ok(_) => {}
                Err(err) => break 'main_loop Err(err.into()),
            },
            Ok(false) => {}
            Err(err) => break 'main_loop Err(err.into()),
        }

        while let Ok(event) = rx.try_recv() {
            chat.view.apply_event(event);
        }
    };

    chat.cancel.cancel();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
