//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::core::backend::BackendRegistry;
use crate::core::config::Settings;
use crate::core::message::Message;
use crate::core::session::{SessionController, SessionEvent, SessionOptions};

/// Writes only the text that is new since the last render update.
///
/// Bubbles are separated by a blank line. `first_bubble` is the index of the
/// first reply in the conversation the session reports.
struct DeltaPrinter<W: Write> {
    out: W,
    first_bubble: usize,
    bubble: usize,
    printed: usize,
}

impl<W: Write> DeltaPrinter<W> {
    fn new(out: W, first_bubble: usize) -> Self {
        Self {
            out,
            first_bubble,
            bubble: 0,
            printed: 0,
        }
    }

    fn update(&mut self, conversation: &[Message]) -> io::Result<()> {
        let Some(bubbles) = conversation.get(self.first_bubble..) else {
            return Ok(());
        };
        for (index, message) in bubbles.iter().enumerate().skip(self.bubble) {
            if index > self.bubble {
                self.out.write_all(b"\n\n")?;
                self.bubble = index;
                self.printed = 0;
            }
            let content = message.content.as_str();
            if content.len() > self.printed && content.is_char_boundary(self.printed) {
                self.out.write_all(content[self.printed..].as_bytes())?;
                self.printed = content.len();
            }
        }
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

pub async fn run_say(prompt: Vec<String>, settings: Settings) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: ema say <prompt>");
        std::process::exit(1);
    }

    let registry = BackendRegistry::builtin(&settings);
    let mut controller =
        match SessionController::new(registry, SessionOptions::from_settings(&settings)) {
            Ok(controller) => controller,
            Err(err) => {
                eprintln!("❌ {err}");
                std::process::exit(1);
            }
        };

    // A fresh session reports the prompt first, then the replies.
    let mut printer = DeltaPrinter::new(io::stdout(), 1);
    let mut write_error: Option<io::Error> = None;
    let cancel = CancellationToken::new();
    let outcome = controller
        .submit(
            &prompt,
            &mut |event: SessionEvent| {
                if let SessionEvent::Render { conversation, .. } = event {
                    if write_error.is_none() {
                        write_error = printer.update(&conversation).err();
                    }
                }
            },
            &cancel,
        )
        .await;
    if let Some(err) = write_error {
        return Err(err.into());
    }
    printer.finish()?;

    if let Some(committed) = outcome.committed.filter(Message::is_error) {
        eprintln!("❌ {}", committed.title().unwrap_or("Error"));
        std::process::exit(1);
    }
    Ok(())
}
