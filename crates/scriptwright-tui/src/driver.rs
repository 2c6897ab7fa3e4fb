use scriptwright_core::{Decision, PathPicker, Session};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Requests from the interface to the task that owns the session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `None` means the user dismissed the folder prompt
    SelectFolder(Option<PathBuf>),
    Send(String),
    Act { message_id: String, decision: Decision },
    DisplayScript(String),
}

/// Run `session` until every command sender is dropped. Chat submissions and
/// suggestion actions that arrive while one is being handled are dropped, the
/// same as the session refusing input while busy.
pub fn spawn(session: Session, commands: mpsc::UnboundedReceiver<Command>) -> JoinHandle<Session> {
    tokio::spawn(run(session, commands))
}

pub async fn run(mut session: Session, mut commands: mpsc::UnboundedReceiver<Command>) -> Session {
    while let Some(command) = commands.recv().await {
        match command {
            Command::SelectFolder(path) => {
                session.select(&mut PathPicker::new(path)).await;
            }
            Command::Send(text) => {
                let outcome = session.send_message(&text).await;
                debug!(?outcome, "message handled");
                discard_stale_submissions(&mut session, &mut commands).await;
            }
            Command::Act { message_id, decision } => {
                let outcome = session.act(&message_id, decision).await;
                debug!(?outcome, "suggestion action handled");
                discard_stale_submissions(&mut session, &mut commands).await;
            }
            Command::DisplayScript(name) => display(&mut session, &name),
        }
    }
    session
}

fn display(session: &mut Session, name: &str) {
    if !session.display_script(name) {
        debug!(%name, "script not in snapshot");
    }
}

/// Drain what queued up during a request. Submissions made against a busy
/// session are dropped; navigation still applies in order.
async fn discard_stale_submissions(session: &mut Session, commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Ok(command) = commands.try_recv() {
        match command {
            Command::Send(_) | Command::Act { .. } => {
                debug!(?command, "dropped input sent while busy");
            }
            Command::SelectFolder(path) => {
                session.select(&mut PathPicker::new(path)).await;
            }
            Command::DisplayScript(name) => display(session, &name),
        }
    }
}
