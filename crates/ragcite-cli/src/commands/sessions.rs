//! Sessions command

use crate::app::{OutputFormat, SessionsAction, SessionsArgs};
use crate::output;
use anyhow::Result;
use ragcite_core::db::validate_session_id;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagError, SessionStore};

pub fn run(args: SessionsArgs, config: &Config, format: OutputFormat) -> Result<i32> {
    let store = SessionStore::open(config.storage.session_dir())?;

    match args.action {
        SessionsAction::Ls { limit } => {
            let sessions = store.list_sessions(limit)?;
            print!("{}", output::format_sessions(&sessions, format));
        }
        SessionsAction::Show { session_id, limit } => {
            validate_session_id(&session_id)?;
            let turns = store.history(&session_id, limit)?;
            if turns.is_empty() {
                return Err(RagError::SessionNotFound(session_id).into());
            }
            print!("{}", output::format_turns(&turns, format));
        }
        SessionsAction::Rm { session_id } => {
            let deleted = store.delete_session(&session_id)?;
            if deleted == 0 {
                return Err(RagError::SessionNotFound(session_id).into());
            }
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "removed": session_id, "turns": deleted })
                ),
                OutputFormat::Cli => println!("Removed {} ({} turns)", session_id, deleted),
            }
        }
    }
    Ok(exit_codes::SUCCESS)
}
