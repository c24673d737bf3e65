//! Secrets commands: masked listing, single-key edits, and the raw
//! GET_SECRETS / SAVE_SECRETS pair used by the secrets editor.

use tracing::info;

use super::{reply, Responder};
use crate::{protocol::Outbound, secrets::SecretEntry, server::AppState};

pub fn list(state: &AppState, out: &Responder) {
    match state.secrets.list_masked() {
        Ok(vars) => reply(out, Outbound::EnvVarsList { vars }),
        Err(e) => reply(
            out,
            Outbound::EnvError { message: format!("Failed to load environment variables: {e}") },
        ),
    }
}

pub fn add(state: &AppState, key: Option<String>, value: Option<String>, out: &Responder) {
    let key = key.unwrap_or_default();
    match state.secrets.upsert(&key, &value.unwrap_or_default()) {
        Ok(()) => {
            info!(key = %key, "added environment variable");
            reply(out, Outbound::EnvVarAdded { key });
        }
        Err(e) => reply(out, Outbound::EnvError { message: e.to_string() }),
    }
}

pub fn delete(state: &AppState, key: Option<String>, out: &Responder) {
    let key = key.unwrap_or_default();
    match state.secrets.delete(&key) {
        Ok(()) => {
            info!(key = %key, "deleted environment variable");
            reply(out, Outbound::EnvVarDeleted { key });
        }
        Err(e) => reply(out, Outbound::EnvError { message: e.to_string() }),
    }
}

pub fn get_secrets(state: &AppState, out: &Responder) {
    match state.secrets.entries() {
        Ok(secrets) => reply(out, Outbound::SecretsData { secrets }),
        Err(e) => reply(out, Outbound::error(format!("Failed to load secrets: {e}"))),
    }
}

pub fn save_secrets(state: &AppState, secrets: Vec<SecretEntry>, out: &Responder) {
    match state.secrets.replace_all(&secrets) {
        Ok(()) => {
            reply(out, Outbound::log("Secrets saved to .env file!"));
            reply(out, Outbound::SecretsSaved);
        }
        Err(e) => reply(out, Outbound::error(format!("Failed to save secrets: {e}"))),
    }
}
