use crate::models::Session;
use crate::services::platform::{Credentials, SignUpOutcome};
use crate::services::state::AppState;

fn credentials(email: &str, password: &str) -> Result<Credentials, String> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err("Email and password are required".to_string());
    }
    Ok(Credentials {
        email: email.to_string(),
        password: password.to_string(),
    })
}

pub async fn sign_up(state: &AppState, email: &str, password: &str) -> Result<SignUpOutcome, String> {
    let credentials = credentials(email, password)?;
    state.sign_up(&credentials).await.map_err(|e| e.user_message())
}

pub async fn sign_in(state: &AppState, email: &str, password: &str) -> Result<Session, String> {
    let credentials = credentials(email, password)?;
    state.sign_in(&credentials).await.map_err(|e| e.user_message())
}

pub async fn sign_out(state: &AppState) -> Result<(), String> {
    state.sign_out().await.map_err(|e| e.user_message())
}

pub async fn whoami(state: &AppState) -> Result<Option<Session>, String> {
    state.current_session().await.map_err(|e| e.user_message())
}
