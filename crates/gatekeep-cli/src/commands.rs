//! Subcommand handlers: the terminal's login, registration, recovery,
//! and account-settings screens.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Local, Utc};
use clap::Subcommand;
use tracing::{debug, warn};

use gatekeep_core::auth::{token, CredentialKind};
use gatekeep_core::models::{ChangePasswordRequest, LoginCredentials, PasswordResetConfirm, RegisterRequest};
use gatekeep_core::{Config, LoginFailure, SessionManager, SessionPhase};

use crate::prompt;
use crate::validation;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Keep the session across restarts (7-day access, 30-day refresh)
        #[arg(long)]
        remember_me: bool,
    },
    /// Sign out and forget stored tokens
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Show session and token state
    Status,
    /// Create an account
    Register {
        #[arg(long)]
        email: Option<String>,
    },
    /// Email a password reset link
    ForgotPassword {
        #[arg(long)]
        email: Option<String>,
    },
    /// Set a new password with a reset token
    ResetPassword { token: String },
    /// Confirm an email address with a verification token
    VerifyEmail { token: String },
    /// Send the verification email again
    ResendConfirmation {
        #[arg(long)]
        email: Option<String>,
    },
    /// Change the password of the signed-in account
    ChangePassword,
    /// Download all account data as JSON
    ExportData {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Permanently delete the signed-in account
    DeleteAccount {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

pub async fn run(command: Command, session: &Arc<SessionManager>, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { email, remember_me } => login(session, config, email, remember_me).await,
        Command::Logout => {
            session.logout();
            println!("Signed out.");
            Ok(())
        }
        Command::Whoami => whoami(session).await,
        Command::Status => status(session).await,
        Command::Register { email } => register(session, config, email).await,
        Command::ForgotPassword { email } => forgot_password(session, config, email).await,
        Command::ResetPassword { token } => reset_password(session, token).await,
        Command::VerifyEmail { token } => {
            let response = session.gateway().verify_email(&token).await?;
            println!("{}", response.message);
            println!("You can now sign in with `gatekeep login`.");
            Ok(())
        }
        Command::ResendConfirmation { email } => {
            let email = ask_email(config, email)?;
            resend_confirmation(session, &email).await
        }
        Command::ChangePassword => change_password(session).await,
        Command::ExportData { output } => export_data(session, output).await,
        Command::DeleteAccount { yes } => delete_account(session, yes).await,
    }
}

fn ask_email(config: &Config, email: Option<String>) -> Result<String> {
    match email {
        Some(email) => {
            validation::email(&email)?;
            Ok(email)
        }
        None => prompt::validated(
            || prompt::line("Email", config.last_username.as_deref()),
            validation::email,
        ),
    }
}

/// Run the startup check and require an authenticated session
async fn require_session(session: &Arc<SessionManager>) -> Result<()> {
    let check = session.check_auth().await;
    if check.phase != SessionPhase::Authenticated {
        bail!("Not signed in. Run `gatekeep login` first.");
    }
    check.wait().await;
    Ok(())
}

async fn login(
    session: &Arc<SessionManager>,
    config: &mut Config,
    email: Option<String>,
    remember_me: bool,
) -> Result<()> {
    let email = ask_email(config, email)?;
    let password = prompt::validated(|| prompt::password("Password"), |p| validation::required("password", p))?;

    println!("Signing in...");
    match session.login(&LoginCredentials::new(&email, password), remember_me).await {
        Ok(()) => {
            config.last_username = Some(email.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            let name = session.user().map(|u| u.display_name()).unwrap_or(email);
            println!("Signed in as {}.", name);
            if !remember_me {
                println!("Session lasts until the refresh token expires in 7 days. Use --remember-me for 30.");
            }
            Ok(())
        }
        Err(e) => match LoginFailure::classify(&e, &email) {
            LoginFailure::VerifyEmail { email } => {
                println!("Your email address {} has not been verified yet.", email);
                println!("Check your inbox for the verification link, then run `gatekeep verify-email <token>`.");
                if prompt::confirm("Send the verification email again?")? {
                    resend_confirmation(session, &email).await?;
                }
                Ok(())
            }
            LoginFailure::Message(message) => bail!(message),
        },
    }
}

async fn whoami(session: &Arc<SessionManager>) -> Result<()> {
    require_session(session).await?;
    match session.user() {
        Some(user) => {
            println!("{}", user.display_name());
            println!("id:   {}", user.id);
            if let Some(ref kind) = user.user_type {
                println!("plan: {}", kind);
            }
        }
        None => {
            // Profile enrichment failed; fall back to the token subject
            let subject = session
                .snapshot()
                .access_token()
                .and_then(token::claims)
                .map(|identity| identity.subject)
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} (profile unavailable)", subject);
        }
    }
    Ok(())
}

async fn status(session: &Arc<SessionManager>) -> Result<()> {
    let phase = session.check_auth().await.wait().await;
    let state = session.snapshot();
    println!("session:     {:?}", phase);
    println!("remember me: {}", state.remember_me());

    if let Some(access) = state.access_token() {
        match token::seconds_until_expiry(access) {
            Some(secs) => println!("access:      expires in {}m", secs / 60),
            None => println!("access:      unreadable"),
        }
    } else {
        println!("access:      none");
    }

    match session.credentials().read_record(CredentialKind::Refresh) {
        Some(record) => match record.expires_at {
            Some(at) => println!("refresh:     {}", describe_expiry(at, Utc::now())),
            None => println!("refresh:     this session only"),
        },
        None => println!("refresh:     none"),
    }
    Ok(())
}

/// Local expiry time plus the remaining lifetime in days or hours
fn describe_expiry(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = at - now;
    let local = at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    if remaining <= Duration::zero() {
        format!("expired at {}", local)
    } else if remaining >= Duration::days(1) {
        format!("stored until {} ({} days left)", local, remaining.num_days())
    } else {
        format!("stored until {} ({}h left)", local, remaining.num_hours())
    }
}

async fn register(session: &Arc<SessionManager>, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = ask_email(config, email)?;
    let password = prompt::validated(|| prompt::password("Password"), validation::new_password)?;
    let confirm = prompt::password("Confirm password")?;
    validation::confirmation(&password, &confirm)?;

    let response = session
        .register(&RegisterRequest {
            username: email.clone(),
            password,
        })
        .await?;
    debug!(task = ?response.email_task_id, "Registration accepted");

    config.last_username = Some(email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Account created. A verification link was sent to {}.", email);
    println!("Confirm it with `gatekeep verify-email <token>`, then sign in.");
    Ok(())
}

async fn forgot_password(session: &Arc<SessionManager>, config: &Config, email: Option<String>) -> Result<()> {
    let email = ask_email(config, email)?;
    let response = session.gateway().request_password_reset(&email).await?;
    println!("{}", response.message);
    println!("Use the token from the email with `gatekeep reset-password <token>`.");
    Ok(())
}

async fn reset_password(session: &Arc<SessionManager>, token: String) -> Result<()> {
    let new_password = prompt::validated(|| prompt::password("New password"), validation::new_password)?;
    let confirm = prompt::password("Confirm new password")?;
    validation::confirmation(&new_password, &confirm)?;

    let response = session
        .gateway()
        .reset_password(&PasswordResetConfirm { token, new_password })
        .await?;
    println!("{}", response.message);
    Ok(())
}

async fn resend_confirmation(session: &Arc<SessionManager>, email: &str) -> Result<()> {
    session.gateway().resend_confirmation(email).await?;
    println!("Verification email sent to {}.", email);
    Ok(())
}

async fn change_password(session: &Arc<SessionManager>) -> Result<()> {
    require_session(session).await?;

    let current_password = prompt::validated(
        || prompt::password("Current password"),
        |p| validation::required("current password", p),
    )?;
    let new_password = prompt::validated(|| prompt::password("New password"), validation::new_password)?;
    let confirm = prompt::password("Confirm new password")?;
    validation::confirmation(&new_password, &confirm)?;

    let response = session
        .gateway()
        .change_password(&ChangePasswordRequest {
            current_password,
            new_password,
        })
        .await?;
    println!("{}", response.message);
    Ok(())
}

async fn export_data(session: &Arc<SessionManager>, output: Option<PathBuf>) -> Result<()> {
    require_session(session).await?;

    let export = session.gateway().export_data().await?;
    let path = output.unwrap_or_else(|| PathBuf::from(&export.filename));
    std::fs::write(&path, &export.bytes)?;
    println!("Exported {} bytes to {}.", export.bytes.len(), path.display());
    Ok(())
}

async fn delete_account(session: &Arc<SessionManager>, yes: bool) -> Result<()> {
    require_session(session).await?;

    let label = session
        .user()
        .map(|u| u.email)
        .unwrap_or_else(|| "this account".to_string());
    if !yes && !prompt::confirm(&format!("Permanently delete {} and all its data?", label))? {
        println!("Cancelled.");
        return Ok(());
    }

    let response = session.delete_account().await?;
    println!("{}", response.message);
    Ok(())
}
