//! Session commands.

use std::io::BufRead;

use cartwheel_client::Storefront;
use cartwheel_client::models::SessionStatus;
use secrecy::SecretString;

use super::CommandError;

const PASSWORD_ENV: &str = "CARTWHEEL_PASSWORD";

/// Log in and persist the credential.
///
/// # Errors
///
/// Returns an error if no email is available, the password cannot be read,
/// or the backend rejects the login.
#[allow(clippy::print_stdout)]
pub async fn login(
    storefront: &Storefront,
    email: Option<String>,
    remember: bool,
) -> Result<(), CommandError> {
    let email = email
        .or_else(|| storefront.session().remembered_email())
        .ok_or(CommandError::MissingEmail)?;
    let password = read_password()?;

    let user = storefront.session().login(&email, &password, remember).await?;
    println!("Logged in as {} ({})", user.display_name(), user.email);
    Ok(())
}

/// Log out locally and tell the backend.
///
/// # Errors
///
/// Does not currently fail; the signature matches the other commands.
#[allow(clippy::print_stdout)]
pub async fn logout(storefront: &Storefront) -> Result<(), CommandError> {
    if storefront.session().initialize().await == SessionStatus::Anonymous {
        println!("Not logged in");
        return Ok(());
    }

    if let Err(e) = storefront.session().logout().await {
        tracing::warn!(error = %e, "Logout task failed");
    }
    println!("Logged out");
    Ok(())
}

/// Print the current session.
#[allow(clippy::print_stdout)]
pub async fn whoami(storefront: &Storefront) {
    let status = storefront.session().initialize().await;
    match (status, storefront.session().user()) {
        (SessionStatus::Verified, Some(user)) => {
            println!("{} <{}>", user.display_name(), user.email);
        }
        (SessionStatus::Stale, Some(user)) => {
            println!("{} <{}> (not verified)", user.display_name(), user.email);
        }
        _ => println!("Not logged in"),
    }
}

fn read_password() -> Result<SecretString, CommandError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(password));
    }

    #[allow(clippy::print_stderr)]
    {
        eprint!("Password: ");
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(SecretString::from(line.trim_end_matches(['\r', '\n']).to_string()))
}
