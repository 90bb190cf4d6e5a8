//! Session commands: login, logout, status

use colored::Colorize;

use crate::api::ApiClient;
use crate::error::Result;

/// Signs in and stores the returned token pair.
pub async fn login(client: &ApiClient, email: &str, password: &str) -> Result<()> {
    client.auth().login(email, password).await?;
    println!("{} signed in as {}", "✓".green(), email.bold());
    Ok(())
}

/// Removes stored credentials.
pub fn logout(client: &ApiClient) {
    client.auth().logout();
    println!("{} signed out", "✓".green());
}

/// Reports which credentials are stored.
pub fn status(client: &ApiClient) {
    let store = client.token_store();
    println!("API:           {}", client.base_url());
    println!(
        "Access token:  {}",
        presence(store.access_token().is_some())
    );
    println!(
        "Refresh token: {}",
        presence(store.refresh_token().is_some())
    );
}

fn presence(stored: bool) -> colored::ColoredString {
    if stored {
        "stored".green()
    } else {
        "missing".yellow()
    }
}
