use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use pocket::{Credentials, PocketAuth};

pub fn run_auth(auth_path: &Path) -> Result<()> {
    let consumer_key = std::env::var("POCKET_CONSUMER_KEY")
        .ok()
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| PocketAuth::DEFAULT_CONSUMER_KEY.to_string());
    let auth = PocketAuth::new(consumer_key);

    let request_token = auth.request_token()?;
    let url = auth.authorize_url(&request_token);

    println!("Visit this page and sign in with your Pocket account:\n");
    println!("{url}\n");
    if !auth.open_in_browser(&request_token) {
        info!("[AUTH] Could not open a browser; use the link above");
    }

    print!("Once you have signed in there, hit <enter> to continue");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    let grant = auth.authorize(&request_token)?;
    let credentials = Credentials {
        consumer_key: auth.consumer_key().to_string(),
        access_token: grant.access_token,
        username: Some(grant.username.clone()),
        karakeep_token: None,
        karakeep_url: None,
    };
    credentials.save(auth_path)?;

    println!(
        "Authentication tokens for {} written to {}",
        grant.username,
        auth_path.display()
    );
    Ok(())
}
