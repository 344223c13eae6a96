//! `MailGrant` - `OAuth2` token manager for outbound mail
//!
//! Keeps the access token for one SMTP host valid and walks the user through
//! the browser authorization when the provider needs consent again.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use mailgrant_core::{OAuthSettings, load_settings, open_manager, save_settings};
use mailgrant_oauth::{AuthStatus, AuthenticationManager, GrantCallback, GrantOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the OAuth2 settings file
    Configure(ConfigureArgs),
    #[command(flatten)]
    Account(AccountCommand),
}

/// Commands that act on the configured account.
#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Grant this application access to the mail account
    Authorize {
        /// Print the authorization URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Show the provider and the state of the stored token
    Status,
    /// Print a valid access token, refreshing it if needed
    Token,
    /// Print the SASL XOAUTH2 initial response
    Xoauth2 {
        /// Sender address (defaults to the configured sender)
        #[arg(long)]
        user: Option<String>,
    },
    /// Forget the stored token
    Deauthorize,
}

#[derive(Args, Debug)]
struct ConfigureArgs {
    /// Outbound mail host, e.g. smtp.gmail.com
    #[arg(long)]
    hostname: String,
    /// Client ID issued by the provider
    #[arg(long)]
    client_id: String,
    /// Client secret issued by the provider
    #[arg(long)]
    client_secret: String,
    /// Redirect URI registered with the provider
    #[arg(long)]
    redirect_uri: String,
    /// Sender address used for SASL authentication
    #[arg(long)]
    sender: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "mailgrant=debug,mailgrant_oauth=debug,mailgrant_core=debug"
    } else {
        "mailgrant=info,mailgrant_oauth=info,mailgrant_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Configure(args) => configure(args).await,
        Command::Account(command) => run(command).await,
    }
}

async fn run(command: AccountCommand) -> anyhow::Result<()> {
    let settings = load_settings()
        .await
        .context("Failed to read settings")?
        .context("Not configured yet, run `mailgrant configure` first")?;
    let manager = open_manager(&settings)?;

    match command {
        AccountCommand::Authorize { no_browser } => authorize(&manager, no_browser).await,
        AccountCommand::Status => status(&manager).await,
        AccountCommand::Token => {
            let token = require_token(&manager).await?;
            println!("{token}");
            Ok(())
        }
        AccountCommand::Xoauth2 { user } => {
            let user = user
                .or_else(|| settings.sender_email.clone())
                .context("No sender address, pass --user or configure --sender")?;
            match manager.xoauth2_for(&user).await? {
                Some(response) => {
                    println!("{response}");
                    Ok(())
                }
                None => bail!("Authorization required, run `mailgrant authorize`"),
            }
        }
        AccountCommand::Deauthorize => {
            manager.deauthorize().await?;
            println!("Stored credentials removed");
            Ok(())
        }
    }
}

async fn configure(args: ConfigureArgs) -> anyhow::Result<()> {
    let mut settings = OAuthSettings::new(
        args.hostname,
        args.client_id,
        args.client_secret,
        args.redirect_uri,
    );
    settings.sender_email = args.sender;

    if let Err(errors) = settings.validate() {
        for error in &errors {
            eprintln!("{}: {error}", error.field());
        }
        bail!("Settings not saved");
    }

    let path = save_settings(&settings).await?;
    println!("Settings written to {}", path.display());
    println!("{}", settings.profile().oauth_help());
    Ok(())
}

async fn authorize(manager: &AuthenticationManager, no_browser: bool) -> anyhow::Result<()> {
    let request = manager.request_verification_code().await?;

    println!("Open this URL to grant access:\n\n{}\n", request.url);
    if !no_browser && let Err(e) = opener::open(request.url.as_str()) {
        warn!("Could not open browser: {e}");
    }
    println!("Paste the full URL your browser was redirected to:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read redirect URL")?;
    let redirect = Url::parse(line.trim()).context("Not a valid URL")?;

    match manager.handle_callback(&GrantCallback::from_url(&redirect)).await? {
        GrantOutcome::Authorized => {
            info!("Authorization complete");
            println!("Authorized");
            Ok(())
        }
        GrantOutcome::Denied => bail!("Access was not granted"),
    }
}

async fn status(manager: &AuthenticationManager) -> anyhow::Result<()> {
    let profile = manager.profile();
    println!(
        "Provider:   {} ({} port {})",
        profile.labels().service_name,
        profile.encryption_type(),
        profile.oauth_port()
    );

    let token = manager.token().await;
    if token.is_unset() {
        println!("Token:      none");
    } else {
        println!("Token:      stored, expires {}", token.expiry_time);
        println!(
            "Refresh:    {}",
            if token.refresh_token().is_ok() { "yes" } else { "no" }
        );
    }

    match manager.ensure_authenticated().await {
        Ok(AuthStatus::Ready(_)) => println!("Status:     ready"),
        Ok(AuthStatus::AuthorizationRequired) => println!("Status:     authorization required"),
        Err(e) => println!("Status:     error ({e})"),
    }
    Ok(())
}

async fn require_token(manager: &AuthenticationManager) -> anyhow::Result<String> {
    match manager.ensure_authenticated().await? {
        AuthStatus::Ready(token) => Ok(token),
        AuthStatus::AuthorizationRequired => {
            bail!("Authorization required, run `mailgrant authorize`")
        }
    }
}
