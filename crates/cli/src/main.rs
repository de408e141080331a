//! Cartwheel CLI - Drive the storefront client from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password from CARTWHEEL_PASSWORD or stdin)
//! cartwheel login -e ann@example.com --remember
//!
//! # Inspect and change the cart
//! cartwheel cart show
//! cartwheel cart add 64f1c0ffee -q 2
//! cartwheel cart inc <line-id>
//!
//! # Price the cart with a coupon
//! cartwheel quote --coupon SAVE20
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` / `whoami` - Session management
//! - `cart` - Show and mutate the server-side cart
//! - `quote` - Totals for the current cart

#![cfg_attr(not(test), forbid(unsafe_code))]

use cartwheel_client::config::ClientConfig;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod terminal;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "cartwheel")]
#[command(author, version, about = "Cartwheel storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        /// Account email address (defaults to the remembered one)
        #[arg(short, long)]
        email: Option<String>,

        /// Remember the email for next time
        #[arg(long)]
        remember: bool,
    },
    /// Log out and clear the stored credential
    Logout,
    /// Show the current session
    Whoami,
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show totals for the current cart
    Quote {
        /// Coupon code to apply
        #[arg(long)]
        coupon: Option<String>,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and totals
    Show,
    /// Add a product
    Add {
        /// Product ID
        product_id: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Add one unit to a line
    Inc {
        /// Cart line ID
        line_id: String,
    },
    /// Remove one unit from a line
    Dec {
        /// Cart line ID
        line_id: String,
    },
    /// Remove a line
    Rm {
        /// Cart line ID
        line_id: String,
    },
    /// Remove every line
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = ClientConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartwheel_cli=info,cartwheel_client=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        if let CommandError::Client(err) = &e {
            err.report();
        }
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CommandError> {
    let storefront = commands::storefront(config)?;

    match cli.command {
        Commands::Login { email, remember } => {
            commands::auth::login(&storefront, email, remember).await?;
        }
        Commands::Logout => commands::auth::logout(&storefront).await?,
        Commands::Whoami => commands::auth::whoami(&storefront).await,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront).await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&storefront, &product_id, quantity).await?,
            CartAction::Inc { line_id } => commands::cart::increase(&storefront, &line_id).await?,
            CartAction::Dec { line_id } => commands::cart::decrease(&storefront, &line_id).await?,
            CartAction::Rm { line_id } => commands::cart::remove(&storefront, &line_id).await?,
            CartAction::Clear => commands::cart::clear(&storefront).await?,
        },
        Commands::Quote { coupon } => commands::quote::quote(&storefront, coupon.as_deref()).await?,
    }
    Ok(())
}
