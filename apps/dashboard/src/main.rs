mod config;
mod render;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    build_payment_flow, Bootstrap, Dashboard, DashboardApi, HttpDashboardApi, LogTable,
    PaymentForm, PaymentMode, RunOutcome, Session, SubmitOutcome, ViewOutcome,
};
use shared::domain::{Role, UserProfile, View};
use storage::{StateStore, Storage};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{load_settings, normalize_database_url, Settings};

const EXIT_FAILED: u8 = 1;
const EXIT_SIGNED_OUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "liftops", about = "LiftOps dashboard controller")]
struct Cli {
    /// Config file; defaults to ./dashboard.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[arg(long, global = true)]
    payment_mode: Option<PaymentMode>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or seed the stored session.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
    #[command(flatten)]
    Dashboard(DashboardCommand),
}

/// Commands that need a signed-in session and a live dashboard.
#[derive(Subcommand, Debug)]
enum DashboardCommand {
    /// Run the pipeline and print each panel as it completes.
    Run {
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },
    /// Print the pipeline history table.
    Logs,
    /// Open settings, paying for the upgrade first when gated.
    Settings {
        #[arg(long)]
        card_number: Option<String>,
        #[arg(long)]
        expiry: Option<String>,
        #[arg(long)]
        cvc: Option<String>,
    },
    /// Activate a view and print the resulting page state.
    View { view: ViewArg },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    Show,
    /// Store a token and profile the way the login page does.
    Import {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user_json: Option<String>,
    },
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ViewArg {
    Dashboard,
    Logs,
    Settings,
}

impl From<ViewArg> for View {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Dashboard => View::Dashboard,
            ViewArg::Logs => View::Logs,
            ViewArg::Settings => View::Settings,
        }
    }
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(v) = &self.server_url {
            settings.server_url = v.clone();
        }
        if let Some(v) = &self.database_url {
            settings.database_url = normalize_database_url(v);
        }
        if let Some(v) = self.payment_mode {
            settings.payment_mode = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    cli.apply_overrides(&mut settings);

    let store = Arc::new(
        Storage::new(&settings.database_url)
            .await
            .with_context(|| format!("failed to open client state at {}", settings.database_url))?,
    );

    match cli.command {
        Command::Session { action } => session_command(action, store.as_ref(), &settings).await,
        Command::Dashboard(command) => dashboard_command(command, store, &settings).await,
    }
}

async fn session_command(
    action: SessionCommand,
    store: &Storage,
    settings: &Settings,
) -> Result<ExitCode> {
    match action {
        SessionCommand::Show => {
            match Session::bootstrap(store, &settings.login_location).await? {
                Bootstrap::Redirect { location } => {
                    println!("signed out; sign in at {location}");
                    return Ok(ExitCode::from(EXIT_SIGNED_OUT));
                }
                Bootstrap::Ready(session) => {
                    let role = match session.user().role {
                        Some(Role::Admin) => "admin",
                        _ => "user",
                    };
                    println!("email: {}", session.email_or_guest());
                    println!("role:  {role}");
                    println!("tier:  {}", session.tier());
                }
            }
        }
        SessionCommand::Import { token, user_json } => {
            if let Some(raw) = &user_json {
                serde_json::from_str::<UserProfile>(raw)
                    .context("--user-json is not a valid user profile")?;
            }
            store.save_login(&token, user_json.as_deref()).await?;
            info!("session imported");
        }
        SessionCommand::Clear => {
            store.clear_session().await?;
            info!("session cleared");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn dashboard_command(
    command: DashboardCommand,
    store: Arc<Storage>,
    settings: &Settings,
) -> Result<ExitCode> {
    let session = match Session::bootstrap(store.as_ref(), &settings.login_location).await? {
        Bootstrap::Redirect { location } => {
            eprintln!("not signed in; sign in at {location} or run `liftops session import`");
            return Ok(ExitCode::from(EXIT_SIGNED_OUT));
        }
        Bootstrap::Ready(session) => session,
    };

    let api: Arc<dyn DashboardApi> = Arc::new(HttpDashboardApi::new(
        &settings.server_url,
        Some(session.token().to_string()),
    )?);
    let payment = build_payment_flow(&settings.payment_settings(), api.clone());
    let dashboard = Dashboard::new(session, api, payment, store, settings.timings());
    let printer = spawn_printer(&dashboard);
    dashboard.start().await;

    let code = match command {
        DashboardCommand::Run { input } => match dashboard.run_pipeline(&input.join(" ")).await {
            RunOutcome::Completed(_) => ExitCode::SUCCESS,
            RunOutcome::Ignored => {
                eprintln!("nothing to run: input is blank");
                ExitCode::from(EXIT_FAILED)
            }
            RunOutcome::Busy | RunOutcome::Failed => {
                eprintln!("pipeline run failed; see log output");
                ExitCode::from(EXIT_FAILED)
            }
        },
        DashboardCommand::Logs => {
            dashboard.activate(View::Logs).await;
            match dashboard.snapshot().await.logs {
                LogTable::Rendered(rows) => {
                    print!("{}", render::log_table(&rows));
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("failed to load pipeline history");
                    ExitCode::from(EXIT_FAILED)
                }
            }
        }
        DashboardCommand::Settings {
            card_number,
            expiry,
            cvc,
        } => {
            let form = PaymentForm {
                card_number: card_number.unwrap_or_default(),
                expiry: expiry.unwrap_or_default(),
                cvc: cvc.unwrap_or_default(),
            };
            open_settings(&dashboard, &form).await
        }
        DashboardCommand::View { view } => {
            dashboard.activate(view.into()).await;
            print!(
                "{}",
                render::describe(&dashboard.snapshot().await, dashboard.tier().await)
            );
            ExitCode::SUCCESS
        }
    };

    // Dropping the last handle closes the event channel and lets the printer drain.
    drop(dashboard);
    let _ = printer.await;
    Ok(code)
}

async fn open_settings(dashboard: &Dashboard, form: &PaymentForm) -> ExitCode {
    if dashboard.activate(View::Settings).await == ViewOutcome::Activated(View::Settings) {
        println!("settings unlocked (tier {})", dashboard.tier().await);
        return ExitCode::SUCCESS;
    }
    if dashboard.snapshot().await.paywall.message.is_some() {
        return ExitCode::from(EXIT_FAILED);
    }

    info!(mode = %dashboard.payment_mode(), "submitting upgrade payment");
    match dashboard.submit_payment(form).await {
        SubmitOutcome::Upgraded(receipt) => {
            match receipt.reference {
                Some(reference) => println!("upgraded to commander (payment {reference})"),
                None => println!("upgraded to commander"),
            }
            ExitCode::SUCCESS
        }
        SubmitOutcome::NotReady => {
            eprintln!("payment form is not loaded; check the server connection");
            ExitCode::from(EXIT_FAILED)
        }
        SubmitOutcome::Busy | SubmitOutcome::Rejected(_) | SubmitOutcome::Failed(_) => {
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn spawn_printer(dashboard: &Dashboard) -> JoinHandle<()> {
    let mut events = dashboard.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render::event_line(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
