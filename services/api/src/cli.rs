use crate::server;
use campus_intake::auth::TokenIssuer;
use campus_intake::config::AppConfig;
use campus_intake::error::{AppError, ServiceError};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Campus Intake",
    about = "Run the enrollment service or mint bootstrap credentials",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print a staff bearer token signed with the configured secret
    StaffToken(StaffTokenArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct StaffTokenArgs {
    /// Staff email written into the token subject
    #[arg(long)]
    pub(crate) email: String,
    /// Display name carried in the token
    #[arg(long, default_value = "Administrator")]
    pub(crate) name: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::StaffToken(args) => print_staff_token(args),
    }
}

fn print_staff_token(args: StaffTokenArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let issuer = TokenIssuer::from_config(&config.auth);
    let email = args.email.trim().to_lowercase();
    let token = issuer
        .issue_staff(&email, args.name.trim())
        .map_err(ServiceError::from)?;
    println!("{token}");
    Ok(())
}
