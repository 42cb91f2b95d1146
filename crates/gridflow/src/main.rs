//! GridFlow unified launcher.
//!
//! One binary carrying every front-end: production creation for both
//! flavors, batch reconstruction submission, deletion, credential setup,
//! CE reporting, and the production controller itself.

mod cli;

use clap::{ArgAction, Parser, Subcommand};
use cli::error::Precondition;

#[derive(Parser, Debug)]
#[command(name = "gridflow", about = "Grid production orchestration")]
struct Args {
    /// Catalog connection URL
    #[arg(
        long,
        global = true,
        env = "GRIDFLOW_DB_URL",
        default_value = "sqlite:gridflow.sqlite?mode=rwc"
    )]
    database: String,

    /// Increase verbosity (repeatable)
    #[arg(short = 'V', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create and launch a simulation production
    McProduction(cli::mc_production::McProductionArgs),
    /// Create and launch a reconstruction production for one run
    RecoProduction(cli::reco_production::RecoProductionArgs),
    /// Submit reconstruction productions for a batch of runs
    RecoSubmit(cli::reco_submit::RecoSubmitArgs),
    /// Rename a production out of the way in catalog, disk and storage
    DeleteProduction(cli::delete_production::DeleteProductionArgs),
    /// Register a long-lived credential and print its coordinates
    CreateCredential(cli::create_credential::CreateCredentialArgs),
    /// Report jobs known to the CEs and their owning productions
    ReportJobs(cli::report_jobs::ReportJobsArgs),
    /// Cross-check catalog state against the CEs
    VerifyProduction(cli::verify_production::VerifyProductionArgs),
    /// Run the production controller
    Serve(cli::serve::ServeArgs),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::Context {
        database: args.database,
        verbose: args.verbose > 0,
    };

    let result = match args.command {
        Command::McProduction(cmd) => cli::mc_production::run(&ctx, cmd).await,
        Command::RecoProduction(cmd) => cli::reco_production::run(&ctx, cmd).await,
        Command::RecoSubmit(cmd) => cli::reco_submit::run(&ctx, cmd).await,
        Command::DeleteProduction(cmd) => cli::delete_production::run(&ctx, cmd).await,
        Command::CreateCredential(cmd) => cli::create_credential::run(&ctx, cmd).await,
        Command::ReportJobs(cmd) => cli::report_jobs::run(&ctx, cmd).await,
        Command::VerifyProduction(cmd) => cli::verify_production::run(&ctx, cmd).await,
        Command::Serve(cmd) => cli::serve::run(&ctx, cmd).await,
    };

    if let Err(err) = result {
        // Precondition failures (bad arguments, existing production, missing
        // inputs) exit 2 with a one-line message; everything else exits 1
        if let Some(precondition) = err.downcast_ref::<Precondition>() {
            eprintln!("*** ERROR *** {precondition}");
            std::process::exit(2);
        }
        eprintln!("*** ERROR *** {err:#}");
        std::process::exit(1);
    }
}
