use clap::{CommandFactory, Parser};
use lb::cli::{commands, Cli, Commands};
use lb::config::{self, CliOverrides};
use lb::logging::init_logging;
use lb::{LbError, Result};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
        // Continue without logging rather than refusing to run.
    }

    if let Err(e) = run(cli) {
        handle_error(&e);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Internal re-entry flags replace the command surface. Neither path
    // may touch the export scheduler (a child scheduling children would
    // spawn forever).
    if cli.worker {
        let paths = config::discover_paths()?;
        let worker_config = config::load(&paths, CliOverrides::default())?;
        return lb::worker::run(&paths, &worker_config);
    }
    if cli.export_worker {
        let paths = config::discover_paths()?;
        lb::export::run_export_child(&paths);
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        std::process::exit(2);
    };

    match command {
        Commands::Init(args) => commands::init::execute(&args, cli.json),
        Commands::Auth(args) => commands::auth::execute(&args, cli.json),
        Commands::Whoami => commands::whoami::execute(cli.json),
        Commands::List(args) => commands::list::execute(&args, cli.json),
        Commands::Ready(args) => commands::ready::execute(&args, cli.json),
        Commands::Blocked(args) => commands::blocked::execute(&args, cli.json),
        Commands::Show(args) => commands::show::execute(&args, cli.json),
        Commands::Create(args) => commands::create::execute(&args, cli.json),
        Commands::Update(args) => commands::update::execute(&args, cli.json),
        Commands::Close(args) => commands::close::execute(&args, cli.json),
        Commands::Delete(args) => commands::delete::execute(&args, cli.json),
        Commands::Dep { command } => commands::dep::execute(&command, cli.json),
        Commands::Sync(args) => commands::sync::execute(&args, cli.json),
        Commands::Import(args) => commands::import::execute(&args, cli.json),
        Commands::Export(args) => commands::export::execute(&args, cli.json),
        Commands::Migrate { command } => commands::migrate::execute(&command, cli.json),
        Commands::Onboard(args) => commands::onboard::execute(&args),
    }
}

fn handle_error(err: &LbError) -> ! {
    eprintln!("error: {err}");
    if let Some(hint) = err.suggestion() {
        eprintln!("hint: {hint}");
    }
    std::process::exit(err.exit_code());
}
