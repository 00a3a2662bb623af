use shellpark::SuspensionCoordinator;
use shellpark::cli::{
    AdminCommand, Args, ConfigDiscovery, ExecutionMode, FAILURE_EXIT_CODE, ShellparkConfig,
    admin_suspend_config, execute,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(FAILURE_EXIT_CODE);
        }
    };

    let mut config = match ConfigDiscovery::discover_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(FAILURE_EXIT_CODE);
        }
    };
    if let Some(data_dir) = args.data_dir.clone() {
        config.suspend.data_dir = data_dir;
    }

    init_logging(&config);

    match mode {
        ExecutionMode::ShowConfig => ConfigDiscovery::show_discovery_info(&config),
        ExecutionMode::InitConfig => match ConfigDiscovery::create_default_user_config() {
            Ok(path) => println!("Configuration file: {}", path.display()),
            Err(e) => {
                error!("Failed to create configuration: {}", e);
                eprintln!("Error: {}", e);
                std::process::exit(FAILURE_EXIT_CODE);
            }
        },
        ExecutionMode::Admin(command) => {
            let code = run_admin(config, &command).await;
            std::process::exit(code);
        }
    }
}

fn init_logging(config: &ShellparkConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_admin(config: ShellparkConfig, command: &AdminCommand) -> i32 {
    info!("Opening session store at {:?}", config.suspend.data_dir);
    let coordinator = SuspensionCoordinator::new(admin_suspend_config(config.suspend)).await;

    let mut stdout = std::io::stdout();
    match execute(&coordinator, command, &mut stdout).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("Error: command failed");
            FAILURE_EXIT_CODE
        }
    }
}
