use anyhow::Result;
use cell_bridge::{
    cli::Cli,
    config::{Config, Settings, DEFAULT_TOKEN},
    project::ProjectStore,
    secrets::SecretStore,
    server,
};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // CLI overrides config; config overrides defaults
    let cfg = Config::load(args.config.as_deref());
    let settings = Settings::resolve(&cfg, &args)?;

    if args.list_projects {
        let store = ProjectStore::new(&settings.data_dir, settings.default_project.clone());
        for name in store.list()? {
            println!("{}", name);
        }
        return Ok(());
    }
    if args.list_secrets {
        let store = SecretStore::open(&settings.secrets_path);
        for s in store.list_masked()? {
            println!("{}={}", s.key, s.masked);
        }
        return Ok(());
    }

    print_banner(&settings);
    if settings.token == DEFAULT_TOKEN {
        warn!("using the built-in default token; set BRIDGE_TOKEN or --token");
    }
    if settings.allow_shell_escape {
        warn!("trusted local execution enabled: `!` cells run host shell commands");
    }

    server::serve(settings).await
}

fn print_banner(settings: &Settings) {
    let url = format!("ws://{}", settings.bind);
    let data = settings.data_dir.display().to_string();
    if std::io::stdout().is_terminal() {
        println!("{} {}", "cell-bridge".magenta().bold(), url.cyan());
        println!("  data: {}", data.green());
        println!("  delegate: {}", settings.delegate_url.yellow());
    } else {
        println!("cell-bridge {}", url);
        println!("  data: {}", data);
        println!("  delegate: {}", settings.delegate_url);
    }
}
