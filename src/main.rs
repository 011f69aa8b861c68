use clap::Parser;
use miette::Result;
use perihelion::{Engine, EngineConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "perihelion", version, about = "PERM authorization engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "perihelion.toml")]
    config: String,

    /// Path to the model file (overrides the config file)
    #[arg(short, long)]
    model: Option<String>,

    /// Path to the CSV policy file (overrides the config file)
    #[arg(short, long)]
    policy: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Evaluate one request tuple and print the decision
    Check {
        subject: String,
        object: String,
        action: String,

        /// Optional domain, inserted after the subject
        #[arg(short, long)]
        domain: Option<String>,
    },
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let mut settings = EngineConfig::load(&cli.config)?;
    if let Some(model) = cli.model {
        settings.model_path = model.into();
    }
    if let Some(policy) = cli.policy {
        settings.policy_path = Some(policy.into());
    }

    let engine = Engine::start(settings)?;

    match cli.command {
        Command::Check { subject, object, action, domain } => {
            let mut request = vec![subject.as_str()];
            if let Some(domain) = &domain {
                request.push(domain.as_str());
            }
            request.push(object.as_str());
            request.push(action.as_str());
            let allowed = engine.enforce(&request)?;
            println!("{}", if allowed { "ALLOW" } else { "DENY" });
            if !allowed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
