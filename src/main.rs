use clap::Parser;
use page_pilot::cli::commands::{cmd_run, RunOptions};
use page_pilot::cli::config::{load_config, resolve_model_options, Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            task,
            url,
            sidecar,
            model,
            api_key,
            base_url,
            max_steps,
            viewport_expansion,
            trace,
            allow_scripts,
        } => {
            let model_options = resolve_model_options(
                model.as_deref(),
                api_key.as_deref(),
                base_url.as_deref(),
                &config.model,
            );

            let mut options = RunOptions::from_config(&task, &config, model_options);
            options.url = url;
            if let Some(sidecar) = sidecar {
                options.sidecar = sidecar;
            }
            if let Some(max_steps) = max_steps {
                options.max_steps = max_steps;
            }
            if let Some(viewport_expansion) = viewport_expansion {
                options.viewport_expansion = viewport_expansion;
            }
            options.trace = trace;
            options.allow_scripts = allow_scripts;

            let success = cmd_run(options, cli.verbose)?;
            if !success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
