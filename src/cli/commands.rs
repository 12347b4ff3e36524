use crate::agent::agent::{Agent, AgentConfig};
use crate::agent::model::ModelOptions;
use crate::browser::session::BrowserSession;
use crate::cli::config::AppConfig;

/// Resolved options for the `run` subcommand.
pub struct RunOptions {
    pub task: String,
    pub url: Option<String>,
    pub sidecar: String,
    pub model: ModelOptions,
    pub max_steps: usize,
    pub viewport_expansion: i64,
    pub working_language: String,
    pub trace: Option<String>,
    pub allow_scripts: bool,
}

impl RunOptions {
    pub fn from_config(task: &str, config: &AppConfig, model: ModelOptions) -> Self {
        Self {
            task: task.to_string(),
            url: None,
            sidecar: config.browser.sidecar.clone(),
            model,
            max_steps: config.agent.max_steps,
            viewport_expansion: config.agent.viewport_expansion,
            working_language: config.agent.working_language.clone(),
            trace: None,
            allow_scripts: false,
        }
    }
}

/// Run one task end to end. Returns whether the task succeeded.
pub fn cmd_run(options: RunOptions, verbose: u8) -> Result<bool, Box<dyn std::error::Error>> {
    if verbose > 0 {
        eprintln!("Launching browser sidecar: {}", options.sidecar);
    }
    let mut session = BrowserSession::launch(&options.sidecar)?;

    if let Some(url) = &options.url {
        if verbose > 0 {
            eprintln!("Opening {}", url);
        }
        crate::browser::driver::PageDriver::navigate(&mut session, url)?;
    }

    let mut config = AgentConfig {
        viewport_expansion: options.viewport_expansion,
        max_steps: options.max_steps,
        working_language: options.working_language.clone(),
        enable_script_tool: options.allow_scripts,
        trace_path: options.trace.clone(),
        ..AgentConfig::default()
    };

    if verbose > 0 {
        config.on_before_step = Some(Box::new(|step| {
            eprintln!("--- step {} ---", step);
        }));
        config.on_after_step = Some(Box::new(|entry| {
            if let Some(goal) = &entry.brain.next_goal {
                eprintln!("goal:   {}", goal);
            }
            eprintln!("action: {} -> {}", entry.action.name, entry.action.output);
        }));
    }

    let mut agent = Agent::new(Box::new(session), options.model, config)?;
    let result = agent.execute(&options.task);
    agent.dispose(Some("run finished"));

    println!(
        "{}: {}",
        if result.success { "SUCCESS" } else { "FAILURE" },
        result.data
    );
    if verbose > 1 {
        for (i, entry) in result.history.iter().enumerate() {
            println!("step {}: [{}] {}", i + 1, entry.action.name, entry.action.output);
        }
    }

    Ok(result.success)
}
