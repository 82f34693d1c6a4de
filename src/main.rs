use clap::Parser;
use climate_dash::cli::{self, App, Cli, Commands, CompareArgs, HeatmapArgs, IndicatorsArgs};
use climate_dash::render::HeadlessSurface;
use climate_dash::{DashboardConfig, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Select};
use std::env;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Sets up `tracing` from `RUST_LOG`, honouring `CLIMATE_LOG_JSON` and
/// `CLIMATE_LOG_DIR`. The returned guard must live until exit so file logs are flushed.
fn init_logging() -> Option<WorkerGuard> {
    let json = env::var("CLIMATE_LOG_JSON")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let filter = EnvFilter::from_default_env();

    match env::var("CLIMATE_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), "climate-dash.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if json {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(writer)
                    .init();
            }
            Some(guard)
        },
        _ => {
            if json {
                tracing_subscriber::fmt().json().with_env_filter(filter).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
            None
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = init_logging();
    let args = Cli::parse();

    info!("Initializing climate dashboard...");

    let config = DashboardConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    let surface = if args.no_gpu {
        HeadlessSurface::unavailable()
    } else {
        HeadlessSurface::default()
    };

    let app = match App::new(config, surface, args.demo).await {
        Ok(app) => {
            info!("Application initialized successfully.");
            app
        },
        Err(e) => {
            error!("Failed to initialize application: {:?}", e);
            println!("{}", "Error: Failed to initialize application. Check logs.".red());
            return Err(e);
        },
    };

    if let Some(command) = args.command {
        return app.run_command(command).await;
    }

    println!("{}", "Welcome to the Climate Heat Dashboard!".cyan().bold());
    let status = app.dashboard().check_connection().await;
    println!("Backend {}: {}", app.dashboard().config().api_base_url, cli::paint_status(status));
    if let climate_dash::dashboard::Phase::Error(message) = app.dashboard().phase() {
        println!("{}", format!("Map unavailable: {}", message).red().bold());
    }

    // Main interactive loop
    loop {
        let demo_label = if app.dashboard().demo_mode() {
            "Turn demo mode off"
        } else {
            "Turn demo mode on"
        };
        let options = [
            "Check backend connection",
            "List stations",
            "Show station temperature series",
            "Show heatmap for a date",
            "Move along the timeline",
            "Compare two dates",
            "Regional indicators",
            demo_label,
            "Exit",
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact_opt()?
            .unwrap_or(options.len() - 1); // Ctrl-C / Esc exits

        println!("\n---\n");

        let command_result = match selection {
            0 => app.run_command(Commands::Health { watch: false }).await,
            1 => app.run_command(Commands::Stations { city: None }).await,
            2 => app.pick_station().await,
            3 => {
                let date = match cli::prompt_date("Date", app.dashboard().current_date()) {
                    Ok(d) => d,
                    Err(e) => {
                        println!("{} {}", "Failed to get date:".red(), e);
                        continue;
                    },
                };
                let variable = match cli::prompt_variable() {
                    Ok(v) => v,
                    Err(e) => {
                        println!("{} {}", "Failed to get variable:".red(), e);
                        continue;
                    },
                };
                app.run_command(Commands::Heatmap(HeatmapArgs {
                    date: Some(date),
                    variable,
                }))
                .await
            },
            4 => app.navigate_timeline().await,
            5 => {
                let timeline = app.dashboard().timeline();
                let dates = cli::prompt_date("Left date", timeline.start()).and_then(|left| {
                    cli::prompt_date("Right date", timeline.end()).map(|right| (left, right))
                });
                match dates {
                    Ok((left, right)) => {
                        app.run_command(Commands::Compare(CompareArgs { left, right }))
                            .await
                    },
                    Err(e) => {
                        println!("{} {}", "Failed to get dates:".red(), e);
                        continue;
                    },
                }
            },
            6 => match cli::prompt_country() {
                Ok(country) => {
                    app.run_command(Commands::Indicators(IndicatorsArgs {
                        country,
                        admin_level: None,
                    }))
                    .await
                },
                Err(e) => {
                    println!("{} {}", "Failed to get country:".red(), e);
                    continue;
                },
            },
            7 => {
                let enabled = app.toggle_demo_mode().await;
                println!("Demo mode {}", if enabled { "on".green() } else { "off".yellow() });
                Ok(())
            },
            _ => {
                println!("{}", "Exiting application. Goodbye!".green());
                break;
            },
        };

        if let Err(e) = command_result {
            error!("Command execution failed: {:?}", e);
            println!("{} {}", "Error executing command:".red(), e.to_string().red());
            if e.is_network() {
                let hint = cli::backend_hint(&app.dashboard().config().api_base_url);
                println!("{}", hint.yellow());
            }
        }

        println!("\n---\n");
    }

    Ok(())
}
