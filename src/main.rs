//! lgsync - synchronize Logitech gaming-software profiles with a host.
#![forbid(unsafe_code)]

use clap::Parser;
use tracing::info;

use lgsync::cli::{Cli, Commands, ListArgs, ParseArgs, RunArgs};
use lgsync::config::Settings;
use lgsync::error::{LgsError, Result};
use lgsync::host::{JsonNotifier, TextNotifier};
use lgsync::logging;
use lgsync::profile::{self, base_device_type, device_layout};
use lgsync::sync::{SHUTDOWN_TIMEOUT, SyncService};

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.json, cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => cmd_run(cli, args),
        Commands::Parse(args) => cmd_parse(cli, args),
        Commands::List(args) => cmd_list(cli, args),
    }
}

fn settings_for(dir: Option<&std::path::Path>, devices: &[String]) -> Settings {
    let mut settings = Settings {
        profiles_dir: dir.map(std::path::Path::to_path_buf),
        ..Settings::default()
    };
    settings.set_device_filter(devices.to_vec());
    settings
}

fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut settings = settings_for(args.dir.as_deref(), &args.devices);
    settings.set_poll_interval_ms(args.poll_ms);
    settings.set_auto_switch(!args.no_auto_switch);
    if let Some(text) = &args.unmapped {
        settings.set_unmapped_text(text.clone());
    }
    settings.native_fs_events = !args.no_native_fs;

    let handle = if cli.json {
        SyncService::start(settings, JsonNotifier)?
    } else {
        SyncService::start(settings, TextNotifier)?
    };

    // Block until Ctrl+C, then drain through an orderly shutdown.
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| LgsError::Other(format!("Cannot install signal handler: {e}")))?;

    info!("Running, press Ctrl+C to stop");
    let _ = stop_rx.recv();
    info!("Interrupted, shutting down");

    if !handle.shutdown(SHUTDOWN_TIMEOUT) {
        return Err(LgsError::Other("Shutdown timed out".into()));
    }
    Ok(())
}

fn cmd_parse(cli: &Cli, args: &ParseArgs) -> Result<()> {
    let prof = if args.header_only {
        profile::parse_header(&args.file)?
    } else {
        profile::parse_full(&args.file, &args.devices)?
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&prof).unwrap());
        return Ok(());
    }

    println!("{} ({})", prof.name, prof.guid);
    println!("  last used: {}", prof.last_used);
    println!("  size: {} bytes", prof.file_size);
    if !prof.description.is_empty() {
        println!("  description: {}", prof.description);
    }
    if !prof.targets.is_empty() {
        println!("  targets: {}", prof.targets.join(", "));
    }
    if args.header_only {
        return Ok(());
    }
    println!("  macros: {}", prof.macros.len());
    for device in &args.devices {
        let base = base_device_type(device);
        let Some(layout) = device_layout(base) else {
            continue;
        };
        let count = prof.assignments.get(base).map_or(0, std::collections::HashMap::len);
        println!("  {base}: {count} assignments across {} slots", layout.slots);
        for (slot, name) in prof.state_names_for(base, layout.slots) {
            println!("    {slot}: {name}");
        }
    }
    Ok(())
}

fn cmd_list(cli: &Cli, args: &ListArgs) -> Result<()> {
    let dir = args
        .dir
        .clone()
        .or_else(lgsync::config::default_profiles_dir)
        .ok_or(LgsError::NoProfilesDir)?;
    if !dir.is_dir() {
        return Err(LgsError::ProfilesDirNotFound { path: dir });
    }

    let registry = profile::parse_dir(&dir, &args.devices);
    let mut profiles: Vec<_> = registry.into_values().collect();
    profiles.sort_by(|a, b| a.name.cmp(&b.name));

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&profiles).unwrap());
    } else if profiles.is_empty() {
        println!("No profiles found in {}", dir.display());
    } else {
        for prof in &profiles {
            println!(
                "{}  {}  (last used {}, {} macros)",
                prof.guid,
                prof.name,
                prof.last_used,
                prof.macros.len()
            );
        }
    }
    Ok(())
}

fn output_error(cli: &Cli, error: &LgsError) {
    if cli.json {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        eprintln!("Error: {error}");
        if let Some(suggestion) = error.suggestion() {
            eprintln!("Hint: {suggestion}");
        }
    }
}
