//! houdini-manage CLI
//!
//! Install, remove and inspect libraries registered in a Houdini env file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use houdini_manage::config::normalize_path;
use houdini_manage::{
    install_library, installed_libraries, resolve_envfile_path, uninstall_library, Decoder, Envfile,
    InstallOptions, InstallOutcome, LibraryDescriptor, Preferences,
};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "houdini-manage")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Manage libraries installed into a Houdini environment file")]
struct Cli {
    /// Houdini version name (e.g. houdini16.0) or path to a houdini.env file
    #[arg(short = 'e', long = "env", global = true)]
    hou: Option<String>,

    /// Preferences file (default: ~/.houdini-manage.ini)
    #[arg(long, global = true)]
    preferences: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all installed libraries
    List,

    /// Install the library in the given directory
    Install {
        /// Library directory containing houdini-library.json
        directory: PathBuf,

        /// Overwrite a previous installation of the same library
        #[arg(long)]
        overwrite: bool,

        /// Print the new env file instead of saving it
        #[arg(long)]
        dry: bool,
    },

    /// Remove an installed library
    Remove {
        /// Library name
        name: String,

        /// Print the new env file instead of saving it
        #[arg(long)]
        dry: bool,
    },

    /// Print the version of an installed library
    VersionOf {
        /// Library name
        name: String,
    },

    /// Print the path of an installed library
    PathOf {
        /// Library name
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let prefs = match &cli.preferences {
        Some(path) => Preferences::load_from(path)?,
        None => Preferences::load()?,
    };
    let envfile_path = resolve_envfile_path(cli.hou.as_deref(), &prefs)?;
    if !envfile_path.is_file() {
        bail!("file does not exist: {}", envfile_path.display());
    }
    debug!(path = %envfile_path.display(), "using env file");

    let mut env = Decoder::new()
        .decode_file(&envfile_path)
        .with_context(|| format!("Failed to parse: {}", envfile_path.display()))?;

    match cli.command {
        Commands::List => list_libraries(&env),
        Commands::VersionOf { name } => print_library_value(&env, &name, true),
        Commands::PathOf { name } => print_library_value(&env, &name, false),
        Commands::Remove { name, dry } => {
            uninstall_library(&mut env, &name).with_context(|| format!("library \"{}\" not installed", name))?;
            println!("library \"{}\" removed", name);
            finish(&mut env, &envfile_path, dry)
        }
        Commands::Install { directory, overwrite, dry } => {
            install(&mut env, &directory, overwrite)?;
            finish(&mut env, &envfile_path, dry)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn list_libraries(env: &Envfile) -> Result<()> {
    for lib in installed_libraries(env) {
        println!(
            "* {} v{} ({})",
            lib.name,
            lib.version.as_deref().unwrap_or("???"),
            lib.path.as_deref().unwrap_or("???")
        );
    }
    Ok(())
}

fn print_library_value(env: &Envfile, name: &str, version: bool) -> Result<()> {
    let section = match env.get_library(name) {
        Some(section) => section,
        None => bail!("library \"{}\" not installed", name),
    };
    let value = if version {
        section.library_version()
    } else {
        section.library_path()
    };
    println!("{}", value.as_deref().unwrap_or("???"));
    Ok(())
}

fn install(env: &mut Envfile, directory: &Path, overwrite: bool) -> Result<()> {
    let directory = std::path::absolute(directory)
        .with_context(|| format!("Invalid library directory: {}", directory.display()))?;
    let directory = normalize_path(&directory);
    let descriptor = LibraryDescriptor::load(&directory)?;

    let outcome = install_library(env, &descriptor, &directory, &InstallOptions::new(overwrite))
        .with_context(|| {
            format!(
                "cannot install \"{}\" (pass --overwrite to replace a previous installation)",
                descriptor.library_name
            )
        })?;
    if outcome == InstallOutcome::Overwritten {
        println!("note: overwriting previous installation");
    }
    println!("library \"{}\" installed", descriptor.library_name);
    Ok(())
}

/// Save the env file, or print it when `dry` is set
fn finish(env: &mut Envfile, path: &Path, dry: bool) -> Result<()> {
    if dry {
        print!("{}", env);
        return Ok(());
    }
    let file = fs::File::create(path).with_context(|| format!("Failed to write: {}", path.display()))?;
    env.render(BufWriter::new(file))
        .with_context(|| format!("Failed to write: {}", path.display()))?;
    Ok(())
}
