//! Browse a host directory through the directory-children cache.
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

mod app_config;
mod local;
mod trc;

use vfs_dircache::fs::{FileId, VfsCache, VfsError, VirtualEntry};

use crate::app_config::Config;
use crate::local::{LocalDelegate, LocalRecordStore, ROOT_ID};
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Directory-children cache over the host filesystem.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a vfs-dircache config TOML."
    )]
    config_path: Option<PathBuf>,

    #[arg(short, long, help = "Directory to browse. Defaults to the current directory.")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the children of a directory.
    Ls {
        /// Slash-separated path relative to the root.
        #[arg(default_value = "")]
        path: String,
    },

    /// Resolve a path one component at a time.
    Find {
        /// Slash-separated path relative to the root.
        path: String,
    },

    /// Print the directory tree below the root.
    Tree {
        /// Stop descending below this depth.
        #[arg(short, long, default_value_t = 3)]
        max_depth: usize,
    },
}

type LocalCache = VfsCache<Arc<LocalRecordStore>>;

/// Resolves `path` component by component.
fn walk(cache: &LocalCache, path: &str) -> Result<Option<Arc<VirtualEntry>>, VfsError> {
    let mut current = cache
        .entry(cache.root())
        .ok_or(VfsError::StaleHandle { id: cache.root() })?;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        let Some(next) = cache.find_child(current.id(), component)? else {
            return Ok(None);
        };
        current = next;
    }
    Ok(Some(current))
}

fn describe(cache: &LocalCache, entry: &VirtualEntry) -> String {
    let name = cache.name_of(entry);
    if entry.is_directory() {
        format!("{name}/")
    } else if entry.is_symlink() {
        format!("{name}@")
    } else {
        name.to_string()
    }
}

fn print_tree(
    cache: &LocalCache,
    dir: FileId,
    depth: usize,
    max_depth: usize,
) -> Result<(), VfsError> {
    for child in cache.children(dir)? {
        println!("{}{}", "  ".repeat(depth), describe(cache, &child));
        if child.is_directory() && !child.is_symlink() && depth + 1 < max_depth {
            print_tree(cache, child.id(), depth + 1, max_depth)?;
        }
    }
    Ok(())
}

fn run(cache: &LocalCache, command: Command) -> Result<(), VfsError> {
    match command {
        Command::Ls { path } => {
            let Some(dir) = walk(cache, &path)? else {
                error!(path = %path, "no such file or directory");
                std::process::exit(1);
            };
            for child in cache.children(dir.id())? {
                println!("{}", describe(cache, &child));
            }
        }
        Command::Find { path } => match walk(cache, &path)? {
            Some(entry) => println!("{} {}", entry.id(), describe(cache, &entry)),
            None => {
                println!("not found");
                std::process::exit(1);
            }
        },
        Command::Tree { max_depth } => print_tree(cache, cache.root(), 0, max_depth)?,
    }
    Ok(())
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    if let Err(e) = Trc::default().init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }

    let root = args
        .root
        .or_else(|| config.root.clone())
        .map_or_else(std::env::current_dir, Ok)
        .unwrap_or_else(|e| {
            error!("Failed to determine the root directory: {e}");
            std::process::exit(1);
        });
    debug!(config = ?config, root = %root.display(), "Starting with configuration...");

    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let store = Arc::new(LocalRecordStore::new(root));
    let delegate = Arc::new(LocalDelegate::new(Arc::clone(&store), config.case_sensitive));
    let cache = match VfsCache::new(store, delegate, ROOT_ID, &root_name, config.cache) {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open the root directory: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cache, args.command) {
        error!("{e}");
        std::process::exit(1);
    }
}
