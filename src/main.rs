use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use forester::repository::Repository;
use forester::{branch, checkout, commit, gc, lock, logging, rebuild, stash, tag, workspace};

#[derive(Parser)]
#[command(name = "forester")]
#[command(about = "Version control for 3D asset repositories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Init {
        path: Option<PathBuf>,
    },
    /// Record the current workspace state as a new commit
    Commit {
        #[arg(short = 'm', long, default_value = "")]
        message: String,
        #[arg(short = 'a', long, default_value = "unknown")]
        author: String,
        #[arg(long)]
        no_verify: bool,
    },
    /// Branch operations
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },
    /// Switch the workspace to a branch or commit
    Checkout {
        target: String,
        #[arg(long)]
        force: bool,
    },
    /// Stash operations
    Stash {
        #[command(subcommand)]
        action: StashAction,
    },
    /// Show workspace changes relative to HEAD
    Status,
    /// Rebuild the index database from on-disk objects
    Rebuild {
        #[arg(long)]
        no_backup: bool,
    },
    /// Show a commit
    Show {
        hash: String,
        #[arg(long)]
        full: bool,
    },
    /// List commits on a branch
    Log {
        branch: Option<String>,
        #[arg(short = 'v', long)]
        verbose: bool,
    },
    /// Tag operations
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Lock a file path against concurrent edits
    Lock {
        path: String,
        #[arg(long, default_value = "exclusive")]
        kind: String,
        #[arg(long)]
        expires_after: Option<i64>,
    },
    /// Release a lock
    Unlock {
        path: String,
    },
    /// List held locks
    Locks,
    /// Garbage-collect unreachable objects
    Gc {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum BranchAction {
    Create {
        name: String,
        #[arg(long)]
        from: Option<String>,
    },
    List,
    Delete {
        name: String,
        #[arg(long)]
        force: bool,
    },
    Switch {
        name: String,
    },
}

#[derive(Subcommand)]
enum StashAction {
    Create {
        #[arg(short = 'm', long, default_value = "")]
        message: String,
    },
    List,
    Apply {
        hash: String,
        #[arg(long)]
        force: bool,
    },
    Delete {
        hash: String,
    },
}

#[derive(Subcommand)]
enum TagAction {
    Create {
        name: String,
        commit: Option<String>,
    },
    List,
    Delete {
        name: String,
    },
    Show {
        name: String,
    },
}

fn current_author() -> String {
    std::env::var("FORESTER_AUTHOR").unwrap_or_else(|_| "unknown".to_string())
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from("."));
            Repository::init(&path)?;
            println!("initialized empty forester repository in {}/.DFM", path.display());
        }

        Commands::Commit { message, author, no_verify } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let author = if author == "unknown" { current_author() } else { author };
            match commit::commit_project(&repo, &message, &author, !no_verify)? {
                Some(hash) => println!("created commit {}", &hash[..8]),
                None => println!("nothing to commit, workspace matches HEAD"),
            }
        }

        Commands::Branch { action } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            match action {
                BranchAction::Create { name, from } => branch::create(&repo, &name, from.as_deref())?,
                BranchAction::List => branch::list(&repo)?,
                BranchAction::Delete { name, force } => branch::delete(&repo, &name, force)?,
                BranchAction::Switch { name } => branch::switch(&repo, &name)?,
            }
        }

        Commands::Checkout { target, force } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            match checkout::checkout(&repo, &target, force)? {
                Some(hash) => println!("checked out {target} at {}", &hash[..8]),
                None => println!("checked out {target} (no commits yet)"),
            }
        }

        Commands::Stash { action } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            match action {
                StashAction::Create { message } => match stash::create(&repo, &message)? {
                    Some(hash) => println!("saved stash {}", &hash[..8]),
                    None => println!("no local changes to stash"),
                },
                StashAction::List => stash::list(&repo)?,
                StashAction::Apply { hash, force } => {
                    stash::apply(&repo, &hash, force)?;
                    println!("applied stash {}", &hash[..8.min(hash.len())]);
                }
                StashAction::Delete { hash } => {
                    stash::delete(&repo, &hash)?;
                    println!("deleted stash {}", &hash[..8.min(hash.len())]);
                }
            }
        }

        Commands::Status => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let branch = repo.db.get_current_branch()?;
            let head = repo.head()?;
            println!("on branch {branch}");

            let head_tree_hash = match head.commit() {
                Some(h) => Some(repo.storage.load_commit(h)?.tree_hash),
                None => None,
            };
            let tree = match head.commit() {
                Some(h) if repo.storage.load_commit(h)?.commit_type == forester::object::CommitType::MeshOnly => {
                    workspace::scan_and_build_tree(&repo)?
                }
                _ => workspace::scan_and_build_tree_for_project_commit(&repo)?,
            };
            if workspace::trees_equal(&tree.hash(), head_tree_hash.as_deref()) {
                println!("nothing to commit, workspace clean");
            } else {
                println!("workspace has uncommitted changes ({} tracked files)", tree.entries.len());
            }
        }

        Commands::Rebuild { no_backup } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let report = rebuild::rebuild(&repo, no_backup)?;
            println!(
                "restored {} commits, {} trees, {} blobs, {} meshes",
                report.commits_restored, report.trees_restored, report.blobs_restored, report.meshes_restored
            );
            for name in &report.dangling_branches {
                println!("warning: branch '{name}' points at a missing commit");
            }
        }

        Commands::Show { hash, full } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let commit = repo.storage.load_commit(&hash)?;
            if full {
                println!("{}", serde_json::to_string_pretty(&commit)?);
            } else {
                println!("commit {hash}");
                println!("author: {}", commit.author);
                println!("branch: {}", commit.branch);
                println!("message: {}", commit.message);
            }
        }

        Commands::Log { branch: branch_name, verbose } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let branch_name = branch_name.unwrap_or(repo.db.get_current_branch()?);
            let commits = repo.db.get_commits_by_branch(&branch_name)?;
            for c in commits.into_iter().rev() {
                if verbose {
                    println!("commit {}\nauthor: {}\ndate: {}\n\n    {}\n", c.hash, c.author, c.timestamp, c.message);
                } else {
                    println!("{} {}", &c.hash[..8], c.message);
                }
            }
        }

        Commands::Tag { action } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            match action {
                TagAction::Create { name, commit } => {
                    let hash = tag::create(&repo, &name, commit.as_deref())?;
                    println!("created tag '{name}' at {}", &hash[..8]);
                }
                TagAction::List => tag::list(&repo)?,
                TagAction::Delete { name } => {
                    tag::delete(&repo, &name)?;
                    println!("deleted tag '{name}'");
                }
                TagAction::Show { name } => {
                    let hash = tag::show(&repo, &name)?;
                    println!("{hash}");
                }
            }
        }

        Commands::Lock { path, kind, expires_after } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let author = current_author();
            let acquired = lock::lock_file(&repo, &path, &author, &kind, None, expires_after)?;
            if acquired {
                println!("locked '{path}'");
            } else {
                bail!("'{path}' is already locked");
            }
        }

        Commands::Unlock { path } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let author = current_author();
            if lock::unlock_file(&repo, &path, &author, None)? {
                println!("unlocked '{path}'");
            } else {
                bail!("no lock held on '{path}' by '{author}'");
            }
        }

        Commands::Locks => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let locks = lock::list_locks(&repo)?;
            if locks.is_empty() {
                println!("no locks held");
            }
            for l in locks {
                println!("{} locked by {} ({})", l.file_path, l.locked_by, l.lock_type);
            }
        }

        Commands::Gc { dry_run } => {
            let repo = Repository::open(&PathBuf::from("."))?;
            let stats = gc::gc(&repo, dry_run)?;
            println!(
                "removed {} blobs, {} trees, {} commits, {} meshes ({} bytes freed){}",
                stats.blobs_removed,
                stats.trees_removed,
                stats.commits_removed,
                stats.meshes_removed,
                stats.bytes_freed,
                if dry_run { " [dry run]" } else { "" }
            );
        }
    }

    Ok(())
}
