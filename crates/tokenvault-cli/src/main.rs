//! TokenVault CLI — `tvault` command.
//!
//! Administers capability tokens and moves objects in and out of the typed
//! store. The `--token` value is checked exactly as an `X-AUTH-TOKEN` header
//! would be.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use tokenvault::config::CONFIG_FILE_NAME;
use tokenvault::registry::BOOTSTRAP_ISSUER_ID;
use tokenvault::{Config, FileObject, FileType, Gate, Token, TokenId};

// ── CLI structure ─────────────────────────────────────────────────────────────

/// TokenVault CLI — manage bearer tokens and the objects they guard.
#[derive(Parser, Debug)]
#[command(
    name = "tvault",
    about = "TokenVault CLI",
    version,
    long_about = "tvault — TokenVault CLI\n\nMint, promote and revoke bearer tokens, and upload or download\nimages, videos and gifs from the typed object store."
)]
struct Cli {
    /// Config file (default: ./tokenvault.toml, falling back to built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bearer token presented for authenticated commands
    #[arg(long, global = true, env = "TVAULT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open or create the token registry and object listing
    Init,

    /// Manage tokens (requires an issuer token)
    Token {
        #[command(subcommand)]
        subcommand: TokenCommands,
    },

    /// Store and retrieve objects
    Object {
        #[command(subcommand)]
        subcommand: ObjectCommands,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommands {
    /// List tokens
    List {
        /// Only show activated tokens
        #[arg(long)]
        active: bool,
    },

    /// Show a single token
    Show {
        /// Token id
        id: String,
    },

    /// Mint a new token issued by the presented token
    Create {
        /// Human-readable label
        name: String,
    },

    /// Permanently deactivate a token
    Deactivate {
        /// Token id
        id: String,
    },

    /// Grant issuer privilege to a token
    Op {
        /// Token id
        id: String,
    },

    /// Revoke issuer privilege from a token
    Deop {
        /// Token id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ObjectCommands {
    /// Upload a file (requires a token)
    Put {
        /// File to upload
        file: PathBuf,

        /// Object kind (image, video, gif); guessed from the file when omitted
        #[arg(long)]
        kind: Option<FileType>,

        /// Declared content type (default: guessed from the file extension)
        #[arg(long)]
        content_type: Option<String>,

        /// Name recorded for the object (default: the file's name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Download an object
    Get {
        /// Object id, optionally with an extension
        id: String,

        /// Object kind (image, video, gif)
        #[arg(long)]
        kind: FileType,

        /// Output file path (default: stdout)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// List stored objects
    List,
}

// ── Main entry point ──────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let verbose = cli.verbose;
    let json = cli.json;
    let token = cli.token.as_deref();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Init => cmd_init(&config, verbose),
        Commands::Token { subcommand } => {
            let gate = open_gate(&config)?;
            match subcommand {
                TokenCommands::List { active } => cmd_token_list(&gate, token, active, json),
                TokenCommands::Show { id } => cmd_token_show(&gate, token, &id, json),
                TokenCommands::Create { name } => cmd_token_create(&gate, token, &name),
                TokenCommands::Deactivate { id } => cmd_token_deactivate(&gate, token, &id),
                TokenCommands::Op { id } => cmd_token_op(&gate, token, &id),
                TokenCommands::Deop { id } => cmd_token_deop(&gate, token, &id),
            }
        }
        Commands::Object { subcommand } => {
            let gate = open_gate(&config)?;
            match subcommand {
                ObjectCommands::Put {
                    file,
                    kind,
                    content_type,
                    name,
                } => cmd_object_put(
                    &gate,
                    token,
                    &file,
                    kind,
                    content_type.as_deref(),
                    name.as_deref(),
                    verbose,
                ),
                ObjectCommands::Get { id, kind, out } => {
                    cmd_object_get(&gate, &id, kind, out.as_deref())
                }
                ObjectCommands::List => cmd_object_list(&gate, json, verbose),
            }
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

// ── Setup helpers ─────────────────────────────────────────────────────────────

/// An explicit `--config` must exist; the implicit one may be absent.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_or_default(Path::new(CONFIG_FILE_NAME))
            .context("failed to load config")?,
    };
    log::debug!("using config {config:?}");
    Ok(config)
}

fn open_gate(config: &Config) -> Result<Gate> {
    let registry = config
        .open_registry()
        .with_context(|| format!("failed to open token registry {}", config.tokens.path.display()))?;
    let store = config.open_store().with_context(|| {
        format!(
            "failed to open object listing {}",
            config.objects.listing_path.display()
        )
    })?;
    Ok(Gate::new(Arc::new(registry), Arc::new(store)))
}

fn bootstrap_privileged(gate: &Gate) -> bool {
    gate.registry()
        .bootstrap_token()
        .is_some_and(|b| gate.registry().verify_issuer_perms(&b))
}

fn token_status(token: &Token, issuers: &[TokenId]) -> String {
    let mut status = if token.activated {
        "active".to_string()
    } else {
        "deactivated".to_string()
    };
    if issuers.contains(&token.id) {
        status.push_str(" [ISSUER]");
    }
    status
}

// ── Command implementations ───────────────────────────────────────────────────

/// `tvault init`
fn cmd_init(config: &Config, verbose: bool) -> Result<()> {
    let gate = open_gate(config)?;
    let registry = gate.registry();
    let store = gate.store();

    println!("Token registry: {}", registry.path().display());
    println!("  Tokens:  {}", registry.list_tokens(false).len());
    println!("  Issuers: {}", registry.issuers().len());
    if bootstrap_privileged(&gate) {
        println!("  Bootstrap issuer: {BOOTSTRAP_ISSUER_ID} (promote another issuer to retire it)");
    } else {
        println!("  Bootstrap issuer: retired");
    }

    println!("Object listing: {}", store.listing_path().display());
    println!("  Storage: {}", store.storage_dir().display());
    println!("  Objects: {}", store.len());

    if verbose {
        println!("  Token ids:  {}", config.tokens.id_scheme);
        println!("  Object ids: {}", config.objects.uid_scheme);
        println!("  Retries:    {}", config.persistence.retries);
    }

    Ok(())
}

/// `tvault token list [--active]`
fn cmd_token_list(gate: &Gate, token: Option<&str>, active: bool, json: bool) -> Result<()> {
    let tokens = gate.list(token, active)?;
    let issuers = gate.registry().issuers();

    if json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
        return Ok(());
    }

    if tokens.is_empty() {
        println!("No tokens");
        return Ok(());
    }

    println!("{:<24} {:<20} {:<24} STATUS", "ID", "NAME", "ISSUED BY");
    println!("{}", "-".repeat(84));
    for t in &tokens {
        println!(
            "{:<24} {:<20} {:<24} {}",
            t.id,
            t.name,
            t.issuer,
            token_status(t, &issuers)
        );
    }

    Ok(())
}

/// `tvault token show ID`
fn cmd_token_show(gate: &Gate, token: Option<&str>, id: &str, json: bool) -> Result<()> {
    let t = gate.show(token, &TokenId::from(id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&t)?);
        return Ok(());
    }
    let issuers = gate.registry().issuers();

    println!("Token: {}", t.name);
    println!("  ID:        {}", t.id);
    println!("  Issued by: {}", t.issuer);
    println!("  Status:    {}", token_status(&t, &issuers));
    println!(
        "  Issuer valid: {}",
        if gate.registry().verify_valid_issuer(&t) {
            "yes"
        } else {
            "no"
        }
    );

    Ok(())
}

/// `tvault token create NAME`
fn cmd_token_create(gate: &Gate, token: Option<&str>, name: &str) -> Result<()> {
    let t = gate.mint(token, name).context("failed to create token")?;

    println!("Created token '{}'", t.name);
    println!("  ID:        {}", t.id);
    println!("  Issued by: {}", t.issuer);

    Ok(())
}

/// `tvault token deactivate ID`
fn cmd_token_deactivate(gate: &Gate, token: Option<&str>, id: &str) -> Result<()> {
    let t = gate
        .deactivate(token, &TokenId::from(id))
        .context("failed to deactivate token")?;
    println!("Deactivated token '{}' ({})", t.name, t.id);
    Ok(())
}

/// `tvault token op ID`
fn cmd_token_op(gate: &Gate, token: Option<&str>, id: &str) -> Result<()> {
    let id = TokenId::from(id);
    let bootstrap_live = bootstrap_privileged(gate);

    if gate.promote(token, &id).context("failed to promote token")? {
        println!("Token {id} is now an issuer");
    } else {
        println!("Token {id} is already an issuer");
    }

    if bootstrap_live && !bootstrap_privileged(gate) {
        println!("Bootstrap issuer {BOOTSTRAP_ISSUER_ID} retired.");
        println!("  Tokens it minted, {id} included, no longer authenticate.");
    }
    Ok(())
}

/// `tvault token deop ID`
fn cmd_token_deop(gate: &Gate, token: Option<&str>, id: &str) -> Result<()> {
    let id = TokenId::from(id);
    if gate.demote(token, &id).context("failed to demote token")? {
        println!("Token {id} is no longer an issuer");
    } else {
        println!("Token {id} was not an issuer");
    }
    Ok(())
}

/// `tvault object put FILE [--kind KIND] [--content-type TYPE] [--name NAME]`
fn cmd_object_put(
    gate: &Gate,
    token: Option<&str>,
    file: &Path,
    kind: Option<FileType>,
    content_type: Option<&str>,
    name: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let payload =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let content_type = match content_type {
        Some(ct) => ct.to_string(),
        None => mime_guess::from_path(file)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    };
    let kind = kind.unwrap_or_else(|| FileType::from_content_type(&content_type));
    if kind == FileType::Invalid {
        return Err(anyhow!(
            "{} has unsupported content type '{content_type}'",
            file.display()
        ));
    }

    let name = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{} has no file name", file.display()))?,
    };

    let obj = gate
        .upload(token, kind, &content_type, &name, &payload)
        .context("failed to store object")?;

    println!("Stored {} {}", obj.kind, obj.uid);
    if verbose {
        println!("  Path:  {}", obj.path().display());
        println!("  Bytes: {}", payload.len());
    }

    Ok(())
}

/// `tvault object get ID --kind KIND [--out FILE]`
fn cmd_object_get(gate: &Gate, id: &str, kind: FileType, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            let obj = gate.locate(kind, id)?;
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let written = gate
                .store()
                .read_object(&obj, &mut file)
                .map_err(anyhow::Error::from)
                .and_then(|n| file.flush().map(|()| n).map_err(Into::into));
            let n = match written {
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    if let Err(rm) = std::fs::remove_file(path) {
                        log::warn!("could not remove partial {}: {rm}", path.display());
                    }
                    return Err(e);
                }
            };
            eprintln!("Wrote {n} bytes to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            gate.download(kind, id, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

/// `tvault object list`
fn cmd_object_list(gate: &Gate, json: bool, verbose: bool) -> Result<()> {
    let objects: Vec<FileObject> = gate.store().list_objects();

    if json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
        return Ok(());
    }

    if objects.is_empty() {
        println!("No objects in {}", gate.store().storage_dir().display());
        return Ok(());
    }

    println!("{:<24} {:<6} FILENAME", "UID", "KIND");
    println!("{}", "-".repeat(72));
    for obj in &objects {
        println!("{:<24} {:<6} {}", obj.uid, obj.kind, obj.filename);
        if verbose {
            println!("    {}", obj.path().display());
        }
    }

    Ok(())
}
