mod adapter;
mod cli;
mod config;
mod prompt;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use qmanager_client::QmClient;
use qmanager_protocol::StorageScope;
use qmanager_session::{SessionPhase, TransferEvent, TransferOrchestrator};
use qmanager_transfer::{check_image_file, resolve_upload_source};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use adapter::ClientAdapter;
use cli::Cli;
use config::QmConfig;
use prompt::Prompter;

type Orchestrator = TransferOrchestrator<ClientAdapter>;

const ENTER_PATH: &str = "Enter file path: ";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info,qmanager=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = QmConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.control_port = port;
    }
    if cli.max_polls.is_some() {
        config.max_polls = cli.max_polls;
    }
    if cli.no_compress {
        config.compress = false;
    }

    let op = cli.operation();
    let scope = StorageScope::from_shared(cli.shared);
    let mut server = cli
        .qmanager_server
        .clone()
        .unwrap_or_else(|| config.server.clone());
    let mut user = cli.user_name.clone();
    let file_path = match &cli.file_path {
        Some(path) if !cli.download => Some(resolve_upload_source(path)?),
        other => other.clone(),
    };

    let mut prompter = (!cli.no_confirm).then(Prompter::stdio);
    if let Some(p) = prompter.as_mut() {
        while !p.confirm("Use QM server", &server, true)? {
            server = p.ask("QM server: ")?;
        }
        while !p.confirm(&format!("{op} as user"), &user, true)? {
            user = p.ask("Enter user name: ")?;
        }
    }

    let client = QmClient::new(&server, config.control_port, config.rpc_timeout())?;
    let url = client.url().to_string();
    let mut orch = TransferOrchestrator::new(
        ClientAdapter::new(client),
        config.transfer_config(&server, cli.quiet),
    );

    let chosen = match prompter.as_mut() {
        Some(p) => choose_file(p, &orch, cli.download, &user, file_path).await?,
        None if file_path.is_none() => {
            list_remote_files(&orch, &user).await?;
            None
        }
        None => given_file(cli.download, file_path)?,
    };
    let Some(path) = chosen else {
        return Ok(());
    };

    let printer = match (cli.quiet, orch.take_events()) {
        (false, Some(events)) => Some(tokio::spawn(print_events(events))),
        _ => None,
    };
    let cancel = orch.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = if cli.download {
        let path = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
        if !cli.quiet {
            let remote = scope.remote_name(&path)?;
            println!(
                "User \"{user}\" downloading {scope} file \"{remote}\" from QM server {url} to \"{}\"",
                path.display()
            );
        }
        orch.download(&user, &path, scope).await
    } else {
        if !cli.quiet {
            println!(
                "User \"{user}\" uploading {scope} file \"{}\" to QM server {url}",
                path.display()
            );
        }
        orch.upload(&user, &path, scope).await
    };

    drop(orch);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let session = outcome.with_context(|| format!("failed to {} {scope} file", op.to_lowercase()))?;
    if !cli.quiet {
        let local = session.local_path.display();
        if cli.download {
            println!("successfully received {scope} file from qmanager: {local}");
        } else {
            println!("successfully sent {scope} file ({}) to qmanager", path.display());
        }
    }
    Ok(())
}

/// Settles the local file interactively. `None` when there is nothing to
/// transfer.
async fn choose_file<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    orch: &Orchestrator,
    download: bool,
    user: &str,
    mut path: Option<PathBuf>,
) -> anyhow::Result<Option<PathBuf>> {
    let op = if download { "Download" } else { "Upload" };
    let mut files: Vec<String> = Vec::new();

    loop {
        let mut candidate = match path.take() {
            Some(given) => in_current_dir(given),
            None if download => {
                if files.is_empty() {
                    files = orch.list_files(user).await.context("unable to list files")?;
                    if files.is_empty() {
                        prompter.say(&format!("no files available for user: {user}"))?;
                        return Ok(None);
                    }
                }
                prompter.say(&format!("\nFiles available for {user}:"))?;
                let name = prompter.choose("choose file to download", &files)?;
                Path::new(".").join(name)
            }
            None => PathBuf::from(prompter.ask(ENTER_PATH)?),
        };

        let question = if download {
            let name = candidate
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{op} file \"{name}\" as")
        } else {
            format!("{op} file")
        };
        while !prompter.confirm(&question, &candidate.display().to_string(), true)? {
            candidate = PathBuf::from(prompter.ask(ENTER_PATH)?);
        }

        if download {
            match candidate.parent() {
                Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
                    prompter.say(&format!("directory {} does not exist", dir.display()))?;
                }
                _ => return Ok(Some(candidate)),
            }
        } else {
            match check_image_file(&candidate) {
                Ok(()) => return Ok(Some(candidate)),
                Err(e) => prompter.say(&e.to_string())?,
            }
        }
        path = Some(PathBuf::from(prompter.ask(ENTER_PATH)?));
    }
}

/// Settles the file named on the command line without prompting. Uploads
/// must name a supported image.
fn given_file(download: bool, path: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    if !download && let Some(path) = &path {
        check_image_file(path)?;
    }
    Ok(path)
}

/// Bare file names are taken relative to the current directory.
fn in_current_dir(path: PathBuf) -> PathBuf {
    if path.parent().is_none_or(|dir| dir.as_os_str().is_empty()) {
        Path::new(".").join(path)
    } else {
        path
    }
}

async fn list_remote_files(orch: &Orchestrator, user: &str) -> anyhow::Result<()> {
    let files = orch
        .list_files(user)
        .await
        .context("unable to list files")?;
    if files.is_empty() {
        println!("no files available for user: {user}");
        return Ok(());
    }
    println!("Files available for {user}:");
    for file in files {
        println!("  {file}");
    }
    Ok(())
}

/// Prints confirmation progress the way the transfer log reads:
/// `waiting to confirm upload....`
async fn print_events(mut events: mpsc::Receiver<TransferEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Phase {
                direction,
                phase: SessionPhase::Confirming,
                ..
            } => {
                let _ = write!(stdout, "waiting to confirm {direction}");
            }
            TransferEvent::Polling { attempt, .. } if attempt > 1 => {
                let _ = write!(stdout, ".");
            }
            TransferEvent::Completed { .. }
            | TransferEvent::Failed {
                phase: SessionPhase::Confirming,
                ..
            } => {
                let _ = writeln!(stdout);
            }
            _ => continue,
        }
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_resolve_in_current_dir() {
        assert_eq!(
            in_current_dir(PathBuf::from("disk.img")),
            PathBuf::from("./disk.img")
        );
        assert_eq!(
            in_current_dir(PathBuf::from("/tmp/disk.img")),
            PathBuf::from("/tmp/disk.img")
        );
        assert_eq!(
            in_current_dir(PathBuf::from("images/disk.img")),
            PathBuf::from("images/disk.img")
        );
    }

    #[test]
    fn given_upload_must_be_supported_image() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("disk.raw");
        let img = dir.path().join("disk.img");
        std::fs::write(&raw, b"data").unwrap();
        std::fs::write(&img, b"data").unwrap();

        let err = given_file(false, Some(raw.clone())).unwrap_err();
        assert!(err.to_string().contains(".raw unsupported"), "{err}");
        assert_eq!(given_file(false, Some(img.clone())).unwrap(), Some(img));
    }

    #[test]
    fn given_download_target_is_not_checked() {
        let dst = PathBuf::from("./not-yet-there.raw");
        assert_eq!(given_file(true, Some(dst.clone())).unwrap(), Some(dst));
        assert_eq!(given_file(false, None).unwrap(), None);
    }
}
