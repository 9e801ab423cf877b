use std::path::PathBuf;

use cafs::{StoreSession, WriteOptions};
use miette::{Context, IntoDiagnostic};

use crate::config::Config;

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The files to add to the store
    #[clap(required = true)]
    files: Vec<PathBuf>,

    /// Print the results as JSON
    #[clap(long)]
    json: bool,
}

pub async fn add(opt: Opt, store_dir: PathBuf, config: &Config) -> miette::Result<()> {
    let session = StoreSession::with_options(
        store_dir,
        WriteOptions::default().with_fsync(config.fsync),
    );

    let results = futures::future::try_join_all(opt.files.iter().map(|file| {
        let session = session.clone();
        async move {
            let content = fs_err::tokio::read(file).await.into_diagnostic()?;
            let mode = file_mode(file).await?;
            session
                .add_buffer(content, mode)
                .await
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to add '{}' to the store", file.display()))
        }
    }))
    .await?;

    for (file, result) in opt.files.iter().zip(results) {
        if opt.json {
            println!(
                "{}",
                serde_json::json!({
                    "source": file,
                    "integrity": result.integrity,
                    "path": result.file_path,
                    "checkedAt": result.checked_at,
                })
            );
        } else {
            println!(
                "{} {} {}",
                result.integrity,
                result.file_path.display(),
                result.checked_at
            );
        }
    }

    tracing::info!(
        "added {} file(s) to '{}'",
        opt.files.len(),
        session.store_dir().display()
    );
    Ok(())
}

#[cfg(unix)]
async fn file_mode(file: &std::path::Path) -> miette::Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs_err::tokio::metadata(file).await.into_diagnostic()?;
    Ok(Some(metadata.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
async fn file_mode(_file: &std::path::Path) -> miette::Result<Option<u32>> {
    Ok(None)
}
