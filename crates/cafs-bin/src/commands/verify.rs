use std::path::PathBuf;

use cafs::{check_file, IntegrityDescriptor};
use miette::IntoDiagnostic;

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The file to check
    #[clap(required = true)]
    file: PathBuf,

    /// The expected integrity, e.g. `sha512-<base64 digest>`
    #[clap(long)]
    integrity: IntegrityDescriptor,

    /// The expected size of the file in bytes
    #[clap(long)]
    size: Option<u64>,
}

pub async fn verify(opt: Opt) -> miette::Result<()> {
    let descriptor = match opt.size {
        Some(size) => opt.integrity.with_size(size),
        None => opt.integrity,
    };

    let file = opt.file;
    let result = tokio::task::spawn_blocking(move || {
        check_file(&file, &descriptor).map_err(|e| (file, e))
    })
    .await
    .into_diagnostic()?;

    match result {
        Ok(()) => {
            println!("ok");
            Ok(())
        }
        Err((file, err)) => Err(miette::miette!("'{}' does not match: {err}", file.display())),
    }
}
