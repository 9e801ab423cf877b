use std::path::PathBuf;

use cafs::{file_path_in_store, FileKind, IntegrityDescriptor};

#[derive(Debug, clap::Parser)]
pub struct Opt {
    /// The integrity of the content, e.g. `sha512-<base64 digest>`
    #[clap(long)]
    integrity: IntegrityDescriptor,

    /// Print the path of the executable variant
    #[clap(long)]
    exec: bool,
}

pub fn path(opt: Opt, store_dir: PathBuf) -> miette::Result<()> {
    let kind = if opt.exec {
        FileKind::Executable
    } else {
        FileKind::NonExecutable
    };
    let path = store_dir.join(file_path_in_store(&opt.integrity, kind));
    println!("{}", path.display());
    Ok(())
}
