use std::path::Path;

use tokio::{
    fs::{self, File},
    io::{self, AsyncBufReadExt, Lines},
};

/// Read a file from the given path into a list of lines
pub async fn read_file(path: &str) -> io::Result<Vec<String>> {
    let mut r = file_reader(path).await?;
    let mut lines = Vec::new();

    while let Some(line) = r.next_line().await? {
        lines.push(line);
    }

    Ok(lines)
}

async fn file_reader(path: &str) -> io::Result<Lines<io::BufReader<File>>> {
    let f = File::open(path).await?;

    Ok(io::BufReader::new(f).lines())
}

/// Create an empty output directory
///
/// An existing directory is an error unless `force` is set, in which case it is replaced.
pub async fn prepare_output_dir(path: &Path, force: bool) -> io::Result<()> {
    if fs::try_exists(path).await? {
        if !force {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "{} already exists, pass -f to overwrite it",
                    path.display()
                ),
            ));
        }

        log::warn!("Removing existing output directory {}", path.display());

        fs::remove_dir_all(path).await?;
    }

    fs::create_dir_all(path).await
}
