use super::ArchiveFormat;
use crate::error::Error;
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

enum Container {
    Tar(tar::Builder<BufWriter<File>>),
    TarGz(tar::Builder<GzEncoder<BufWriter<File>>>),
    TarBz2(tar::Builder<BzEncoder<BufWriter<File>>>),
    Zip(ZipWriter<BufWriter<File>>),
}

/// Writes one output archive.
///
/// Members are streamed into `<final>.partial`; the file is renamed to its
/// final name only by [`BundleWriter::finish`]. Dropping an unfinished writer,
/// or a failed `finish`, removes the partial file.
///
/// Zip rejects repeated member names, so a repeated name in a zip bundle is
/// stored as `<stem>_<n>.<ext>` with the lowest free `n`. Tar keeps repeats.
pub struct BundleWriter {
    container: Option<Container>,
    partial_path: PathBuf,
    final_path: PathBuf,
    members: usize,
    names: HashSet<String>,
}

impl BundleWriter {
    pub fn create(final_path: &Path, format: ArchiveFormat) -> Result<Self, Error> {
        let partial_path = partial_path_for(final_path);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(&partial_path)?);

        let container = match format {
            ArchiveFormat::Tar => Container::Tar(tar::Builder::new(writer)),
            ArchiveFormat::TarGz => Container::TarGz(tar::Builder::new(GzEncoder::new(
                writer,
                flate2::Compression::default(),
            ))),
            ArchiveFormat::TarBz2 => Container::TarBz2(tar::Builder::new(BzEncoder::new(
                writer,
                bzip2::Compression::default(),
            ))),
            ArchiveFormat::Zip => Container::Zip(ZipWriter::new(writer)),
        };

        Ok(Self {
            container: Some(container),
            partial_path,
            final_path: final_path.to_path_buf(),
            members: 0,
            names: HashSet::new(),
        })
    }

    /// Append the file at `source` under `internal_name` (a `/`-separated
    /// relative name). Returns the name the member was stored under.
    pub fn add(&mut self, source: &Path, internal_name: &str) -> Result<String, Error> {
        let container = self
            .container
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "bundle already closed"))?;

        let stored_name = match container {
            Container::Tar(builder) => {
                builder.append_path_with_name(source, internal_name)?;
                internal_name.to_string()
            }
            Container::TarGz(builder) => {
                builder.append_path_with_name(source, internal_name)?;
                internal_name.to_string()
            }
            Container::TarBz2(builder) => {
                builder.append_path_with_name(source, internal_name)?;
                internal_name.to_string()
            }
            Container::Zip(zip) => {
                let name = free_name(&self.names, internal_name);
                let mut file = File::open(source)?;
                let len = file.metadata()?.len();
                let options = SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .large_file(len >= u32::MAX as u64);
                zip.start_file(name.as_str(), options)?;
                io::copy(&mut file, zip)?;
                self.names.insert(name.clone());
                name
            }
        };

        self.members += 1;
        Ok(stored_name)
    }

    /// Flush the container and move it to its final name. On failure the
    /// partial file is removed.
    pub fn finish(mut self) -> Result<PathBuf, Error> {
        if let Err(e) = self.seal() {
            self.discard();
            return Err(e);
        }
        debug!(
            "Wrote {} members to {}",
            self.members,
            self.final_path.display()
        );
        Ok(self.final_path.clone())
    }

    fn seal(&mut self) -> Result<(), Error> {
        let container = self
            .container
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "bundle already closed"))?;

        let mut writer = match container {
            Container::Tar(builder) => builder.into_inner()?,
            Container::TarGz(builder) => builder.into_inner()?.finish()?,
            Container::TarBz2(builder) => builder.into_inner()?.finish()?,
            Container::Zip(zip) => zip.finish()?,
        };
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&self.partial_path, &self.final_path)?;
        Ok(())
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.partial_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove partial archive {}: {}",
                    self.partial_path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BundleWriter {
    fn drop(&mut self) {
        // Unfinished: close the handle first, then discard the partial file.
        if self.container.take().is_some() {
            self.discard();
        }
    }
}

/// `name` if unused, else `<stem>_<n>.<ext>` for the lowest free `n >= 1`.
fn free_name(used: &HashSet<String>, name: &str) -> String {
    if !used.contains(name) {
        return name.to_string();
    }
    let (dir, file) = match name.rfind('/') {
        Some(i) => name.split_at(i + 1),
        None => ("", name),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(i) if i > 0 => file.split_at(i),
        _ => (file, ""),
    };
    (1..)
        .map(|n| format!("{}{}_{}{}", dir, stem, n, ext))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn partial_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    final_path.with_file_name(name)
}
