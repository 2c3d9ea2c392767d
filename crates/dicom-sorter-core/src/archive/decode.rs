use super::ArchiveFormat;
use crate::error::Error;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

/// Fully materialize the members of `archive_path` under `target_dir`.
///
/// Members whose names would escape `target_dir` are skipped. Returns the
/// number of regular files written.
pub fn decode(archive_path: &Path, target_dir: &Path) -> Result<usize, Error> {
    let format = ArchiveFormat::from_path(archive_path).ok_or_else(|| Error::Archive {
        path: archive_path.to_path_buf(),
        reason: "unrecognized archive format".to_string(),
    })?;

    let result = fs::create_dir_all(target_dir)
        .and_then(|_| File::open(archive_path))
        .map_err(Error::from)
        .and_then(|file| {
            let reader = BufReader::new(file);
            match format {
                ArchiveFormat::Tar => unpack_tar(reader, target_dir).map_err(Error::from),
                ArchiveFormat::TarGz => {
                    unpack_tar(GzDecoder::new(reader), target_dir).map_err(Error::from)
                }
                ArchiveFormat::TarBz2 => {
                    unpack_tar(BzDecoder::new(reader), target_dir).map_err(Error::from)
                }
                ArchiveFormat::Zip => unpack_zip(reader, target_dir),
            }
        });

    result.map_err(|e| match e {
        archive_err @ Error::Archive { .. } => archive_err,
        other => Error::Archive {
            path: archive_path.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

fn unpack_tar<R: Read>(reader: R, target_dir: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let is_file = entry.header().entry_type().is_file();

        if entry.unpack_in(target_dir)? {
            if is_file {
                count += 1;
            }
        } else {
            warn!("Skipping tar member outside target: {}", name.display());
        }
    }

    debug!("Unpacked {} files into {}", count, target_dir.display());
    Ok(count)
}

fn unpack_zip<R: Read + Seek>(reader: R, target_dir: &Path) -> Result<usize, Error> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                warn!("Skipping zip member with unsafe name: {}", entry.name());
                continue;
            }
        };

        let output_path = target_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&output_path)?;
            io::copy(&mut entry, &mut outfile)?;
            count += 1;
        }
    }

    debug!("Unpacked {} files into {}", count, target_dir.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_bz2(path: &Path, members: &[(&str, &[u8])]) {
        let encoder = bzip2::write::BzEncoder::new(
            File::create(path).unwrap(),
            bzip2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_decode_zip_with_nested_dirs() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("0001.zip");
        write_zip(&archive, &[("0001/a.dcm", b"aaa"), ("0001/sub/b.dcm", b"bbb")]);

        let out = tmp.path().join("out");
        let count = decode(&archive, &out).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read(out.join("0001/a.dcm")).unwrap(), b"aaa");
        assert_eq!(fs::read(out.join("0001/sub/b.dcm")).unwrap(), b"bbb");
    }

    #[test]
    fn test_decode_tar_bz2() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("series.tar.bz2");
        write_tar_bz2(&archive, &[("s/one.dcm", b"1"), ("s/two.dcm", b"22")]);

        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let count = decode(&archive, &out).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read(out.join("s/two.dcm")).unwrap(), b"22");
    }

    #[test]
    fn test_decode_corrupt_archive_reports_path() {
        let tmp = tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = decode(&archive, &tmp.path().join("out")).unwrap_err();
        match err {
            Error::Archive { path, .. } => assert_eq!(path, archive),
            other => panic!("unexpected error: {other}"),
        }
    }
}
