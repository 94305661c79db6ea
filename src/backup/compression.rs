// datastore-backup/src/backup/compression.rs
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const GZ_EXTENSION: &str = ".gz";

/// Where an artifact ended up after the compression step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOutcome {
    pub path: PathBuf,
    pub compressed: bool,
}

impl CompressionOutcome {
    fn unchanged(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            compressed: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    enabled: bool,
    level: u32,
}

impl Compressor {
    pub fn new(enabled: bool, level: u32) -> Self {
        Self {
            enabled,
            level: level.min(9),
        }
    }

    /// Gzips `path` into `<path>.gz` and removes the original once the
    /// compressed copy is completely written.
    ///
    /// Never fails: when compression is disabled, or when any I/O step goes
    /// wrong, the original uncompressed file is handed back instead. A large
    /// valid backup beats a missing one.
    pub async fn compress(&self, path: &Path) -> CompressionOutcome {
        if !self.enabled {
            debug!("Compression disabled; keeping {}", path.display());
            return CompressionOutcome::unchanged(path);
        }

        let source = path.to_path_buf();
        let level = self.level;
        match tokio::task::spawn_blocking(move || gzip_file(&source, level)).await {
            Ok(Ok(compressed_path)) => CompressionOutcome {
                path: compressed_path,
                compressed: true,
            },
            Ok(Err(e)) => {
                warn!(
                    "Compression of {} failed, keeping uncompressed artifact: {}",
                    path.display(),
                    e
                );
                CompressionOutcome::unchanged(path)
            }
            Err(e) => {
                warn!(
                    "Compression task for {} aborted, keeping uncompressed artifact: {}",
                    path.display(),
                    e
                );
                CompressionOutcome::unchanged(path)
            }
        }
    }
}

fn gz_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(GZ_EXTENSION);
    PathBuf::from(name)
}

fn gzip_file(source: &Path, level: u32) -> io::Result<PathBuf> {
    let dest = gz_path_for(source);
    if let Err(e) = write_gzip(source, &dest, level) {
        // Only the partial output goes; the original stays usable.
        if dest.is_file() {
            let _ = std::fs::remove_file(&dest);
        }
        return Err(e);
    }

    std::fs::remove_file(source)?;
    let size = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
    info!("Compressed {} ({} bytes)", dest.display(), size);
    Ok(dest)
}

fn write_gzip(source: &Path, dest: &Path, level: u32) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(source)?);
    let output = File::create(dest)?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::new(level));
    io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

/// Inflates `<name>.gz` into `<name>` next to it and returns the new path.
/// A partially written output is removed before the error is returned.
pub fn decompress_file(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.to_string_lossy();
    let Some(stem) = file_name.strip_suffix(GZ_EXTENSION) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not have a {} suffix", path.display(), GZ_EXTENSION),
        ));
    };
    let dest = PathBuf::from(stem);

    let result = (|| -> io::Result<()> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        let mut writer = BufWriter::new(File::create(&dest)?);
        io::copy(&mut decoder, &mut writer)?;
        writer.flush()
    })();

    if let Err(e) = result {
        if dest.is_file() {
            let _ = std::fs::remove_file(&dest);
        }
        return Err(e);
    }
    debug!("Decompressed {} to {}", path.display(), dest.display());
    Ok(dest)
}
