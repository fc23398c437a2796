//! Image ingestion: files in, [`ImageRecord`]s out.
//!
//! Each file is read and probed far enough to learn its pixel size. Probes
//! run in parallel on the rayon pool; results are collected in input order
//! and every probe is bounded by a timeout and a shared cancel flag.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::ImageFormat;
use serde::Serialize;
use thiserror::Error;

use crate::preview::{PreviewRegistry, PreviewUrl};

pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported image type: {path}")]
    Unsupported { path: PathBuf },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decoder for {path} stopped without a result")]
    Aborted { path: PathBuf },
    #[error("image has no pixels: {path}")]
    EmptyImage { path: PathBuf },
    #[error("decoding {path} timed out after {after:?}")]
    Timeout { path: PathBuf, after: Duration },
    #[error("decoding {path} was cancelled")]
    Cancelled { path: PathBuf },
    #[error("failed to start decoder threads: {0}")]
    Pool(#[source] rayon::ThreadPoolBuildError),
}

/// Opaque identifier of an image record, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId(u64);

impl ImageId {
    fn next() -> Self {
        ImageId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "img-{}", self.0)
    }
}

/// Cooperative cancellation shared by all probes of one ingestion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub decode_timeout: Duration,
    pub cancel: CancelToken,
    /// decoder threads, default one per CPU
    pub threads: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            decode_timeout: DEFAULT_DECODE_TIMEOUT,
            cancel: CancelToken::new(),
            threads: None,
        }
    }
}

/// original file contents and detected encoding
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl SourceFile {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// result of probing one file, before it gets an id and a preview
#[derive(Debug)]
pub struct Probed {
    pub source: SourceFile,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct ImageRecord {
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    pub preview: PreviewUrl,
    pub source: SourceFile,
}

impl ImageRecord {
    fn from_probed(probed: Probed, previews: &PreviewRegistry) -> Self {
        let id = ImageId::next();
        log::debug!(
            "ingested {} as {} ({}x{}, {})",
            probed.source.path.display(),
            id,
            probed.width,
            probed.height,
            probed.source.mime_type()
        );
        ImageRecord {
            id,
            width: probed.width,
            height: probed.height,
            preview: previews.register(&id.to_string()),
            source: probed.source,
        }
    }

    /// build a record from bytes already in memory
    pub fn from_bytes(
        path: impl Into<PathBuf>,
        bytes: Vec<u8>,
        previews: &PreviewRegistry,
    ) -> Result<Self, IngestError> {
        let probed = probe_bytes(path.into(), bytes)?;
        Ok(Self::from_probed(probed, previews))
    }

    pub fn dimensions(&self) -> (f64, f64) {
        (self.width as f64, self.height as f64)
    }
}

fn is_accepted(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::WebP
            | ImageFormat::Bmp
            | ImageFormat::Gif
            | ImageFormat::Tiff
    )
}

fn probe_bytes(path: PathBuf, bytes: Vec<u8>) -> Result<Probed, IngestError> {
    let format = match image::guess_format(&bytes) {
        Ok(f) if is_accepted(f) => f,
        _ => return Err(IngestError::Unsupported { path }),
    };
    let (width, height) = match image::ImageReader::with_format(Cursor::new(&bytes), format)
        .into_dimensions()
    {
        Ok(dims) => dims,
        Err(source) => return Err(IngestError::Decode { path, source }),
    };
    if width == 0 || height == 0 {
        return Err(IngestError::EmptyImage { path });
    }
    Ok(Probed {
        source: SourceFile {
            path,
            bytes,
            format,
        },
        width,
        height,
    })
}

/// read a file and learn its format and pixel size
pub fn probe_file(path: &Path) -> Result<Probed, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    probe_bytes(path.to_path_buf(), bytes)
}

/// ingest files in order, one record per file
pub fn ingest_files(
    paths: &[PathBuf],
    options: &IngestOptions,
    previews: &PreviewRegistry,
) -> Result<Vec<ImageRecord>, IngestError> {
    ingest_with(paths, options, previews, probe_file)
}

fn decoder_pool(options: &IngestOptions, jobs: usize) -> Result<rayon::ThreadPool, IngestError> {
    let threads = options
        .threads
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
        .clamp(1, jobs.max(1));
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("picpdf-decode-{}", i))
        .build()
        .map_err(IngestError::Pool)
}

pub(crate) fn ingest_with<F>(
    paths: &[PathBuf],
    options: &IngestOptions,
    previews: &PreviewRegistry,
    probe: F,
) -> Result<Vec<ImageRecord>, IngestError>
where
    F: Fn(&Path) -> Result<Probed, IngestError> + Clone + Send + 'static,
{
    // probes never share threads with the caller, which may itself be a
    // rayon worker; a hung probe only pins a thread of this pool
    let pool = decoder_pool(options, paths.len())?;
    let abort = CancelToken::new();

    // start every probe, then wait on them in input order
    let pending: Vec<(&PathBuf, Receiver<Result<Probed, IngestError>>)> = paths
        .iter()
        .map(|path| {
            let (tx, rx) = mpsc::channel();
            let path_owned = path.clone();
            let cancel = options.cancel.clone();
            let abort = abort.clone();
            let probe = probe.clone();
            pool.spawn(move || {
                if cancel.is_cancelled() || abort.is_cancelled() {
                    return;
                }
                // the receiver is gone if ingestion already failed
                let _ = tx.send(probe(&path_owned));
            });
            (path, rx)
        })
        .collect();

    let mut records = Vec::with_capacity(paths.len());
    for (path, rx) in pending {
        match wait_for_probe(path, &rx, options) {
            Ok(probed) => records.push(ImageRecord::from_probed(probed, previews)),
            Err(e) => {
                // probes still queued return without touching their files
                abort.cancel();
                return Err(e);
            }
        }
    }
    Ok(records)
}

fn wait_for_probe(
    path: &Path,
    rx: &Receiver<Result<Probed, IngestError>>,
    options: &IngestOptions,
) -> Result<Probed, IngestError> {
    let deadline = Instant::now() + options.decode_timeout;
    let cancelled = || IngestError::Cancelled {
        path: path.to_path_buf(),
    };
    loop {
        if options.cancel.is_cancelled() {
            return Err(cancelled());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(IngestError::Timeout {
                path: path.to_path_buf(),
                after: options.decode_timeout,
            });
        }
        match rx.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) if options.cancel.is_cancelled() => {
                return Err(cancelled());
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(IngestError::Aborted {
                    path: path.to_path_buf(),
                });
            }
        }
    }
}
