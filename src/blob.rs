use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use url::Url;

/// Callback receiving upload progress as a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobSource {
    Bytes { data: Bytes, content_type: String },
    Url(Url),
}

/// An image handed to the gateway, either raw bytes still to be uploaded or
/// an already fetchable URL.
#[derive(Clone)]
pub struct ExternalBlob {
    source: BlobSource,
    on_progress: Option<ProgressFn>,
}

impl fmt::Debug for ExternalBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBlob")
            .field("source", &self.source)
            .field("tracks_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ExternalBlob {
    pub fn from_bytes(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            source: BlobSource::Bytes {
                data: data.into(),
                content_type: content_type.into(),
            },
            on_progress: None,
        }
    }

    pub fn from_url(url: Url) -> Self {
        Self {
            source: BlobSource::Url(url),
            on_progress: None,
        }
    }

    pub fn with_upload_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn source(&self) -> &BlobSource {
        &self.source
    }

    /// The URL for blobs that are already stored remotely.
    pub fn direct_url(&self) -> Option<&Url> {
        match &self.source {
            BlobSource::Url(url) => Some(url),
            BlobSource::Bytes { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.source {
            BlobSource::Bytes { data, .. } => data.len(),
            BlobSource::Url(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Report upload progress; values above 100 are clamped.
    pub fn report_progress(&self, percent: u8) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(percent.min(100));
        }
    }
}

/// Aggregated progress for one create-post submission.
///
/// Each image reports its own 0-100 progress; the tracker folds those into a
/// single overall percentage that never moves backwards while the submission
/// is alive. The image count comes from the draft being uploaded.
#[derive(Clone)]
pub struct UploadProgress {
    tx: Arc<watch::Sender<u8>>,
}

impl UploadProgress {
    pub fn new() -> (Self, watch::Receiver<u8>) {
        let (tx, rx) = watch::channel(0u8);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Progress callback for image `index` out of `total`.
    pub fn for_image(&self, index: usize, total: usize) -> ProgressFn {
        let tracker = self.clone();
        let total = total.max(1);
        Arc::new(move |percent| tracker.record(index.min(total - 1), total, percent))
    }

    fn record(&self, index: usize, total: usize, percent: u8) {
        let overall = (index * 100 + percent.min(100) as usize) / total;
        let overall = overall.min(100) as u8;
        self.tx.send_if_modified(|current| {
            if overall > *current {
                *current = overall;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }
}
