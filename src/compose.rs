use std::path::PathBuf;

use bytes::Bytes;
use url::Url;

use crate::blob::{ExternalBlob, UploadProgress};
use crate::error::AppError;
use crate::models::{PostMetadata, Principal};

pub const MAX_IMAGES: usize = 4;

/// Where an attached image comes from. Files are not read until submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Url(Url),
    Bytes { data: Bytes, content_type: String },
}

/// The create-post form.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    description: String,
    images: Vec<ImageSource>,
}

impl PostDraft {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            images: Vec::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn images(&self) -> &[ImageSource] {
        &self.images
    }

    pub fn can_add_more(&self) -> bool {
        self.images.len() < MAX_IMAGES
    }

    /// Attach images. The whole batch is refused if it would take the draft
    /// past the limit.
    pub fn attach(&mut self, images: Vec<ImageSource>) -> Result<(), AppError> {
        if self.images.len() + images.len() > MAX_IMAGES {
            return Err(too_many_images());
        }
        self.images.extend(images);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<ImageSource> {
        if index < self.images.len() {
            Some(self.images.remove(index))
        } else {
            None
        }
    }

    /// Local checks run before anything is read or sent.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.description.trim().is_empty() {
            return Err(AppError::Validation("Post caption is required".to_string()));
        }
        if self.images.is_empty() {
            return Err(AppError::Validation(
                "Please add at least one image".to_string(),
            ));
        }
        if self.images.len() > MAX_IMAGES {
            return Err(too_many_images());
        }
        Ok(())
    }

    /// Read every attached image into a blob wired to `progress`.
    pub(crate) async fn into_upload(
        self,
        author: Option<Principal>,
        progress: &UploadProgress,
    ) -> Result<(PostMetadata, Vec<ExternalBlob>), AppError> {
        let total = self.images.len();
        let mut blobs = Vec::with_capacity(total);
        for (index, source) in self.images.into_iter().enumerate() {
            let blob = match source {
                ImageSource::File(path) => {
                    let content_type = mime_guess::from_path(&path)
                        .first()
                        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
                        .ok_or_else(|| {
                            AppError::Validation(format!(
                                "Not an image file: {}",
                                path.display()
                            ))
                        })?;
                    let data = tokio::fs::read(&path).await?;
                    ExternalBlob::from_bytes(data, content_type.essence_str())
                }
                ImageSource::Url(url) => ExternalBlob::from_url(url),
                ImageSource::Bytes { data, content_type } => {
                    ExternalBlob::from_bytes(data, content_type)
                }
            };
            blobs.push(blob.with_upload_progress(progress.for_image(index, total)));
        }

        let metadata = PostMetadata {
            description: self.description.trim().to_string(),
            author,
        };
        Ok((metadata, blobs))
    }
}

fn too_many_images() -> AppError {
    AppError::Validation(format!("Maximum {} images allowed per post", MAX_IMAGES))
}
