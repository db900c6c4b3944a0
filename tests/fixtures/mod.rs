//! Source images used by the integration suites.
//!
//! Only the leading magic bytes are real; the Generation API is mocked, so
//! the payloads never need to decode.

use restyle_batch::models::item::UploadedFile;

/// A source image plus the output the mocked API returns for it.
#[derive(Debug, Clone)]
pub struct ShirtFixture {
    pub path: &'static str,
    pub source: &'static [u8],
    pub output: &'static [u8],
    /// True when the primary prompt is refused and the fallback succeeds.
    pub safety_rejected: bool,
}

pub const SHIRTS: &[ShirtFixture] = &[
    ShirtFixture {
        path: "shirts/1.jpg",
        source: b"\xFF\xD8\xFF\xE0shirt-one-front",
        output: b"\x89PNG\r\n\x1a\nrestyled-one",
        safety_rejected: false,
    },
    ShirtFixture {
        path: "shirts/2.jpg",
        source: b"\xFF\xD8\xFF\xE0shirt-two-model",
        output: b"\x89PNG\r\n\x1a\ndetail-two",
        safety_rejected: true,
    },
    ShirtFixture {
        path: "shirts/3.jpg",
        source: b"\xFF\xD8\xFF\xE0shirt-three-flat",
        output: b"\x89PNG\r\n\x1a\nrestyled-three",
        safety_rejected: false,
    },
];

impl ShirtFixture {
    pub fn upload(&self) -> UploadedFile {
        UploadedFile {
            path: self.path.to_string(),
            media_type: Some("image/jpeg".to_string()),
            bytes: self.source.to_vec(),
        }
    }
}

/// Uploads in reverse path order, to show ingestion sorts them.
pub fn shuffled_uploads() -> Vec<UploadedFile> {
    SHIRTS.iter().rev().map(ShirtFixture::upload).collect()
}
