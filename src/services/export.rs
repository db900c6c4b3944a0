use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::item::{WorkItem, WorkStatus};

/// File name suggested to clients for the downloaded archive.
pub const ARCHIVE_FILE_NAME: &str = "batch_processed_images.zip";

/// Archive entry name: the item's path with its extension replaced by
/// `_PROCESSED.png`, or `_DETAIL.png` for fallback results.
///
/// Only a dot in the final path segment starts an extension.
pub fn archive_entry_name(relative_path: &str, status: WorkStatus) -> String {
    format!("{}.png", entry_stem(relative_path, status))
}

fn entry_stem(relative_path: &str, status: WorkStatus) -> String {
    let file_start = relative_path.rfind('/').map_or(0, |slash| slash + 1);
    let base = match relative_path[file_start..].rfind('.') {
        Some(dot) => &relative_path[..file_start + dot],
        None => relative_path,
    };
    let suffix = if status == WorkStatus::Fallback {
        "_DETAIL"
    } else {
        "_PROCESSED"
    };
    format!("{base}{suffix}")
}

/// First free name among `stem.png`, `stem_2.png`, `stem_3.png`, ...
fn unique_entry_name(stem: &str, used: &mut HashSet<String>) -> String {
    let mut name = format!("{stem}.png");
    let mut n = 2u32;
    while used.contains(&name) {
        name = format!("{stem}_{n}.png");
        n += 1;
    }
    used.insert(name.clone());
    name
}

/// Build a zip archive of the given items' results. Items without a result
/// are skipped; an archive with no entries is an error. Items whose entry
/// names collide get a numeric suffix, in iteration order.
pub fn build_archive<'a, I>(items: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = &'a WorkItem>,
{
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();
    let mut entries = 0usize;

    for item in items {
        let Some(result) = item.result.as_ref().filter(|_| item.status.is_success()) else {
            continue;
        };
        let stem = entry_stem(&item.relative_path, item.status);
        let name = unique_entry_name(&stem, &mut used);
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&result.bytes)?;
        entries += 1;
        tracing::debug!(item_id = %item.id, entry = %name, "Added archive entry");
    }

    if entries == 0 {
        return Err(ExportError::NothingSelected);
    }

    let cursor = writer.finish()?;
    tracing::info!(entries, "Export archive built");
    Ok(cursor.into_inner())
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No completed items selected for export")]
    NothingSelected,

    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write archive entry: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::{GeneratedImage, SourceImage};
    use std::io::Read;
    use zip::ZipArchive;

    fn finished(path: &str, status: WorkStatus, bytes: &[u8]) -> WorkItem {
        let mut item = WorkItem::new(path, SourceImage::new("image/jpeg", b"src".to_vec()));
        item.status = status;
        item.result = Some(GeneratedImage::new("image/png", bytes.to_vec()));
        item
    }

    #[test]
    fn entry_names_replace_extension_with_status_suffix() {
        assert_eq!(
            archive_entry_name("shirts/a.jpg", WorkStatus::Completed),
            "shirts/a_PROCESSED.png"
        );
        assert_eq!(
            archive_entry_name("shirts/b.jpg", WorkStatus::Fallback),
            "shirts/b_DETAIL.png"
        );
        assert_eq!(archive_entry_name("plain", WorkStatus::Completed), "plain_PROCESSED.png");
        assert_eq!(
            archive_entry_name("v1.2/photo.final.webp", WorkStatus::Completed),
            "v1.2/photo.final_PROCESSED.png"
        );
        assert_eq!(
            archive_entry_name("dir.v2/photo", WorkStatus::Completed),
            "dir.v2/photo_PROCESSED.png"
        );
    }

    fn entry_contents(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).unwrap();
                (entry.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn duplicate_paths_get_numbered_entries() {
        let items = vec![
            finished("same.jpg", WorkStatus::Completed, b"first"),
            finished("same.jpg", WorkStatus::Completed, b"second"),
            finished("same.jpg", WorkStatus::Fallback, b"detail"),
        ];

        let entries = entry_contents(build_archive(&items).unwrap());
        assert_eq!(
            entries,
            [
                ("same_PROCESSED.png".to_string(), b"first".to_vec()),
                ("same_PROCESSED_2.png".to_string(), b"second".to_vec()),
                ("same_DETAIL.png".to_string(), b"detail".to_vec()),
            ]
        );
    }

    #[test]
    fn same_stem_with_different_extensions_does_not_collide() {
        let items = vec![
            finished("shirts/a.jpg", WorkStatus::Completed, b"jpg"),
            finished("shirts/a.png", WorkStatus::Completed, b"png"),
        ];

        let names: Vec<_> = entry_contents(build_archive(&items).unwrap())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["shirts/a_PROCESSED.png", "shirts/a_PROCESSED_2.png"]);
    }

    #[test]
    fn archive_contains_decoded_results_under_derived_names() {
        let items = vec![
            finished("shirts/a.jpg", WorkStatus::Completed, b"AAA"),
            finished("shirts/b.jpg", WorkStatus::Fallback, b"BBB"),
        ];

        let bytes = build_archive(&items).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<_> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"shirts/a_PROCESSED.png".to_string()));
        assert!(names.contains(&"shirts/b_DETAIL.png".to_string()));

        let mut content = Vec::new();
        archive
            .by_name("shirts/b_DETAIL.png")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"BBB");
    }

    #[test]
    fn items_without_results_are_skipped() {
        let mut failed = finished("c.jpg", WorkStatus::Error, b"");
        failed.result = None;
        let items = vec![failed, finished("d.jpg", WorkStatus::Completed, b"D")];

        let bytes = build_archive(&items).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let items: Vec<WorkItem> = Vec::new();
        assert!(matches!(build_archive(&items), Err(ExportError::NothingSelected)));
    }
}
