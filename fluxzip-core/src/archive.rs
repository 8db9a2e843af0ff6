use std::io::{Cursor, Write};

use image::DynamicImage;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{Error, Result};

pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-zip-compressed";
pub const ARCHIVE_FILENAME: &str = "images.zip";

/// Archive entry name for the image at zero-based `index`.
pub fn entry_name(index: usize) -> String {
    format!("image_{}.png", index + 1)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Packs `images` into an in-memory zip, one PNG entry per image, in order.
pub fn build_archive(images: &[DynamicImage]) -> Result<Vec<u8>> {
    // PNG data is already deflated.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (index, img) in images.iter().enumerate() {
        let name = entry_name(index);
        let png = encode_png(img).map_err(|source| Error::Png {
            name: name.clone(),
            source,
        })?;
        writer.start_file(name, options)?;
        writer.write_all(&png)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use zip::ZipArchive;

    fn solid(value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 2, image::Rgb([value; 3])))
    }

    #[test]
    fn names_entries_from_one() {
        assert_eq!(entry_name(0), "image_1.png");
        assert_eq!(entry_name(9), "image_10.png");
    }

    #[test]
    fn archives_images_in_order() {
        let images = vec![solid(10), solid(20), solid(30)];
        let bytes = build_archive(&images).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);
        for (index, expected) in [10u8, 20, 30].into_iter().enumerate() {
            let mut entry = archive.by_index(index).unwrap();
            assert_eq!(entry.name(), entry_name(index));

            let mut png = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut png).unwrap();
            let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
            assert_eq!(decoded.dimensions(), (3, 2));
            assert_eq!(decoded.get_pixel(0, 0).0, [expected; 3]);
        }
    }

    #[test]
    fn empty_set_is_a_valid_archive() {
        let bytes = build_archive(&[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
