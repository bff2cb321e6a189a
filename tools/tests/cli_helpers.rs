use std::path::Path;

use image::{Rgb, RgbImage};
use yolo_augment::{AugmentError, AugmentedSample, Canvas, Sample};
use yolo_augment_tools::{output_image_path, parse_canvas, save_sample};

#[test]
fn parses_height_by_width() {
    assert_eq!(parse_canvas("416x608"), Ok(Canvas::new(416, 608)));
    assert_eq!(parse_canvas("32X64"), Ok(Canvas::new(32, 64)));
}

#[test]
fn rejects_malformed_or_empty_canvas() {
    assert!(parse_canvas("608").is_err());
    assert!(parse_canvas("0x608").is_err());
    assert!(parse_canvas("608x-1").is_err());
}

#[test]
fn output_names_are_zero_padded() {
    assert_eq!(
        output_image_path(Path::new("out"), 42),
        Path::new("out").join("aug_000042.png")
    );
}

#[test]
fn saved_sample_decodes_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let img = RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8 * 30, y as u8 * 40, 7]));
    let sample = AugmentedSample::from_sample(Sample::new(img.clone(), vec![]));
    let path = output_image_path(dir.path(), 0);
    save_sample(&sample, &path)?;
    assert_eq!(image::open(&path)?.to_rgb8(), img);
    Ok(())
}

#[test]
fn unwritable_output_reports_encode_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sample = AugmentedSample::from_sample(Sample::new(RgbImage::new(4, 4), vec![]));
    let path = dir.path().join("no_such_dir").join("aug_000000.png");
    let err = save_sample(&sample, &path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AugmentError>(),
        Some(AugmentError::ImageEncode { .. })
    ));
    Ok(())
}
