use std::fs;
use std::path::PathBuf;

use yolo_augment::{AugmentConfig, AugmentError, Canvas, Chance};

fn write_temp_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("yolo-augment.toml");
    fs::write(&path, contents).expect("write temp config");
    path
}

#[test]
fn loads_minimal_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_config(&dir, "canvas = \"416x416\"\n");
    let cfg = AugmentConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.canvas, Canvas::new(416, 416));
    assert_eq!(cfg.p_rotate, AugmentConfig::default().p_rotate);
}

#[test]
fn loads_every_section() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("YOLO_AUGMENT_TEST_DATA", "/datasets");
    let path = write_temp_config(
        &dir,
        r#"
canvas = "320x480"
seed = 99
pool_labels = "${YOLO_AUGMENT_TEST_DATA}/train.txt"

[chances]
rotate = "0/1"
flip = "1/2"
mixup = "1/5"
color = "1/1"

[pixelate]
count_max = 4
mask_ratio = 0.25
kernel_ratio = 0.2

[color]
hue = 0.05
sat = 1.2
val = 1.3

[resize]
scale_min = 0.8
scale_max = 1.25
"#,
    );
    let cfg = AugmentConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.canvas, Canvas::new(320, 480));
    assert_eq!(cfg.seed, Some(99));
    assert_eq!(cfg.pool_labels, Some(PathBuf::from("/datasets/train.txt")));
    assert_eq!(cfg.p_rotate, Chance::never());
    assert_eq!(cfg.p_flip, Chance::new(1, 2));
    assert_eq!(cfg.p_mixup, Chance::new(1, 5));
    assert_eq!(cfg.p_mosaic, Chance::new(1, 3));
    assert_eq!(cfg.p_color, Chance::always());
    assert_eq!(cfg.pixelate_count_max, 4);
    assert_eq!(cfg.color_val_range, 1.3);
    assert_eq!(cfg.resize_scale_range, (0.8, 1.25));
    cfg.validate().expect("valid config");
}

#[test]
fn bad_chance_string_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_config(&dir, "[chances]\nrotate = \"one in three\"\n");
    assert!(matches!(
        AugmentConfig::from_path(&path),
        Err(AugmentError::ConfigParse { .. })
    ));
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp_config(&dir, "canvass = \"10x10\"\n");
    assert!(matches!(
        AugmentConfig::from_path(&path),
        Err(AugmentError::ConfigParse { .. })
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        AugmentConfig::from_path(&dir.path().join("absent.toml")),
        Err(AugmentError::Io { .. })
    ));
}
