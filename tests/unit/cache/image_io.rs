use super::*;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "framecache_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn f32_pixels(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

#[test]
fn exr_roundtrip_rgba32f_is_lossless() {
    let dir = temp_dir("exr_rgba32f");
    let path = dir.join("1.24.exr");
    let pixels = f32_pixels(&[0.5, 0.25, 2.0, 1.0, 0.0, 0.125, 8.5, 0.75]);

    ExrImageIo
        .write(&path, &pixels, 2, 1, PixelFormat::Rgba32F)
        .unwrap();
    assert!(path.is_file());
    assert!(!dir.join("1.24.exr.tmp").exists());

    let mut input = ExrImageIo.open(&path).unwrap();
    let mut dest = vec![0u8; pixels.len()];
    input.read_image(PixelFormat::Rgba32F, &mut dest).unwrap();
    input.close();
    assert_eq!(dest, pixels);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn exr_roundtrip_rgba8() {
    let dir = temp_dir("exr_rgba8");
    let path = dir.join("0.1.exr");
    let pixels = vec![0u8, 64, 128, 255, 10, 20, 30, 40];

    ExrImageIo
        .write(&path, &pixels, 1, 2, PixelFormat::Rgba8)
        .unwrap();
    let mut input = ExrImageIo.open(&path).unwrap();
    let mut dest = vec![0u8; pixels.len()];
    input.read_image(PixelFormat::Rgba8, &mut dest).unwrap();
    assert_eq!(dest, pixels);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn read_into_wrong_size_fails() {
    let dir = temp_dir("exr_wrong_size");
    let path = dir.join("0.1.exr");
    ExrImageIo
        .write(&path, &[0u8; 16], 2, 2, PixelFormat::Rgba8)
        .unwrap();

    let mut input = ExrImageIo.open(&path).unwrap();
    let mut dest = vec![0u8; 4];
    assert!(input.read_image(PixelFormat::Rgba8, &mut dest).is_err());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn open_missing_file_fails_and_write_checks_size() {
    let dir = temp_dir("exr_missing");
    assert!(ExrImageIo.open(&dir.join("nope.exr")).is_err());
    assert!(
        ExrImageIo
            .write(&dir.join("x.exr"), &[0u8; 3], 1, 1, PixelFormat::Rgba8)
            .is_err()
    );
    std::fs::remove_dir_all(&dir).ok();
}
