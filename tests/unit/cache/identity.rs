use super::*;

fn id(name: &str, time: i64, w: u32, h: u32, format: PixelFormat, divider: u32) -> String {
    CacheIdentity::generate(name, time, w, h, format, divider)
        .unwrap()
        .to_string()
}

#[test]
fn identity_is_stable_for_same_inputs() {
    let a = id("seq", 1_700_000_000_000, 1920, 1080, PixelFormat::Rgba32F, 1);
    let b = id("seq", 1_700_000_000_000, 1920, 1080, PixelFormat::Rgba32F, 1);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn identity_changes_with_every_field() {
    let base = id("seq", 10, 1920, 1080, PixelFormat::Rgba32F, 1);
    assert_ne!(base, id("seq2", 10, 1920, 1080, PixelFormat::Rgba32F, 1));
    assert_ne!(base, id("seq", 11, 1920, 1080, PixelFormat::Rgba32F, 1));
    assert_ne!(base, id("seq", 10, 1280, 1080, PixelFormat::Rgba32F, 1));
    assert_ne!(base, id("seq", 10, 1920, 720, PixelFormat::Rgba32F, 1));
    assert_ne!(base, id("seq", 10, 1920, 1080, PixelFormat::Rgba8, 1));
    assert_ne!(base, id("seq", 10, 1920, 1080, PixelFormat::Rgba32F, 2));
}

#[test]
fn identity_disabled_without_name_or_pixels() {
    assert!(CacheIdentity::generate("", 10, 1920, 1080, PixelFormat::Rgba8, 1).is_none());
    assert!(CacheIdentity::generate("seq", 10, 0, 1080, PixelFormat::Rgba8, 1).is_none());
    assert!(CacheIdentity::generate("seq", 10, 3, 3, PixelFormat::Rgba8, 4).is_none());
}

#[test]
fn for_params_matches_generate() {
    let params = RenderParams {
        width: 640,
        height: 360,
        format: PixelFormat::Rgba16,
        mode: crate::render::params::RenderMode::Offline,
        divider: 2,
    };
    assert_eq!(
        CacheIdentity::for_params("seq", 5, &params).unwrap(),
        CacheIdentity::generate("seq", 5, 640, 360, PixelFormat::Rgba16, 2).unwrap()
    );
}

#[test]
fn identity_fields_do_not_run_together() {
    assert_ne!(
        id("seq", 5, 1, 11, PixelFormat::Rgba8, 1),
        id("seq", 5, 11, 1, PixelFormat::Rgba8, 1)
    );
    assert_ne!(
        id("seq1", 23, 640, 360, PixelFormat::Rgba8, 1),
        id("seq12", 3, 640, 360, PixelFormat::Rgba8, 1)
    );
}
