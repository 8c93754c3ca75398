use std::io::Write as _;

use super::*;

#[test]
fn empty_object_yields_defaults() {
    let cfg: ForgeConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg, ForgeConfig::default());
    assert_eq!(cfg.compositor.pixels_per_cm, 10);
    assert_eq!(cfg.compositor.key_color, Rgb8::KEY_GREEN);
    assert_eq!(cfg.lineup.alignment, LineupAlignment::Bottom);
    cfg.validate().unwrap();
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let cfg: ForgeConfig = serde_json::from_str(
        r#"{"compositor":{"pixels_per_cm":4},"lineup":{"alignment":"center"},"threads":2}"#,
    )
    .unwrap();
    assert_eq!(cfg.compositor.pixels_per_cm, 4);
    assert_eq!(cfg.compositor.label_band_px, 100);
    assert_eq!(cfg.lineup.alignment, LineupAlignment::Center);
    assert_eq!(cfg.lineup.padding_px, 40);
    assert_eq!(cfg.threads, Some(2));
}

#[test]
fn invalid_thresholds_are_rejected() {
    let mut cfg = ForgeConfig::default();
    cfg.compositor.transparent_below = 200.0;
    assert!(matches!(cfg.validate(), Err(ForgeError::Validation(_))));

    let mut cfg = ForgeConfig::default();
    cfg.compositor.pixels_per_cm = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = ForgeConfig::default();
    cfg.feedback.accept_score_threshold = 1.5;
    assert!(cfg.validate().is_err());

    let cfg = ForgeConfig {
        threads: Some(0),
        ..ForgeConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn oversized_geometry_is_rejected() {
    let mut cfg = ForgeConfig::default();
    cfg.compositor.pixels_per_cm = 20_000_000;
    assert!(matches!(cfg.validate(), Err(ForgeError::Validation(_))));

    let mut cfg = ForgeConfig::default();
    cfg.compositor.pixels_per_cm = MAX_PIXELS_PER_CM;
    cfg.validate().unwrap();

    let mut cfg = ForgeConfig::default();
    cfg.compositor.label_band_px = MAX_LABEL_PX + 1;
    cfg.compositor.label_font_px = 12;
    assert!(cfg.validate().is_err());

    let mut cfg = ForgeConfig::default();
    cfg.compositor.label_padding_px = u32::MAX;
    assert!(cfg.validate().is_err());
}

#[test]
fn backoff_grows_linearly() {
    let fb = FeedbackConfig {
        retry_backoff_ms: 100,
        ..FeedbackConfig::default()
    };
    assert_eq!(fb.backoff_for(1), Duration::from_millis(100));
    assert_eq!(fb.backoff_for(3), Duration::from_millis(300));
    assert_eq!(fb.call_timeout(), Duration::from_secs(120));
}

#[test]
fn from_json_file_reads_and_validates() {
    let mut good = tempfile::NamedTempFile::new().unwrap();
    write!(good, r#"{{"feedback":{{"max_transient_retries":1}}}}"#).unwrap();
    let cfg = ForgeConfig::from_json_file(good.path()).unwrap();
    assert_eq!(cfg.feedback.max_transient_retries, 1);

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    write!(bad, "not json").unwrap();
    assert!(matches!(
        ForgeConfig::from_json_file(bad.path()),
        Err(ForgeError::Serde(_))
    ));
}
