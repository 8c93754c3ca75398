use super::*;

#[test]
fn aspect_ratio_tags_parse_back() {
    for ar in AspectRatio::ALL {
        assert_eq!(ar.tag().parse::<AspectRatio>().unwrap(), ar);
    }
    assert_eq!(AspectRatio::default(), AspectRatio::Portrait3x4);
}

#[test]
fn unknown_aspect_ratio_is_a_validation_error() {
    let err = "2:1".parse::<AspectRatio>().unwrap_err();
    assert!(matches!(err, ForgeError::Validation(_)));
}

#[test]
fn aspect_ratio_orientation_follows_dimensions() {
    assert_eq!(AspectRatio::Square.orientation(), Orientation::Square);
    assert_eq!(AspectRatio::Portrait3x4.orientation(), Orientation::Portrait);
    assert_eq!(AspectRatio::Tall9x16.orientation(), Orientation::Portrait);
    assert_eq!(AspectRatio::Wide16x9.orientation(), Orientation::Landscape);
    assert_eq!(AspectRatio::Landscape4x3.dimensions(), (1365, 1024));
}

#[test]
fn aspect_ratio_serializes_as_tag() {
    let json = serde_json::to_string(&AspectRatio::Wide16x9).unwrap();
    assert_eq!(json, "\"16:9\"");
    let back: AspectRatio = serde_json::from_str("\"9:16\"").unwrap();
    assert_eq!(back, AspectRatio::Tall9x16);
    assert!(serde_json::from_str::<AspectRatio>("\"5:4\"").is_err());
}

#[test]
fn key_distance_and_dominant_channel() {
    let key = Rgb8::KEY_GREEN;
    assert_eq!(key.distance([0, 255, 0]), 0.0);
    assert!((key.distance([0, 0, 0]) - 255.0).abs() < 1e-3);
    assert_eq!(key.dominant_channel(), 1);
    assert_eq!(Rgb8::new(10, 10, 200).dominant_channel(), 2);
}

#[test]
fn rect_edges() {
    let r = PixelRect::new(0, 0, 10, 20);
    assert!(r.touches_all_edges(10, 20));
    assert!(!r.touches_all_edges(11, 20));
    assert_eq!(PixelRect::new(2, 3, 4, 5).right(), 6);
    assert_eq!(PixelRect::new(2, 3, 4, 5).bottom(), 8);
    assert!(PixelRect::new(0, 0, 0, 5).is_empty());
}
