use super::*;

fn r(num: i64, den: i64) -> Rational {
    Rational::new(num, den).unwrap()
}

#[test]
fn rational_is_stored_reduced() {
    assert_eq!(r(2, 48), r(1, 24));
    assert_eq!(r(2, 48).num(), 1);
    assert_eq!(r(2, 48).den(), 24);
    assert_eq!(r(3, -6), r(-1, 2));
    assert_eq!(r(0, 7).den(), 1);
    assert!(Rational::new(1, 0).is_err());
}

#[test]
fn rational_ordering_is_exact() {
    assert!(r(1, 3) < r(34, 100));
    assert!(r(1, 24) > r(1, 25));
    assert_eq!(r(1, 24).cmp(&r(4, 96)), Ordering::Equal);
}

#[test]
fn rational_add_sub() {
    assert_eq!(r(1, 24) + r(1, 24), r(1, 12));
    assert_eq!(r(1, 2) - r(1, 3), r(1, 6));
    let mut t = Rational::zero();
    for _ in 0..24 {
        t += r(1, 24);
    }
    assert_eq!(t, Rational::from_int(1));
}

#[test]
fn floor_div_handles_negative_values() {
    assert_eq!(r(3, 100).floor_div(r(1, 24)).unwrap(), 0);
    assert_eq!(r(9, 100).floor_div(r(1, 24)).unwrap(), 2);
    assert_eq!(r(-1, 100).floor_div(r(1, 24)).unwrap(), -1);
    assert_eq!(r(1, 12).floor_div(r(1, 24)).unwrap(), 2);
    assert!(r(1, 2).floor_div(Rational::zero()).is_err());
}

#[test]
fn snap_floor_lands_on_grid() {
    assert_eq!(r(3, 100).snap_floor(r(1, 24)).unwrap(), Rational::zero());
    assert_eq!(r(5, 100).snap_floor(r(1, 24)).unwrap(), r(1, 24));
    assert_eq!(r(1001, 30000).snap_floor(r(1001, 30000)).unwrap(), r(1001, 30000));
}

#[test]
fn parse_and_display() {
    assert_eq!("1/24".parse::<Rational>().unwrap(), r(1, 24));
    assert_eq!(" 10 ".parse::<Rational>().unwrap(), Rational::from_int(10));
    assert!("1/x".parse::<Rational>().is_err());
    assert!("1/0".parse::<Rational>().is_err());
    assert_eq!(r(2, 4).to_string(), "1/2");
}

#[test]
fn serde_uses_string_form() {
    let json = serde_json::to_string(&r(1001, 30000)).unwrap();
    assert_eq!(json, "\"1001/30000\"");
    let back: Rational = serde_json::from_str("\"2/48\"").unwrap();
    assert_eq!(back, r(1, 24));
}

#[test]
fn time_range_overlap_and_intersection() {
    let a = TimeRange::new(r(0, 1), r(2, 1)).unwrap();
    let b = TimeRange::new(r(1, 1), r(3, 1)).unwrap();
    let c = TimeRange::new(r(2, 1), r(4, 1)).unwrap();
    assert!(a.overlaps(b));
    assert!(!a.overlaps(c));
    assert_eq!(
        a.intersect(b).unwrap(),
        TimeRange::new(r(1, 1), r(2, 1)).unwrap()
    );
    assert_eq!(b.length(), r(2, 1));
    assert!(TimeRange::new(r(2, 1), r(1, 1)).is_err());
}
