use super::*;
use pretty_assertions::assert_eq;

#[test]
fn integers_print_without_fraction() {
    assert_eq!(format_number(1.0), "1");
    assert_eq!(format_number(100.0), "100");
    assert_eq!(format_number(-42.0), "-42");
    assert_eq!(format_number(0.0), "0");
}

#[test]
fn fractions_are_rounded_to_eight_digits() {
    assert_eq!(format_number(0.1), "0.1");
    assert_eq!(format_number(std::f64::consts::PI), "3.1415927");
    assert_eq!(format_number(2.0 / 3.0), "0.66666667");
}

#[test]
fn large_and_small_values_switch_to_scientific() {
    assert_eq!(format_number(123_456_789.0), "1.2345679e+08");
    assert_eq!(format_number(1e-5), "1e-05");
    assert_eq!(format_number(0.0001), "0.0001");
    assert_eq!(format_number(1e100), "1e+100");
}

#[test]
fn rounding_can_carry_into_the_exponent() {
    assert_eq!(format_number(99_999_999.6), "1e+08");
}

#[test]
fn non_finite_values() {
    assert_eq!(format_number(f64::NAN), "nan");
    assert_eq!(format_number(f64::INFINITY), "inf");
    assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
}

#[test]
fn other_precisions() {
    assert_eq!(format_g(1234.5678, 3), "1.23e+03");
    assert_eq!(format_g(0.5, 1), "0.5");
}
